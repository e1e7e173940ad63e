use axum::extract::{Multipart, State};
use image::DynamicImage;
use prism_core::{
    adjust_brightness, apply_filter, ensure_range, inpaint_classical, Capability, FilterKind,
    GenerationRequest, ModelSource, SlotKey, BACKGROUND_MODEL, BRIGHTNESS_RANGE, INPAINT_MODEL,
};
use tracing::debug;

use super::{
    blocking, diffusion_request, fit_mask, png, require, run_detached, snap, HandlerResult,
};
use crate::form::Form;
use crate::state::AppState;

const DEFAULT_INPAINT_PROMPT: &str = "fill naturally";

pub(crate) async fn remove_background(
    State(state): State<AppState>,
    multipart: Multipart,
) -> HandlerResult {
    require(&state, Capability::BackgroundRemoval)?;
    let form = Form::collect(multipart).await?;
    let image = form.image("file").await?;

    let output = run_detached(
        &state,
        SlotKey::Background,
        ModelSource::new(BACKGROUND_MODEL),
        GenerationRequest::new("").with_image(image),
    )
    .await?;
    png(DynamicImage::ImageRgba8(output.to_rgba8()), "no_background.png").await
}

/// Object removal: diffusion inpainting when asked for and available, classical fill otherwise.
pub(crate) async fn inpaint(State(state): State<AppState>, multipart: Multipart) -> HandlerResult {
    let form = Form::collect(multipart).await?;
    let use_ai = form.flag("useAi", false)?;
    let prompt = form.text("prompt").unwrap_or(DEFAULT_INPAINT_PROMPT).to_string();
    let ai = use_ai && state.registry.capabilities().is_ready(Capability::Diffusion);
    let request = if ai {
        Some(diffusion_request(&form, prompt)?)
    } else {
        None
    };

    let image = form.image("image").await?;
    let mask = form.image("mask").await?;

    match request {
        Some(request) => {
            let image = snap(image).await?;
            let mask = fit_mask(mask, image.width(), image.height()).await?;
            let output = run_detached(
                &state,
                SlotKey::Inpaint,
                ModelSource::new(INPAINT_MODEL),
                request.with_image(image).with_mask(mask),
            )
            .await?;
            png(output, "inpainted.png").await
        }
        None => {
            if use_ai {
                debug!("diffusion unavailable, using classical inpainting");
            }
            let output = blocking(move || inpaint_classical(&image, &mask)).await?;
            png(output, "inpainted.png").await
        }
    }
}

pub(crate) async fn apply_filter_handler(multipart: Multipart) -> HandlerResult {
    let form = Form::collect(multipart).await?;
    let kind = FilterKind::from_name(form.text("filterType").unwrap_or("none"));
    let image = form.image("file").await?;
    let output = blocking(move || apply_filter(&image, kind)).await?;
    png(output, "filtered.png").await
}

pub(crate) async fn adjust_brightness_handler(multipart: Multipart) -> HandlerResult {
    let form = Form::collect(multipart).await?;
    let factor = ensure_range("factor", form.parse_or("factor", 1.0)?, BRIGHTNESS_RANGE)?;
    let image = form.image("file").await?;
    let output = blocking(move || Ok(adjust_brightness(&image, factor as f32))).await?;
    png(output, "adjusted.png").await
}
