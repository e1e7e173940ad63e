use axum::extract::{Multipart, State};
use prism_core::{
    ensure_range, extend_canvas, Capability, ModelSource, OutpaintDirection, SlotKey,
    ASPECT_RATIOS, BASE_MODELS, INPAINT_MODEL, OUTPAINT_PIXELS_RANGE, STYLES, TEXT_EFFECTS,
};
use tracing::info;

use super::{
    blocking, diffusion_request, fit_mask, merge_negative, png, require, run_detached, sized,
    snap, HandlerResult,
};
use crate::form::Form;
use crate::state::AppState;

const DEFAULT_SIZE: (u32, u32) = (512, 512);
const DEFAULT_OUTPAINT_PIXELS: u32 = 256;
const DEFAULT_TRANSFER_STRENGTH: f64 = 0.75;

fn base_model(form: &Form) -> ModelSource {
    let (_, model) = BASE_MODELS.resolve(form.text("model"));
    ModelSource::new(model.id)
}

pub(crate) async fn generate_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> HandlerResult {
    require(&state, Capability::Diffusion)?;
    let form = Form::collect(multipart).await?;
    let prompt = form.require_text("prompt")?;
    let request = sized(diffusion_request(&form, prompt)?, &form, DEFAULT_SIZE)?;

    let output = run_detached(&state, SlotKey::Base, base_model(&form), request).await?;
    png(output, "generated.png").await
}

pub(crate) async fn generate_with_style(
    State(state): State<AppState>,
    multipart: Multipart,
) -> HandlerResult {
    require(&state, Capability::Diffusion)?;
    let form = Form::collect(multipart).await?;
    let prompt = form.require_text("prompt")?;
    let (style_key, style) = STYLES.resolve(form.text("style"));
    let (ratio_key, ratio) = ASPECT_RATIOS.resolve(form.text("aspectRatio"));

    let negative = merge_negative(style.negative_prompt, form.text("negativePrompt"));
    let request = diffusion_request(&form, style.apply(prompt))?
        .with_negative_prompt(negative)
        .with_size(ratio.width, ratio.height)?;
    info!(style = style_key, aspect_ratio = ratio_key, "styled generation");

    let output = run_detached(&state, SlotKey::Base, base_model(&form), request).await?;
    png(output, "styled.png").await
}

pub(crate) async fn generative_fill(
    State(state): State<AppState>,
    multipart: Multipart,
) -> HandlerResult {
    require(&state, Capability::Diffusion)?;
    let form = Form::collect(multipart).await?;
    let prompt = form.require_text("prompt")?;
    let mut request = diffusion_request(&form, prompt)?;
    if let Some(strength) = form.parse("strength")? {
        request = request.with_strength(strength)?;
    }

    let image = snap(form.image("image").await?).await?;
    let mask = fit_mask(form.image("mask").await?, image.width(), image.height()).await?;
    let output = run_detached(
        &state,
        SlotKey::Inpaint,
        ModelSource::new(INPAINT_MODEL),
        request.with_image(image).with_mask(mask),
    )
    .await?;
    png(output, "filled.png").await
}

pub(crate) async fn outpaint(State(state): State<AppState>, multipart: Multipart) -> HandlerResult {
    require(&state, Capability::Diffusion)?;
    let form = Form::collect(multipart).await?;
    let direction: OutpaintDirection = form.require_text("direction")?.parse()?;
    let pixels = ensure_range(
        "pixels",
        form.parse_or("pixels", DEFAULT_OUTPAINT_PIXELS)?,
        OUTPAINT_PIXELS_RANGE,
    )?;
    let prompt = form.text("prompt").unwrap_or("seamless continuation of the scene");
    let request = diffusion_request(&form, prompt)?;

    let image = form.image("image").await?;
    let (canvas, mask) = blocking(move || extend_canvas(&image, direction, pixels)).await?;
    let canvas = snap(canvas).await?;
    let mask = fit_mask(mask, canvas.width(), canvas.height()).await?;
    info!(?direction, pixels, width = canvas.width(), height = canvas.height(), "outpainting");

    let output = run_detached(
        &state,
        SlotKey::Inpaint,
        ModelSource::new(INPAINT_MODEL),
        request.with_image(canvas).with_mask(mask),
    )
    .await?;
    png(output, "outpainted.png").await
}

pub(crate) async fn text_effect(
    State(state): State<AppState>,
    multipart: Multipart,
) -> HandlerResult {
    require(&state, Capability::Diffusion)?;
    let form = Form::collect(multipart).await?;
    let text = form.require_text("text")?;
    let (_, effect) = TEXT_EFFECTS.resolve(form.text("style"));

    let negative = merge_negative(effect.negative_prompt, form.text("negativePrompt"));
    let request = sized(diffusion_request(&form, effect.render(text))?, &form, DEFAULT_SIZE)?
        .with_negative_prompt(negative);

    let output = run_detached(&state, SlotKey::Base, base_model(&form), request).await?;
    png(output, "text_effect.png").await
}

pub(crate) async fn style_transfer(
    State(state): State<AppState>,
    multipart: Multipart,
) -> HandlerResult {
    require(&state, Capability::Diffusion)?;
    let form = Form::collect(multipart).await?;
    let (_, style) = STYLES.resolve(form.text("style"));
    let strength = form.parse_or("strength", DEFAULT_TRANSFER_STRENGTH)?;
    let prompt = style.apply(form.text("prompt").unwrap_or("the same scene"));
    let negative = merge_negative(style.negative_prompt, form.text("negativePrompt"));
    let request = diffusion_request(&form, prompt)?
        .with_strength(strength)?
        .with_negative_prompt(negative);

    let image = snap(form.image("file").await?).await?;
    let output = run_detached(
        &state,
        SlotKey::Img2Img,
        base_model(&form),
        request.with_image(image),
    )
    .await?;
    png(output, "style_transfer.png").await
}
