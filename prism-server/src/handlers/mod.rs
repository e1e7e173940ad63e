//! HTTP handlers, grouped by the capability they expose.

pub(crate) mod advanced;
pub(crate) mod editing;
pub(crate) mod generation;
pub(crate) mod system;
pub(crate) mod vision;

use std::sync::Arc;

use axum::http::header;
use axum::response::{IntoResponse, Response};
use image::imageops::FilterType;
use image::DynamicImage;
use prism_core::{
    encode_png, snap_to_latent_grid, to_mask, Capability, Error, GenerationRequest, ModelSource,
    SlotKey, VisionLanguage,
};

use crate::error::HttpError;
use crate::form::Form;
use crate::state::AppState;

pub(crate) type HandlerResult<T = Response> = Result<T, HttpError>;

/// Runs CPU-bound image work off the async workers.
pub(crate) async fn blocking<T, F>(f: F) -> HandlerResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> prism_core::Result<T> + Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}

/// Runs `request` on `slot` in its own task, so a dropped connection cannot
/// abandon a half-built pipeline or an in-flight backend call.
pub(crate) async fn run_detached(
    state: &AppState,
    slot: SlotKey,
    source: ModelSource,
    request: GenerationRequest,
) -> HandlerResult<DynamicImage> {
    let state = Arc::clone(state);
    let task = tokio::spawn(async move { state.registry.run(slot, &source, request).await });
    Ok(task.await??)
}

/// Resizes down to the latent grid off the async workers.
pub(crate) async fn snap(img: DynamicImage) -> HandlerResult<DynamicImage> {
    blocking(move || snap_to_latent_grid(img)).await
}

/// Encodes `img` as a PNG attachment.
pub(crate) async fn png(img: DynamicImage, filename: &'static str) -> HandlerResult {
    let bytes = blocking(move || encode_png(&img)).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// Fails with 503 unless `capability` was enabled at startup.
pub(crate) fn require(state: &AppState, capability: Capability) -> HandlerResult<()> {
    state.registry.capabilities().loader(capability)?;
    Ok(())
}

pub(crate) fn vision_client(state: &AppState) -> HandlerResult<Arc<dyn VisionLanguage>> {
    state.vision.clone().ok_or_else(|| {
        Error::ConfigurationMissing(
            "Gemini integration is not available. Set GEMINI_API_KEY in .env".to_string(),
        )
        .into()
    })
}

/// Reads the knobs shared by every diffusion endpoint.
pub(crate) fn diffusion_request(
    form: &Form,
    prompt: impl Into<String>,
) -> HandlerResult<GenerationRequest> {
    let mut request = GenerationRequest::new(prompt)
        .with_negative_prompt(form.text("negativePrompt").map(str::to_string))
        .with_seed(form.parse("seed")?);
    if let Some(steps) = form.parse("steps")?.or(form.parse("numInferenceSteps")?) {
        request = request.with_steps(steps)?;
    }
    if let Some(guidance) = form.parse("guidanceScale")? {
        request = request.with_guidance(guidance)?;
    }
    Ok(request)
}

/// Applies the requested `width`/`height`, or the defaults when absent.
pub(crate) fn sized(
    request: GenerationRequest,
    form: &Form,
    (width, height): (u32, u32),
) -> HandlerResult<GenerationRequest> {
    let width = form.parse_or("width", width)?;
    let height = form.parse_or("height", height)?;
    Ok(request.with_size(width, height)?)
}

/// Binary mask resized to exactly `width`×`height`.
pub(crate) async fn fit_mask(
    mask: DynamicImage,
    width: u32,
    height: u32,
) -> HandlerResult<DynamicImage> {
    blocking(move || {
        let mask = if (mask.width(), mask.height()) == (width, height) {
            to_mask(&mask)
        } else {
            to_mask(&mask.resize_exact(width, height, FilterType::Nearest))
        };
        Ok(DynamicImage::ImageLuma8(mask))
    })
    .await
}

/// Joins a preset negative prompt with the user's own.
pub(crate) fn merge_negative(preset: &str, user: Option<&str>) -> Option<String> {
    match (preset.is_empty(), user) {
        (true, None) => None,
        (true, Some(user)) => Some(user.to_string()),
        (false, None) => Some(preset.to_string()),
        (false, Some(user)) => Some(format!("{preset}, {user}")),
    }
}
