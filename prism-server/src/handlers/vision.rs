//! Gemini-backed analysis and prompt-writing endpoints.

use axum::extract::{Multipart, State};
use axum::Json;
use prism_core::{gemini::Analysis, CAPTION_PROMPTS, ENHANCE_PROMPTS};
use serde_json::{json, Value};

use super::{vision_client, HandlerResult};
use crate::form::Form;
use crate::state::AppState;

const DEFAULT_PROMPT_STYLE: &str = "photorealistic";

pub(crate) async fn analyze_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> HandlerResult<Json<Analysis>> {
    let vl = vision_client(&state)?;
    let form = Form::collect(multipart).await?;
    let image = form.image("file").await?;
    let analysis = vl.analyze_image(image, form.text("analysisType")).await?;
    Ok(Json(analysis))
}

pub(crate) async fn generate_caption(
    State(state): State<AppState>,
    multipart: Multipart,
) -> HandlerResult<Json<Value>> {
    let vl = vision_client(&state)?;
    let form = Form::collect(multipart).await?;
    let (style, _) = CAPTION_PROMPTS.resolve(form.text("style"));
    let image = form.image("file").await?;
    let caption = vl.generate_caption(image, Some(style)).await?;
    Ok(Json(json!({ "caption": caption, "style": style })))
}

pub(crate) async fn enhance_prompt(
    State(state): State<AppState>,
    multipart: Multipart,
) -> HandlerResult<Json<Value>> {
    let vl = vision_client(&state)?;
    let form = Form::collect(multipart).await?;
    let prompt = form.require_text("prompt")?;
    let (context, _) = ENHANCE_PROMPTS.resolve(form.text("context"));
    let enhanced = vl.enhance_prompt(prompt, Some(context)).await?;
    Ok(Json(json!({
        "original": prompt,
        "enhanced": enhanced,
        "context": context,
    })))
}

pub(crate) async fn suggest_edits(
    State(state): State<AppState>,
    multipart: Multipart,
) -> HandlerResult<Json<Value>> {
    let vl = vision_client(&state)?;
    let form = Form::collect(multipart).await?;
    let suggestions = vl.suggest_edits(form.image("file").await?).await?;
    Ok(Json(json!({ "suggestions": suggestions })))
}

pub(crate) async fn extract_objects(
    State(state): State<AppState>,
    multipart: Multipart,
) -> HandlerResult<Json<Value>> {
    let vl = vision_client(&state)?;
    let form = Form::collect(multipart).await?;
    let objects = vl.extract_objects(form.image("file").await?).await?;
    Ok(Json(json!({ "count": objects.len(), "objects": objects })))
}

pub(crate) async fn generate_negative_prompt(
    State(state): State<AppState>,
    multipart: Multipart,
) -> HandlerResult<Json<Value>> {
    let vl = vision_client(&state)?;
    let form = Form::collect(multipart).await?;
    let prompt = form.require_text("prompt")?;
    let negative = vl.generate_negative_prompt(prompt).await?;
    Ok(Json(json!({ "prompt": prompt, "negativePrompt": negative })))
}

pub(crate) async fn suggest_color_palette(
    State(state): State<AppState>,
    multipart: Multipart,
) -> HandlerResult<Json<Value>> {
    let vl = vision_client(&state)?;
    let form = Form::collect(multipart).await?;
    let palette = vl.suggest_color_palette(form.image("file").await?).await?;
    Ok(Json(json!({ "paletteAnalysis": palette })))
}

pub(crate) async fn compare_images(
    State(state): State<AppState>,
    multipart: Multipart,
) -> HandlerResult<Json<Value>> {
    let vl = vision_client(&state)?;
    let form = Form::collect(multipart).await?;
    let first = form.image("image1").await?;
    let second = form.image("image2").await?;
    let comparison = vl.compare_images(first, second).await?;
    Ok(Json(json!({ "comparison": comparison })))
}

pub(crate) async fn generate_prompt(
    State(state): State<AppState>,
    multipart: Multipart,
) -> HandlerResult<Json<Value>> {
    let vl = vision_client(&state)?;
    let form = Form::collect(multipart).await?;
    let description = form.require_text("description")?;
    let style = form.text("style").unwrap_or(DEFAULT_PROMPT_STYLE);
    let prompt = vl.generate_image_prompt(description, style).await?;
    Ok(Json(json!({
        "description": description,
        "style": style,
        "prompt": prompt,
    })))
}
