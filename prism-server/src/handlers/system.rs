use std::collections::BTreeMap;

use axum::extract::{Multipart, State};
use axum::Json;
use prism_core::{
    decode, Capability, Error, ASPECT_RATIOS, BASE_MODELS, CONTROLNET_VARIANTS, SDXL_MODELS,
    STYLES, TEXT_EFFECTS,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use super::{blocking, HandlerResult};
use crate::form::Form;
use crate::state::AppState;

pub(crate) async fn root() -> Json<Value> {
    Json(json!({
        "name": "Prism Photo Editor API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "upload": "/upload",
            "removeBackground": "/remove-background",
            "inpaint": "/inpaint",
            "applyFilter": "/apply-filter",
            "adjustBrightness": "/adjust-brightness",
            "generateImage": "/generate-image (requires ENABLE_STABLE_DIFFUSION)",
            "generateWithStyle": "/generate-with-style",
            "generativeFill": "/generative-fill",
            "outpaint": "/outpaint",
            "textEffect": "/text-effect",
            "styleTransfer": "/style-transfer",
            "generateWithControlnet": "/generate-with-controlnet (requires ENABLE_ADVANCED_MODELS)",
            "generateWithSdxl": "/generate-with-sdxl",
            "transformWithSdxl": "/transform-with-sdxl",
            "analyzeImage": "/analyze-image (requires GEMINI_API_KEY)",
            "stylePresets": "/style-presets",
            "advancedModelsInfo": "/advanced-models-info",
            "health": "/health",
        }
    }))
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<Value> {
    let capabilities = state.registry.capabilities();
    Json(json!({
        "status": "healthy",
        "modelsEnabled": capabilities.is_ready(Capability::Diffusion),
        "advancedModelsEnabled": capabilities.is_ready(Capability::Advanced),
        "geminiEnabled": state.vision.is_some(),
        "device": state.device().to_string(),
        "capabilities": capabilities.statuses(),
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UploadResponse {
    file_id: String,
    filename: String,
    width: u32,
    height: u32,
    size: usize,
}

pub(crate) async fn upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> HandlerResult<Json<UploadResponse>> {
    let form = Form::collect(multipart).await?;
    let file = form.file("file")?;
    if !file.is_image() {
        return Err(Error::invalid("file", "File must be an image").into());
    }

    let bytes = file.bytes.clone();
    let (width, height) = blocking({
        let bytes = bytes.clone();
        move || decode(&bytes).map(|img| (img.width(), img.height()))
    })
    .await?;

    let file_id = Uuid::new_v4().to_string();
    let filename = format!(
        "{file_id}{}",
        file.extension().unwrap_or_else(|| ".png".to_string())
    );
    let path = state.upload_dir.join(&filename);
    tokio::fs::write(&path, &bytes).await.map_err(Error::from)?;
    info!(path = %path.display(), width, height, size = bytes.len(), "upload stored");

    Ok(Json(UploadResponse {
        file_id,
        filename,
        width,
        height,
        size: bytes.len(),
    }))
}

fn table<T: Serialize>(entries: &'static [(&'static str, T)]) -> BTreeMap<&'static str, &'static T> {
    entries.iter().map(|(key, value)| (*key, value)).collect()
}

pub(crate) async fn style_presets() -> Json<Value> {
    Json(json!({
        "styles": table(STYLES.entries()),
        "defaultStyle": STYLES.default_key(),
        "aspectRatios": table(ASPECT_RATIOS.entries()),
        "defaultAspectRatio": ASPECT_RATIOS.default_key(),
        "textEffects": table(TEXT_EFFECTS.entries()),
        "models": table(BASE_MODELS.entries()),
    }))
}

pub(crate) async fn advanced_models_info(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "advancedModelsEnabled": state.registry.capabilities().is_ready(Capability::Advanced),
        "controlnetModels": table(CONTROLNET_VARIANTS.entries()),
        "sdxlModels": table(SDXL_MODELS.entries()),
        "loadedModels": state.registry.list_occupied(),
    }))
}

pub(crate) async fn unload_models(State(state): State<AppState>) -> Json<Value> {
    let released = state.registry.release_all().await;
    info!(count = released.len(), "unloaded models on request");
    Json(json!({
        "status": "unloaded",
        "released": released,
    }))
}
