//! Router construction.

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::CorsConfig;
use crate::handlers::{advanced, editing, generation, system, vision};
use crate::state::AppState;

/// Build CORS layer from configuration.
fn build_cors_layer(config: &CorsConfig) -> CorsLayer {
    match config {
        CorsConfig::AllowAll => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
        CorsConfig::AllowOrigins(origins) => {
            let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            CorsLayer::new()
                .allow_origin(allowed)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    }
}

pub fn create_router(state: AppState, cors_config: &CorsConfig) -> Router {
    let body_limit = state.max_upload_bytes;

    Router::new()
        // System
        .route("/", get(system::root))
        .route("/health", get(system::health))
        .route("/upload", post(system::upload))
        .route("/style-presets", get(system::style_presets))
        .route("/advanced-models-info", get(system::advanced_models_info))
        .route("/unload-models", post(system::unload_models))
        // Editing
        .route("/remove-background", post(editing::remove_background))
        .route("/inpaint", post(editing::inpaint))
        .route("/apply-filter", post(editing::apply_filter_handler))
        .route("/adjust-brightness", post(editing::adjust_brightness_handler))
        // Generation
        .route("/generate-image", post(generation::generate_image))
        .route("/generate-with-style", post(generation::generate_with_style))
        .route("/generative-fill", post(generation::generative_fill))
        .route("/outpaint", post(generation::outpaint))
        .route("/text-effect", post(generation::text_effect))
        .route("/style-transfer", post(generation::style_transfer))
        .route("/generate-with-controlnet", post(advanced::generate_with_controlnet))
        .route("/generate-with-sdxl", post(advanced::generate_with_sdxl))
        .route("/transform-with-sdxl", post(advanced::transform_with_sdxl))
        // Gemini
        .route("/analyze-image", post(vision::analyze_image))
        .route("/generate-caption", post(vision::generate_caption))
        .route("/enhance-prompt", post(vision::enhance_prompt))
        .route("/suggest-edits", post(vision::suggest_edits))
        .route("/extract-objects", post(vision::extract_objects))
        .route("/generate-negative-prompt", post(vision::generate_negative_prompt))
        .route("/suggest-color-palette", post(vision::suggest_color_palette))
        .route("/compare-images", post(vision::compare_images))
        .route("/generate-prompt", post(vision::generate_prompt))
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(build_cors_layer(cors_config))
        .layer(TraceLayer::new_for_http())
}
