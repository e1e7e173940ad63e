//! Composition root: turns configuration into a ready [`AppContext`].

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use prism_core::{
    select_best_device, Availability, Capability, CapabilityTable, DeviceConfig, DeviceMap,
    GeminiClient, PipelineLoader, Registry, RemoteLoader, VisionLanguage,
};
use tracing::{info, warn};

use crate::config::Args;

/// Everything a handler can reach.
pub struct AppContext {
    pub registry: Registry,
    /// Absent when no API key is configured.
    pub vision: Option<Arc<dyn VisionLanguage>>,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl AppContext {
    pub fn new(registry: Registry, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            vision: None,
            upload_dir: upload_dir.into(),
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }

    pub fn with_vision(mut self, vision: Arc<dyn VisionLanguage>) -> Self {
        self.vision = Some(vision);
        self
    }

    pub fn device(&self) -> DeviceMap {
        self.registry.device().device
    }
}

fn family(
    enabled: bool,
    flag: &str,
    what: &str,
    loader: Option<&Arc<dyn PipelineLoader>>,
) -> Availability {
    match (enabled, loader) {
        (false, _) => Availability::Disabled(format!(
            "{what} is not enabled. Set {flag}=true in .env"
        )),
        (true, None) => Availability::Unavailable(format!(
            "{what} needs an inference worker. Set INFERENCE_WORKER_URL"
        )),
        (true, Some(loader)) => Availability::Ready(Arc::clone(loader)),
    }
}

/// Resolves which capability families this process serves.
pub fn capability_table(args: &Args, loader: Option<Arc<dyn PipelineLoader>>) -> CapabilityTable {
    let loader = loader.as_ref();
    CapabilityTable::new()
        .with(
            Capability::Diffusion,
            family(
                args.enable_stable_diffusion,
                "ENABLE_STABLE_DIFFUSION",
                "AI image generation",
                loader,
            ),
        )
        .with(
            Capability::Advanced,
            family(
                args.enable_advanced_models,
                "ENABLE_ADVANCED_MODELS",
                "ControlNet and SDXL generation",
                loader,
            ),
        )
        .with(
            Capability::BackgroundRemoval,
            family(
                args.enable_background_removal,
                "ENABLE_BACKGROUND_REMOVAL",
                "Background removal",
                loader,
            ),
        )
}

pub async fn bootstrap(args: &Args) -> Result<AppContext> {
    for dir in [&args.upload_dir, &args.model_cache_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
    }

    let device = select_best_device(args.device);
    let loader = args.inference_worker_url.as_deref().map(|url| {
        info!(worker = url, "using inference worker");
        Arc::new(RemoteLoader::new(url, args.hf_token.clone())) as Arc<dyn PipelineLoader>
    });
    let table = capability_table(args, loader);
    for (capability, status) in table.statuses() {
        match status.reason {
            None => info!(%capability, "capability ready"),
            Some(reason) => warn!(%capability, %reason, "capability off"),
        }
    }

    let registry = Registry::new(table, DeviceConfig::new(device, &args.model_cache_dir));
    let mut ctx = AppContext::new(registry, &args.upload_dir);
    ctx.max_upload_bytes = args.max_upload_bytes;

    match args.gemini_key() {
        Some(key) => {
            let client = GeminiClient::new(key)
                .with_model(&args.gemini_model)
                .with_api_base(&args.gemini_api_base);
            info!(model = client.model(), "Gemini integration enabled");
            ctx = ctx.with_vision(Arc::new(client));
        }
        None => warn!("GEMINI_API_KEY not set, Gemini endpoints will return 503"),
    }

    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn missing_worker_marks_enabled_families_unavailable() {
        let args = Args::try_parse_from(["prism-server", "--enable-stable-diffusion", "true"]).unwrap();
        let table = capability_table(&args, None);
        assert!(matches!(
            table.availability(Capability::Diffusion),
            Availability::Unavailable(_)
        ));
        assert!(matches!(
            table.availability(Capability::Advanced),
            Availability::Disabled(_)
        ));
    }

    #[tokio::test]
    async fn bootstrap_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = dir.path().join("uploads");
        let models = dir.path().join("models");
        let args = Args::try_parse_from([
            "prism-server",
            "--upload-dir",
            uploads.to_str().unwrap(),
            "--model-cache-dir",
            models.to_str().unwrap(),
            "--inference-worker-url",
            "http://127.0.0.1:9",
            "--gemini-api-key",
            "",
        ])
        .unwrap();

        let ctx = bootstrap(&args).await.unwrap();
        assert!(uploads.is_dir() && models.is_dir());
        assert!(ctx.vision.is_none());
        assert!(ctx.registry.capabilities().is_ready(Capability::BackgroundRemoval));
        assert!(!ctx.registry.capabilities().is_ready(Capability::Diffusion));
    }
}
