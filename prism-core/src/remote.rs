//! Pipelines hosted by an out-of-process inference worker.
//!
//! Loading first resolves each repository's manifest through the hub cache, so a
//! missing or gated model fails here rather than inside the worker. The worker then
//! builds the pipeline and hands back an opaque id that later calls refer to.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use base64::{prelude::BASE64_STANDARD, Engine};
use hf_hub::api::tokio::{Api, ApiBuilder};
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::{
    decode, encode_png, Error, GenerationRequest, LoadSpec, ModelSource, Pipeline,
    PipelineKind, PipelineLoader, Result, SlotKey,
};

#[derive(Debug, Clone)]
pub struct RemoteLoader {
    client: reqwest::Client,
    base_url: String,
    hf_token: Option<String>,
}

impl RemoteLoader {
    pub fn new(base_url: impl Into<String>, hf_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            hf_token,
        }
    }

    fn hub(&self, cache_dir: PathBuf) -> Result<Api> {
        ApiBuilder::new()
            .with_cache_dir(cache_dir)
            .with_token(self.hf_token.clone())
            .with_progress(false)
            .build()
            .map_err(|e| Error::ResourceUnavailable(format!("model hub client: {e}")))
    }

    async fn resolve_manifests(&self, spec: &LoadSpec) -> Result<()> {
        let api = self.hub(spec.device.cache_dir.clone())?;
        for repo in spec.source.repositories() {
            let manifest = if repo == spec.source.model_id {
                spec.slot.manifest()
            } else {
                "config.json"
            };
            let path = api
                .model(repo.to_string())
                .get(manifest)
                .await
                .map_err(|e| Error::load_failed(spec.slot, format!("{repo}: {e}")))?;
            tracing::debug!(slot = %spec.slot, repo, path = %path.display(), "manifest resolved");
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct CreatePipeline<'a> {
    slot: SlotKey,
    kind: PipelineKind,
    #[serde(flatten)]
    source: &'a ModelSource,
    device: String,
    dtype: &'static str,
    cache_dir: String,
}

#[derive(Deserialize)]
struct CreatedPipeline {
    pipeline_id: String,
}

#[async_trait]
impl PipelineLoader for RemoteLoader {
    async fn load(&self, spec: &LoadSpec) -> Result<Arc<dyn Pipeline>> {
        self.resolve_manifests(spec).await?;

        let body = CreatePipeline {
            slot: spec.slot,
            kind: spec.kind,
            source: &spec.source,
            device: spec.device.device.to_string(),
            dtype: spec.device.precision.as_str(),
            cache_dir: spec.device.cache_dir.display().to_string(),
        };
        let response = self
            .client
            .post(format!("{}/v1/pipelines", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::load_failed(spec.slot, e))?;
        let created: CreatedPipeline = checked(response)
            .await
            .map_err(|e| Error::load_failed(spec.slot, e))?
            .json()
            .await
            .map_err(|e| Error::load_failed(spec.slot, e))?;

        Ok(Arc::new(RemotePipeline {
            client: self.client.clone(),
            url: format!("{}/v1/pipelines/{}", self.base_url, created.pipeline_id),
            slot: spec.slot,
        }))
    }
}

pub struct RemotePipeline {
    client: reqwest::Client,
    url: String,
    slot: SlotKey,
}

#[derive(Serialize)]
struct RunPipeline {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<String>,
    width: u32,
    height: u32,
    num_inference_steps: u32,
    guidance_scale: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    strength: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    controlnet_conditioning_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mask_image: Option<String>,
}

impl RunPipeline {
    fn from_request(request: GenerationRequest) -> Result<Self> {
        let png = |img: Option<DynamicImage>| -> Result<Option<String>> {
            img.map(|i| encode_png(&i).map(|b| BASE64_STANDARD.encode(b)))
                .transpose()
        };
        Ok(Self {
            image: png(request.image)?,
            mask_image: png(request.mask)?,
            prompt: request.prompt,
            negative_prompt: request.negative_prompt,
            width: request.width,
            height: request.height,
            num_inference_steps: request.steps,
            guidance_scale: request.guidance,
            seed: request.seed,
            strength: request.strength,
            controlnet_conditioning_scale: request.conditioning_scale,
        })
    }
}

#[derive(Deserialize)]
struct RunOutput {
    image: String,
}

#[async_trait]
impl Pipeline for RemotePipeline {
    async fn run(&self, request: GenerationRequest) -> Result<DynamicImage> {
        let body = RunPipeline::from_request(request)?;
        let response = self
            .client
            .post(format!("{}/run", self.url))
            .json(&body)
            .send()
            .await
            .map_err(Error::external)?;
        let output: RunOutput = checked(response)
            .await?
            .json()
            .await
            .map_err(Error::external)?;
        let bytes = BASE64_STANDARD
            .decode(output.image)
            .map_err(|e| Error::external(format!("worker returned invalid base64: {e}")))?;
        decode(&bytes)
            .map_err(|e| Error::external(format!("{} returned an unreadable image: {e}", self.slot)))
    }

    async fn release(&self) -> Result<()> {
        let response = self
            .client
            .delete(&self.url)
            .send()
            .await
            .map_err(Error::external)?;
        checked(response).await.map(|_| ())
    }
}

/// Turns non-success statuses into errors carrying the worker's message.
async fn checked(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::external(format!("inference worker returned {status}: {body}")))
}

#[cfg(test)]
mod tests {
    use image::RgbImage;

    use super::*;

    #[test]
    fn run_body_uses_worker_field_names() {
        let request = GenerationRequest::new("a lighthouse")
            .with_steps(30)
            .unwrap()
            .with_strength(0.6)
            .unwrap()
            .with_image(DynamicImage::ImageRgb8(RgbImage::new(64, 48)));
        let body = serde_json::to_value(RunPipeline::from_request(request).unwrap()).unwrap();

        assert_eq!(body["num_inference_steps"], 30);
        assert_eq!(body["guidance_scale"], 7.5);
        assert_eq!(body["width"], 64);
        assert_eq!(body["height"], 48);
        assert_eq!(body["strength"], 0.6);
        assert!(body["image"].as_str().is_some_and(|s| !s.is_empty()));
        assert!(body.get("mask_image").is_none());
        assert!(body.get("seed").is_none());
    }

    #[test]
    fn create_body_flattens_the_source() {
        let source = ModelSource::new("runwayml/stable-diffusion-v1-5")
            .with_controlnet("lllyasviel/sd-controlnet-canny");
        let body = serde_json::to_value(CreatePipeline {
            slot: SlotKey::ControlNet,
            kind: PipelineKind::ControlNet,
            source: &source,
            device: "cpu".into(),
            dtype: "float32",
            cache_dir: "./models".into(),
        })
        .unwrap();

        assert_eq!(body["slot"], "controlnet");
        assert_eq!(body["kind"], "controlnet");
        assert_eq!(body["model_id"], "runwayml/stable-diffusion-v1-5");
        assert_eq!(body["controlnet"], "lllyasviel/sd-controlnet-canny");
        assert!(body.get("vae").is_none());
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let loader = RemoteLoader::new("http://worker:9000/", None);
        assert_eq!(loader.base_url, "http://worker:9000");
    }
}
