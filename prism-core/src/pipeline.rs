use std::{fmt, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use image::DynamicImage;
use serde::Serialize;

use crate::{DeviceMap, GenerationRequest, Precision};

/// Family of capabilities that are switched on and off together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Baseline text-to-image, inpainting and img2img.
    Diffusion,
    /// ControlNet and SDXL.
    Advanced,
    BackgroundRemoval,
}

impl Capability {
    pub const ALL: [Capability; 3] = [
        Capability::Diffusion,
        Capability::Advanced,
        Capability::BackgroundRemoval,
    ];
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Diffusion => "diffusion",
            Self::Advanced => "advanced",
            Self::BackgroundRemoval => "background-removal",
        })
    }
}

/// What a pipeline does once loaded; tells the worker which pipeline class to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineKind {
    TextToImage,
    ImageToImage,
    Inpaint,
    #[serde(rename = "controlnet")]
    ControlNet,
    BackgroundRemoval,
}

/// One single-occupancy holder for a heavyweight resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SlotKey {
    Base,
    Inpaint,
    Img2Img,
    ControlNet,
    Sdxl,
    SdxlRefiner,
    SdxlImg2Img,
    Background,
}

impl SlotKey {
    pub const ALL: [SlotKey; 8] = [
        SlotKey::Base,
        SlotKey::Inpaint,
        SlotKey::Img2Img,
        SlotKey::ControlNet,
        SlotKey::Sdxl,
        SlotKey::SdxlRefiner,
        SlotKey::SdxlImg2Img,
        SlotKey::Background,
    ];

    pub fn capability(&self) -> Capability {
        match self {
            Self::Base | Self::Inpaint | Self::Img2Img => Capability::Diffusion,
            Self::ControlNet | Self::Sdxl | Self::SdxlRefiner | Self::SdxlImg2Img => {
                Capability::Advanced
            }
            Self::Background => Capability::BackgroundRemoval,
        }
    }

    pub fn kind(&self) -> PipelineKind {
        match self {
            Self::Base | Self::Sdxl => PipelineKind::TextToImage,
            Self::Img2Img | Self::SdxlRefiner | Self::SdxlImg2Img => PipelineKind::ImageToImage,
            Self::Inpaint => PipelineKind::Inpaint,
            Self::ControlNet => PipelineKind::ControlNet,
            Self::Background => PipelineKind::BackgroundRemoval,
        }
    }

    /// File whose presence in the hub repository proves the model exists.
    pub fn manifest(&self) -> &'static str {
        match self {
            Self::Background => "config.json",
            _ => "model_index.json",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Inpaint => "inpaint",
            Self::Img2Img => "img2img",
            Self::ControlNet => "controlnet",
            Self::Sdxl => "sdxl",
            Self::SdxlRefiner => "sdxl-refiner",
            Self::SdxlImg2Img => "sdxl-img2img",
            Self::Background => "background",
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SlotKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// The models an occupant is built from. Two sources are interchangeable iff
/// their identifiers are equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelSource {
    pub model_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controlnet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vae: Option<String>,
}

impl ModelSource {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            controlnet: None,
            vae: None,
        }
    }

    pub fn with_controlnet(mut self, id: impl Into<String>) -> Self {
        self.controlnet = Some(id.into());
        self
    }

    pub fn with_vae(mut self, id: impl Into<String>) -> Self {
        self.vae = Some(id.into());
        self
    }

    /// Every hub repository this source needs, primary model first.
    pub fn repositories(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.model_id.as_str())
            .chain(self.controlnet.as_deref())
            .chain(self.vae.as_deref())
    }

    pub fn identifier(&self) -> String {
        let mut id = self.model_id.clone();
        if let Some(controlnet) = &self.controlnet {
            id.push_str("+controlnet=");
            id.push_str(controlnet);
        }
        if let Some(vae) = &self.vae {
            id.push_str("+vae=");
            id.push_str(vae);
        }
        id
    }
}

/// Device placement shared by every slot of one registry.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub device: DeviceMap,
    pub precision: Precision,
    pub cache_dir: PathBuf,
}

impl DeviceConfig {
    pub fn new(device: DeviceMap, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            device,
            precision: Precision::for_device(device),
            cache_dir: cache_dir.into(),
        }
    }
}

/// Everything a loader needs to construct one occupant.
#[derive(Debug, Clone)]
pub struct LoadSpec {
    pub slot: SlotKey,
    pub kind: PipelineKind,
    pub source: ModelSource,
    pub device: DeviceConfig,
}

/// A loaded, ready-to-invoke backend pipeline.
#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn run(&self, request: GenerationRequest) -> crate::Result<DynamicImage>;

    /// Frees whatever accelerator memory the backend holds for this pipeline.
    async fn release(&self) -> crate::Result<()> {
        Ok(())
    }
}

/// Constructs pipelines for one capability family.
#[async_trait]
pub trait PipelineLoader: Send + Sync {
    async fn load(&self, spec: &LoadSpec) -> crate::Result<Arc<dyn Pipeline>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_include_components() {
        let plain = ModelSource::new("runwayml/stable-diffusion-v1-5");
        let canny = plain.clone().with_controlnet("lllyasviel/sd-controlnet-canny");
        let depth = plain.clone().with_controlnet("lllyasviel/sd-controlnet-depth");
        assert_ne!(plain.identifier(), canny.identifier());
        assert_ne!(canny.identifier(), depth.identifier());
        assert_eq!(canny.repositories().count(), 2);
    }

    #[test]
    fn slots_map_to_families() {
        assert_eq!(SlotKey::Inpaint.capability(), Capability::Diffusion);
        assert_eq!(SlotKey::SdxlRefiner.capability(), Capability::Advanced);
        assert_eq!(SlotKey::Background.kind(), PipelineKind::BackgroundRemoval);
    }
}
