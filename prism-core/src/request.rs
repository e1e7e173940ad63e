use image::DynamicImage;

use crate::{normalize_dimensions, Error, Result};

pub const DEFAULT_STEPS: u32 = 50;
pub const DEFAULT_GUIDANCE: f64 = 7.5;
pub const STEPS_RANGE: (u32, u32) = (1, 150);
pub const GUIDANCE_RANGE: (f64, f64) = (0.0, 30.0);
pub const DIMENSION_RANGE: (u32, u32) = (64, 2048);
pub const STRENGTH_RANGE: (f64, f64) = (0.0, 1.0);
pub const CONDITIONING_RANGE: (f64, f64) = (0.0, 2.0);
pub const BRIGHTNESS_RANGE: (f64, f64) = (0.1, 3.0);
pub const OUTPAINT_PIXELS_RANGE: (u32, u32) = (64, 512);

/// Rejects `value` unless it lies in `[min, max]`.
pub fn ensure_range<T>(name: &str, value: T, (min, max): (T, T)) -> Result<T>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    // NaN compares false on both sides and is rejected here too.
    if value >= min && value <= max {
        Ok(value)
    } else {
        Err(Error::invalid(
            name,
            format!("must be between {min} and {max}, got {value}"),
        ))
    }
}

/// The validated parameter set for one backend invocation.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub guidance: f64,
    pub seed: Option<u64>,
    /// How far img2img/inpaint may move away from the input image.
    pub strength: Option<f64>,
    pub conditioning_scale: Option<f64>,
    /// Init image for img2img/inpaint, conditioning image for ControlNet.
    pub image: Option<DynamicImage>,
    pub mask: Option<DynamicImage>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: None,
            width: 512,
            height: 512,
            steps: DEFAULT_STEPS,
            guidance: DEFAULT_GUIDANCE,
            seed: None,
            strength: None,
            conditioning_scale: None,
            image: None,
            mask: None,
        }
    }

    /// Validates the requested size and floors it onto the latent grid.
    pub fn with_size(mut self, width: u32, height: u32) -> Result<Self> {
        let width = ensure_range("width", width, DIMENSION_RANGE)?;
        let height = ensure_range("height", height, DIMENSION_RANGE)?;
        (self.width, self.height) = normalize_dimensions(width, height);
        Ok(self)
    }

    pub fn with_steps(mut self, steps: u32) -> Result<Self> {
        self.steps = ensure_range("steps", steps, STEPS_RANGE)?;
        Ok(self)
    }

    pub fn with_guidance(mut self, guidance: f64) -> Result<Self> {
        self.guidance = ensure_range("guidance_scale", guidance, GUIDANCE_RANGE)?;
        Ok(self)
    }

    pub fn with_strength(mut self, strength: f64) -> Result<Self> {
        self.strength = Some(ensure_range("strength", strength, STRENGTH_RANGE)?);
        Ok(self)
    }

    pub fn with_conditioning_scale(mut self, scale: f64) -> Result<Self> {
        self.conditioning_scale = Some(ensure_range(
            "controlnet_conditioning_scale",
            scale,
            CONDITIONING_RANGE,
        )?);
        Ok(self)
    }

    pub fn with_negative_prompt(mut self, negative: Option<String>) -> Self {
        self.negative_prompt = negative.filter(|n| !n.trim().is_empty());
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Attaches an input image, taking the output size from it.
    pub fn with_image(mut self, image: DynamicImage) -> Self {
        self.width = image.width();
        self.height = image.height();
        self.image = Some(image);
        self
    }

    pub fn with_mask(mut self, mask: DynamicImage) -> Self {
        self.mask = Some(mask);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_are_validated_then_floored() {
        let req = GenerationRequest::new("x").with_size(513, 700).unwrap();
        assert_eq!((req.width, req.height), (512, 696));
        assert!(GenerationRequest::new("x").with_size(32, 512).is_err());
        assert!(GenerationRequest::new("x").with_size(512, 4096).is_err());
    }

    #[test]
    fn ranges_are_inclusive_and_reject_nan() {
        assert_eq!(ensure_range("f", 0.1, BRIGHTNESS_RANGE).unwrap(), 0.1);
        assert_eq!(ensure_range("f", 3.0, BRIGHTNESS_RANGE).unwrap(), 3.0);
        assert!(ensure_range("f", 3.01, BRIGHTNESS_RANGE).is_err());
        assert!(ensure_range("f", f64::NAN, BRIGHTNESS_RANGE).is_err());
        assert!(ensure_range("pixels", 63, OUTPAINT_PIXELS_RANGE).is_err());
    }

    #[test]
    fn blank_negative_prompt_is_dropped() {
        let req = GenerationRequest::new("x").with_negative_prompt(Some("  ".into()));
        assert!(req.negative_prompt.is_none());
    }

    #[test]
    fn strength_outside_unit_interval_is_rejected() {
        assert!(GenerationRequest::new("x").with_strength(1.5).is_err());
        let req = GenerationRequest::new("x").with_strength(0.0).unwrap();
        assert_eq!(req.strength, Some(0.0));
    }
}
