//! ControlNet and SDXL endpoints.

use axum::extract::{Multipart, State};
use image::imageops::FilterType;
use image::DynamicImage;
use prism_core::{
    apply_filter, Capability, FilterKind, GenerationRequest, ModelSource, SlotKey, BASE_MODELS,
    CONTROLNET_VARIANTS, SDXL_MODELS, SDXL_VAE,
};
use tracing::{debug, info};

use super::{blocking, diffusion_request, png, require, run_detached, sized, snap, HandlerResult};
use crate::form::Form;
use crate::state::AppState;

const CONTROLNET_SIZE: (u32, u32) = (512, 512);
const SDXL_SIZE: (u32, u32) = (1024, 1024);
const DEFAULT_CONDITIONING_SCALE: f64 = 1.0;
const DEFAULT_REFINER_STEPS: u32 = 50;
const DEFAULT_SDXL_STRENGTH: f64 = 0.75;

fn sdxl(key: &str) -> ModelSource {
    let (_, model) = SDXL_MODELS.resolve(Some(key));
    ModelSource::new(model.id).with_vae(SDXL_VAE)
}

/// Conditioning image resized to the output size. Only edge maps are computed
/// locally; the flag reports whether that happened.
fn prepare_control(
    control: DynamicImage,
    preprocessor: &str,
    preprocess: bool,
    (width, height): (u32, u32),
) -> prism_core::Result<(DynamicImage, bool)> {
    let edges = preprocess && preprocessor == "canny";
    let control = if edges {
        apply_filter(&control, FilterKind::Edge)?
    } else {
        control
    };
    Ok((control.resize_exact(width, height, FilterType::Lanczos3), edges))
}

pub(crate) async fn generate_with_controlnet(
    State(state): State<AppState>,
    multipart: Multipart,
) -> HandlerResult {
    require(&state, Capability::Advanced)?;
    let form = Form::collect(multipart).await?;
    let prompt = form.require_text("prompt")?;
    let (variant_key, variant) = CONTROLNET_VARIANTS.resolve(form.text("controlnetType"));
    let scale = form.parse_or("conditioningScale", DEFAULT_CONDITIONING_SCALE)?;
    let preprocess = form.flag("preprocess", true)?;
    let explicit_size = form.text("width").is_some() || form.text("height").is_some();
    let mut request = diffusion_request(&form, prompt)?.with_conditioning_scale(scale)?;
    if explicit_size {
        request = sized(request, &form, CONTROLNET_SIZE)?;
    }

    let control = form.image("file").await?;
    if !explicit_size {
        // Output follows the conditioning image, floored to the latent grid.
        request = request.with_size(control.width(), control.height())?;
    }
    let size = (request.width, request.height);
    let preprocessor = variant.preprocessor;
    let (control, preprocessed) =
        blocking(move || prepare_control(control, preprocessor, preprocess, size)).await?;
    if preprocess && !preprocessed {
        debug!(preprocessor, "no local preprocessor, using the image as given");
    }
    info!(
        variant = variant_key,
        preprocessed,
        scale,
        width = size.0,
        height = size.1,
        "controlnet generation"
    );

    let (_, base) = BASE_MODELS.resolve(form.text("model"));
    let source = ModelSource::new(base.id).with_controlnet(variant.id);
    let output =
        run_detached(&state, SlotKey::ControlNet, source, request.with_image(control)).await?;
    png(output, "controlnet.png").await
}

pub(crate) async fn generate_with_sdxl(
    State(state): State<AppState>,
    multipart: Multipart,
) -> HandlerResult {
    require(&state, Capability::Advanced)?;
    let form = Form::collect(multipart).await?;
    let prompt = form.require_text("prompt")?;
    let request = sized(diffusion_request(&form, prompt)?, &form, SDXL_SIZE)?;
    let use_refiner = form.flag("useRefiner", false)?;
    let refine = if use_refiner {
        let steps = form.parse_or("refinerSteps", DEFAULT_REFINER_STEPS)?;
        Some(
            GenerationRequest::new(request.prompt.clone())
                .with_negative_prompt(request.negative_prompt.clone())
                .with_seed(request.seed)
                .with_guidance(request.guidance)?
                .with_steps(steps)?,
        )
    } else {
        None
    };

    let base = run_detached(&state, SlotKey::Sdxl, sdxl("sdxl-base"), request).await?;
    let output = match refine {
        Some(refine) => {
            run_detached(
                &state,
                SlotKey::SdxlRefiner,
                sdxl("sdxl-refiner"),
                refine.with_image(base),
            )
            .await?
        }
        None => base,
    };
    png(output, "sdxl.png").await
}

pub(crate) async fn transform_with_sdxl(
    State(state): State<AppState>,
    multipart: Multipart,
) -> HandlerResult {
    require(&state, Capability::Advanced)?;
    let form = Form::collect(multipart).await?;
    let prompt = form.require_text("prompt")?;
    let strength = form.parse_or("strength", DEFAULT_SDXL_STRENGTH)?;
    let request = diffusion_request(&form, prompt)?.with_strength(strength)?;

    let image = snap(form.image("file").await?).await?;
    let output = run_detached(
        &state,
        SlotKey::SdxlImg2Img,
        sdxl("sdxl-base"),
        request.with_image(image),
    )
    .await?;
    png(output, "sdxl_transform.png").await
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;

    fn split(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        }))
    }

    #[test]
    fn canny_runs_the_edge_filter_locally() {
        let (control, edges) = prepare_control(split(64, 64), "canny", true, (64, 64)).unwrap();
        assert!(edges);
        let rgb = control.to_rgb8();
        assert_eq!(rgb.get_pixel(2, 32), &Rgb([0, 0, 0]));
        assert_eq!(rgb.get_pixel(32, 32), &Rgb([255, 255, 255]));
        assert_eq!(rgb.get_pixel(61, 32), &Rgb([0, 0, 0]));
    }

    #[test]
    fn other_preprocessors_pass_the_image_through() {
        let (control, edges) = prepare_control(split(64, 64), "depth", true, (64, 64)).unwrap();
        assert!(!edges);
        assert_eq!(control.to_rgb8().get_pixel(61, 32), &Rgb([255, 255, 255]));

        let (control, edges) = prepare_control(split(64, 64), "canny", false, (32, 16)).unwrap();
        assert!(!edges);
        assert_eq!((control.width(), control.height()), (32, 16));
    }
}
