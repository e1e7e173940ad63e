//! Classical filters expressed as fixed convolution kernels.
//!
//! Every filter runs on the CPU through `candle-core` on a `(1, 3, h, w)` f32
//! tensor. Borders are replicated before convolving so edges keep their
//! brightness.

use candle_core::{DType, Device, Tensor};
use image::DynamicImage;

use crate::{image_to_tensor, tensor_to_image, Result};

const BLUR_SIZE: usize = 15;
const BLUR_SIGMA: f32 = 2.6;
const EDGE_THRESHOLD: f32 = 150.0;
const LUMA: [f32; 3] = [0.299, 0.587, 0.114];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Blur,
    Sharpen,
    Edge,
    Grayscale,
    None,
}

impl FilterKind {
    pub const ALL: [FilterKind; 5] = [
        FilterKind::Blur,
        FilterKind::Sharpen,
        FilterKind::Edge,
        FilterKind::Grayscale,
        FilterKind::None,
    ];

    /// Unrecognised names leave the image untouched.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "blur" => Self::Blur,
            "sharpen" => Self::Sharpen,
            "edge" | "edges" => Self::Edge,
            "grayscale" | "greyscale" => Self::Grayscale,
            _ => Self::None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Blur => "blur",
            Self::Sharpen => "sharpen",
            Self::Edge => "edge",
            Self::Grayscale => "grayscale",
            Self::None => "none",
        }
    }
}

pub fn apply_filter(img: &DynamicImage, kind: FilterKind) -> Result<DynamicImage> {
    let rgb = img.to_rgb8();
    if kind == FilterKind::None || rgb.width() == 0 || rgb.height() == 0 {
        return Ok(DynamicImage::ImageRgb8(rgb));
    }
    let input = image_to_tensor(&rgb)?;
    let output = match kind {
        FilterKind::Blur => gaussian_blur(&input)?,
        FilterKind::Sharpen => sharpen(&input)?,
        FilterKind::Edge => edges(&input)?,
        FilterKind::Grayscale => grayscale(&input)?,
        FilterKind::None => input,
    };
    tensor_to_image(&output.squeeze(0)?)
}

/// Pads the two spatial dimensions by repeating the outermost pixels.
fn replicate_pad(t: &Tensor, pad_h: usize, pad_w: usize) -> Result<Tensor> {
    Ok(t.pad_with_same(2, pad_h, pad_h)?
        .pad_with_same(3, pad_w, pad_w)?)
}

/// One kernel per channel, applied with `groups = 3`.
fn depthwise(t: &Tensor, kernel: &[f32], kh: usize, kw: usize) -> Result<Tensor> {
    let per_channel: Vec<f32> = kernel
        .iter()
        .copied()
        .cycle()
        .take(kernel.len() * 3)
        .collect();
    let kernel = Tensor::from_vec(per_channel, (3, 1, kh, kw), &Device::Cpu)?;
    let padded = replicate_pad(t, kh / 2, kw / 2)?;
    Ok(padded.conv2d(&kernel, 0, 1, 1, 3)?)
}

fn gaussian_blur(t: &Tensor) -> Result<Tensor> {
    let half = (BLUR_SIZE / 2) as f32;
    let mut weights: Vec<f32> = (0..BLUR_SIZE)
        .map(|i| {
            let x = i as f32 - half;
            (-(x * x) / (2.0 * BLUR_SIGMA * BLUR_SIGMA)).exp()
        })
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.iter_mut().for_each(|w| *w /= sum);

    // Separable: a horizontal pass followed by a vertical one.
    let horizontal = depthwise(t, &weights, 1, BLUR_SIZE)?;
    depthwise(&horizontal, &weights, BLUR_SIZE, 1)
}

fn sharpen(t: &Tensor) -> Result<Tensor> {
    #[rustfmt::skip]
    let kernel = [
        -1.0, -1.0, -1.0,
        -1.0,  9.0, -1.0,
        -1.0, -1.0, -1.0,
    ];
    depthwise(t, &kernel, 3, 3)
}

fn luma(t: &Tensor) -> Result<Tensor> {
    let kernel = Tensor::from_slice(&LUMA, (1, 3, 1, 1), &Device::Cpu)?;
    Ok(t.conv2d(&kernel, 0, 1, 1, 1)?)
}

fn grayscale(t: &Tensor) -> Result<Tensor> {
    let y = luma(t)?.round()?;
    Ok(Tensor::cat(&[&y, &y, &y], 1)?)
}

fn edges(t: &Tensor) -> Result<Tensor> {
    #[rustfmt::skip]
    let sobel: [f32; 18] = [
        // x
        -1.0, 0.0, 1.0,
        -2.0, 0.0, 2.0,
        -1.0, 0.0, 1.0,
        // y
        -1.0, -2.0, -1.0,
         0.0,  0.0,  0.0,
         1.0,  2.0,  1.0,
    ];
    let kernel = Tensor::from_slice(&sobel, (2, 1, 3, 3), &Device::Cpu)?;
    let y = replicate_pad(&luma(t)?, 1, 1)?;
    let gradients = y.conv2d(&kernel, 0, 1, 1, 1)?;
    let magnitude = gradients.sqr()?.sum_keepdim(1)?.sqrt()?;
    let mask = magnitude
        .ge(EDGE_THRESHOLD)?
        .to_dtype(DType::F32)?
        .affine(255.0, 0.0)?;
    Ok(Tensor::cat(&[&mask, &mask, &mask], 1)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn solid(w: u32, h: u32, px: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb(px)))
    }

    #[test]
    fn unknown_names_fall_back_to_none() {
        assert_eq!(FilterKind::from_name("Grayscale"), FilterKind::Grayscale);
        assert_eq!(FilterKind::from_name("vignette"), FilterKind::None);
    }

    #[test]
    fn grayscale_channels_are_equal() {
        let img = RgbImage::from_fn(16, 12, |x, y| Rgb([(x * 13) as u8, (y * 19) as u8, 200]));
        let out = apply_filter(&DynamicImage::ImageRgb8(img), FilterKind::Grayscale)
            .unwrap()
            .to_rgb8();
        assert_eq!(out.dimensions(), (16, 12));
        for px in out.pixels() {
            assert_eq!(px[0], px[1]);
            assert_eq!(px[1], px[2]);
        }
    }

    #[test]
    fn blur_and_sharpen_keep_flat_regions_flat() {
        let img = solid(20, 20, [90, 120, 30]);
        for kind in [FilterKind::Blur, FilterKind::Sharpen] {
            let out = apply_filter(&img, kind).unwrap().to_rgb8();
            assert_eq!(out.dimensions(), (20, 20));
            assert!(out.pixels().all(|p| p.0 == [90, 120, 30]), "{kind:?}");
        }
    }

    #[test]
    fn edge_detects_a_step() {
        let img = RgbImage::from_fn(10, 10, |x, _| if x < 5 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) });
        let out = apply_filter(&DynamicImage::ImageRgb8(img), FilterKind::Edge)
            .unwrap()
            .to_rgb8();
        assert_eq!(out.get_pixel(0, 5).0, [0, 0, 0]);
        assert_eq!(out.get_pixel(5, 5).0, [255, 255, 255]);
        assert_eq!(out.get_pixel(9, 5).0, [0, 0, 0]);
    }
}
