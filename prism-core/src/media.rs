//! Image I/O and the deterministic transforms that need no model.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImage, GenericImageView, GrayImage, Luma, Rgb, RgbImage};

use crate::{Error, OutpaintDirection, Result};

/// Side of the latent grid every diffusion backend works on.
pub const LATENT_GRID: u32 = 8;
const MASK_THRESHOLD: u8 = 127;

/// Decodes an uploaded byte stream, sniffing the format from its content.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(Error::Decode("empty image payload".to_string()));
    }
    image::load_from_memory(bytes).map_err(|e| Error::Decode(e.to_string()))
}

/// Decodes and flattens to 8-bit RGB.
pub fn decode_rgb(bytes: &[u8]) -> Result<DynamicImage> {
    Ok(DynamicImage::ImageRgb8(decode(bytes)?.to_rgb8()))
}

pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
    Ok(bytes)
}

/// Floors both sides to a multiple of [`LATENT_GRID`]. Never rounds up, so 513×513 becomes 512×512.
pub fn normalize_dimensions(width: u32, height: u32) -> (u32, u32) {
    (
        (width / LATENT_GRID) * LATENT_GRID,
        (height / LATENT_GRID) * LATENT_GRID,
    )
}

/// Resizes `img` to its normalized dimensions, returning it untouched when already aligned.
pub fn snap_to_latent_grid(img: DynamicImage) -> Result<DynamicImage> {
    let (width, height) = img.dimensions();
    let (w, h) = normalize_dimensions(width, height);
    if w == 0 || h == 0 {
        return Err(Error::invalid(
            "image",
            format!("{width}x{height} is smaller than the {LATENT_GRID}px latent grid"),
        ));
    }
    if (w, h) == (width, height) {
        return Ok(img);
    }
    Ok(img.resize_exact(w, h, FilterType::Lanczos3))
}

/// Scales every channel by `factor`, clamping into `[0, 255]` and truncating.
pub fn adjust_brightness(img: &DynamicImage, factor: f32) -> DynamicImage {
    let mut rgb = img.to_rgb8();
    for px in rgb.pixels_mut() {
        for c in px.0.iter_mut() {
            *c = (f32::from(*c) * factor).clamp(0.0, 255.0) as u8;
        }
    }
    DynamicImage::ImageRgb8(rgb)
}

/// White (above 127) marks pixels to fill.
pub fn to_mask(img: &DynamicImage) -> GrayImage {
    let mut mask = img.to_luma8();
    for px in mask.pixels_mut() {
        px.0[0] = if px.0[0] > MASK_THRESHOLD { 255 } else { 0 };
    }
    mask
}

/// Fills masked pixels from the boundary inwards with the mean of their known neighbours.
///
/// Used for object removal when no inpainting model is available.
pub fn inpaint_classical(img: &DynamicImage, mask: &DynamicImage) -> Result<DynamicImage> {
    let mut rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    let mask = to_mask(mask);
    let mask = if mask.dimensions() == (width, height) {
        mask
    } else {
        image::imageops::resize(&mask, width, height, FilterType::Nearest)
    };

    let mut known: Vec<bool> = mask.pixels().map(|p| p.0[0] == 0).collect();
    let idx = |x: u32, y: u32| (y * width + x) as usize;
    if !known.iter().any(|k| *k) {
        return Err(Error::invalid("mask", "mask covers the whole image"));
    }

    let mut pending: Vec<(u32, u32)> = (0..height)
        .flat_map(|y| (0..width).map(move |x| (x, y)))
        .filter(|&(x, y)| !known[idx(x, y)])
        .collect();

    while !pending.is_empty() {
        let mut filled = Vec::new();
        let mut remaining = Vec::with_capacity(pending.len());
        for &(x, y) in &pending {
            let mut sum = [0u32; 3];
            let mut count = 0u32;
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let (nx, ny) = (i64::from(x) + dx, i64::from(y) + dy);
                    if (dx, dy) == (0, 0)
                        || nx < 0
                        || ny < 0
                        || nx >= i64::from(width)
                        || ny >= i64::from(height)
                    {
                        continue;
                    }
                    let (nx, ny) = (nx as u32, ny as u32);
                    if known[idx(nx, ny)] {
                        let p = rgb.get_pixel(nx, ny).0;
                        sum.iter_mut().zip(p).for_each(|(s, v)| *s += u32::from(v));
                        count += 1;
                    }
                }
            }
            if count == 0 {
                remaining.push((x, y));
            } else {
                let avg = sum.map(|s| ((s + count / 2) / count) as u8);
                filled.push((x, y, avg));
            }
        }
        // Commit after the sweep so each ring only sees the previous ring.
        for (x, y, avg) in filled {
            rgb.put_pixel(x, y, Rgb(avg));
            known[idx(x, y)] = true;
        }
        pending = remaining;
    }

    Ok(DynamicImage::ImageRgb8(rgb))
}

/// Enlarges the canvas by `pixels` on the requested side(s).
///
/// Returns the extended image, with the border replicated into the new area as a
/// starting point for the inpainter, and a mask that is white over the new area.
pub fn extend_canvas(
    img: &DynamicImage,
    direction: OutpaintDirection,
    pixels: u32,
) -> Result<(DynamicImage, DynamicImage)> {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    let (left, right, top, bottom) = match direction {
        OutpaintDirection::Left => (pixels, 0, 0, 0),
        OutpaintDirection::Right => (0, pixels, 0, 0),
        OutpaintDirection::Top => (0, 0, pixels, 0),
        OutpaintDirection::Bottom => (0, 0, 0, pixels),
        OutpaintDirection::All => (pixels, pixels, pixels, pixels),
    };
    let (new_w, new_h) = (width + left + right, height + top + bottom);

    let mut canvas = RgbImage::from_fn(new_w, new_h, |x, y| {
        let sx = x.saturating_sub(left).min(width - 1);
        let sy = y.saturating_sub(top).min(height - 1);
        *rgb.get_pixel(sx, sy)
    });
    canvas.copy_from(&rgb, left, top)?;

    let mask = GrayImage::from_fn(new_w, new_h, |x, y| {
        let inside = x >= left && x < left + width && y >= top && y < top + height;
        Luma([if inside { 0 } else { 255 }])
    });

    Ok((
        DynamicImage::ImageRgb8(canvas),
        DynamicImage::ImageLuma8(mask),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, px: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb(px)))
    }

    #[test]
    fn png_round_trip_keeps_dimensions() {
        let img = solid(37, 21, [10, 20, 30]);
        let decoded = decode(&encode_png(&img).unwrap()).unwrap();
        assert_eq!(decoded.dimensions(), (37, 21));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(decode(b"not an image"), Err(Error::Decode(_))));
        assert!(matches!(decode(&[]), Err(Error::Decode(_))));
    }

    #[test]
    fn normalization_floors_and_is_idempotent() {
        assert_eq!(normalize_dimensions(513, 513), (512, 512));
        assert_eq!(normalize_dimensions(1023, 770), (1016, 768));
        for (w, h) in [(512, 768), (8, 8), (1024, 64)] {
            assert_eq!(normalize_dimensions(w, h), (w, h));
        }
        let once = normalize_dimensions(999, 333);
        assert_eq!(normalize_dimensions(once.0, once.1), once);
    }

    #[test]
    fn snapping_never_grows_the_image() {
        let snapped = snap_to_latent_grid(solid(100, 63, [1, 2, 3])).unwrap();
        assert_eq!(snapped.dimensions(), (96, 56));
        assert!(snap_to_latent_grid(solid(7, 64, [0, 0, 0])).is_err());
    }

    #[test]
    fn brightness_identity_and_clamping() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(4, 4, |x, y| {
            Rgb([(x * 60) as u8, (y * 70) as u8, 250])
        }));
        assert_eq!(adjust_brightness(&img, 1.0).to_rgb8(), img.to_rgb8());

        let bright = adjust_brightness(&img, 3.0).to_rgb8();
        assert_eq!(bright.get_pixel(3, 3).0, [255, 255, 255]);
        let dark = adjust_brightness(&solid(1, 1, [101, 50, 9]), 0.5).to_rgb8();
        assert_eq!(dark.get_pixel(0, 0).0, [50, 25, 4]);
    }

    #[test]
    fn classical_inpaint_fills_from_surroundings() {
        let img = solid(9, 9, [200, 100, 50]);
        let mut hole = img.to_rgb8();
        hole.put_pixel(4, 4, Rgb([0, 0, 0]));
        hole.put_pixel(4, 5, Rgb([0, 0, 0]));
        let mask = DynamicImage::ImageLuma8(GrayImage::from_fn(9, 9, |x, y| {
            Luma([if x == 4 && (4..=5).contains(&y) { 255 } else { 0 }])
        }));
        let out = inpaint_classical(&DynamicImage::ImageRgb8(hole), &mask)
            .unwrap()
            .to_rgb8();
        assert_eq!(out.get_pixel(4, 4).0, [200, 100, 50]);
        assert_eq!(out.get_pixel(4, 5).0, [200, 100, 50]);
    }

    #[test]
    fn full_mask_is_rejected() {
        let img = solid(4, 4, [1, 1, 1]);
        let mask = solid(4, 4, [255, 255, 255]);
        assert!(inpaint_classical(&img, &mask).is_err());
    }

    #[test]
    fn extending_marks_only_the_new_area() {
        let img = solid(16, 8, [5, 6, 7]);
        let (canvas, mask) = extend_canvas(&img, OutpaintDirection::Right, 64).unwrap();
        assert_eq!(canvas.dimensions(), (80, 8));
        let mask = mask.to_luma8();
        assert_eq!(mask.get_pixel(15, 0).0, [0]);
        assert_eq!(mask.get_pixel(16, 0).0, [255]);
        assert_eq!(canvas.to_rgb8().get_pixel(79, 7).0, [5, 6, 7]);

        let (canvas, _) = extend_canvas(&img, OutpaintDirection::All, 64).unwrap();
        assert_eq!(canvas.dimensions(), (144, 136));
    }
}
