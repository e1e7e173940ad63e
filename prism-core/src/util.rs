use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::{DType, Device, Tensor};
use image::{DynamicImage, RgbImage};

use crate::{DeviceMap, Error, Result};

/// Resolves `Auto` to the best accelerator this build can see.
pub fn select_best_device(device_map: DeviceMap) -> DeviceMap {
    match device_map {
        DeviceMap::Auto if cuda_is_available() => DeviceMap::Cuda(0),
        DeviceMap::Auto if metal_is_available() => DeviceMap::Metal(0),
        DeviceMap::Auto => {
            #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
            {
                tracing::info!("no accelerator detected, build with `--features metal` to probe for one");
            }
            #[cfg(not(all(target_os = "macos", target_arch = "aarch64")))]
            {
                tracing::info!("no accelerator detected, build with `--features cuda` to probe for one");
            }
            DeviceMap::ForceCpu
        }
        explicit => explicit,
    }
}

/// Converts an RGB image into a `(1, 3, height, width)` f32 tensor on the CPU.
pub fn image_to_tensor(img: &RgbImage) -> Result<Tensor> {
    let (width, height) = img.dimensions();
    let pixels = img.as_raw().clone();
    let tensor = Tensor::from_vec(pixels, (height as usize, width as usize, 3), &Device::Cpu)?
        .permute((2, 0, 1))?
        .to_dtype(DType::F32)?
        .unsqueeze(0)?
        .contiguous()?;
    Ok(tensor)
}

/// Converts a tensor with shape (3, height, width) into an image, clamping to `[0, 255]`.
pub fn tensor_to_image(img: &Tensor) -> Result<DynamicImage> {
    let (channels, height, width) = img.dims3()?;
    if channels != 3 {
        return Err(Error::external(
            "tensor_to_image expects an image with 3 channels",
        ));
    }
    let img = img
        .clamp(0f32, 255f32)?
        .round()?
        .to_dtype(DType::U8)?
        .permute((1, 2, 0))?
        .flatten_all()?;
    let pixels = img.to_vec1::<u8>()?;
    let buffer = image::ImageBuffer::from_raw(width as u32, height as u32, pixels)
        .ok_or_else(|| Error::external("error converting tensor to image buffer"))?;
    Ok(DynamicImage::ImageRgb8(buffer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tensor_conversion_keeps_pixels() {
        let img = RgbImage::from_fn(5, 3, |x, y| image::Rgb([x as u8 * 10, y as u8 * 20, 7]));
        let tensor = image_to_tensor(&img).unwrap();
        assert_eq!(tensor.dims(), &[1, 3, 3, 5]);
        let back = tensor_to_image(&tensor.squeeze(0).unwrap()).unwrap().to_rgb8();
        assert_eq!(back, img);
    }

    #[test]
    fn explicit_devices_are_untouched() {
        assert_eq!(select_best_device(DeviceMap::Cuda(2)), DeviceMap::Cuda(2));
        assert_eq!(select_best_device(DeviceMap::ForceCpu), DeviceMap::ForceCpu);
    }
}
