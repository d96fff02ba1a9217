use crate::api::error::{Pix2PixError, Pix2PixResult};
use image::imageops::FilterType;
use image::{GrayImage, ImageFormat};
use rustml_grad::Tensor;
use std::path::Path;

/// Load an image as grayscale, resized to `size x size`, scaled to [0, 1].
pub fn load_grayscale<P: AsRef<Path>>(path: P, size: usize) -> Pix2PixResult<Vec<f32>> {
    let side = u32::try_from(size)
        .map_err(|_| Pix2PixError::InvalidConfig(format!("image size {size} is too large")))?;
    let img = image::open(path.as_ref())?.to_luma8();
    let img = if img.dimensions() == (side, side) {
        img
    } else {
        image::imageops::resize(&img, side, side, FilterType::Triangle)
    };
    Ok(img.into_raw().into_iter().map(|p| p as f32 / 255.0).collect())
}

/// Write a `[H, W]` plane of values in [0, 1] as an 8-bit PNG.
pub fn save_grayscale<P: AsRef<Path>>(
    path: P,
    values: &[f32],
    height: usize,
    width: usize,
) -> Pix2PixResult<()> {
    if values.len() != height * width {
        return Err(Pix2PixError::ShapeMismatch {
            expected: vec![height, width],
            got: vec![values.len()],
        });
    }
    let pixels = values
        .iter()
        .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect();
    let img = GrayImage::from_raw(width as u32, height as u32, pixels).ok_or_else(|| {
        Pix2PixError::InvalidConfig(format!("cannot build a {width}x{height} image"))
    })?;
    img.save_with_format(path.as_ref(), ImageFormat::Png)?;
    Ok(())
}

/// Write a `[B, 1, H, W]` batch as one PNG with the samples side by side.
pub fn save_batch<P: AsRef<Path>>(path: P, batch: &Tensor) -> Pix2PixResult<()> {
    let shape = batch.shape();
    if shape.len() != 4 || shape[1] != 1 {
        return Err(Pix2PixError::ShapeMismatch {
            expected: vec![shape.first().copied().unwrap_or(0), 1, 0, 0],
            got: shape.to_vec(),
        });
    }
    let (n, h, w) = (shape[0], shape[2], shape[3]);
    let data = batch.to_vec();
    let mut strip = vec![0.0f32; h * w * n];
    for b in 0..n {
        for y in 0..h {
            let src = &data[(b * h + y) * w..(b * h + y + 1) * w];
            strip[y * w * n + b * w..y * w * n + (b + 1) * w].copy_from_slice(src);
        }
    }
    save_grayscale(path, &strip, h, w * n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_planes_load_back_scaled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plane.png");
        let values: Vec<f32> = (0..16).map(|i| i as f32 / 15.0).collect();
        save_grayscale(&path, &values, 4, 4).unwrap();
        let loaded = load_grayscale(&path, 4).unwrap();
        for (a, b) in values.iter().zip(&loaded) {
            assert!((a - b).abs() < 1.0 / 255.0 + 1e-6);
        }
        assert_eq!(load_grayscale(&path, 8).unwrap().len(), 64);
    }

    #[test]
    fn batch_strip_places_samples_side_by_side() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strip.png");
        let mut data = vec![0.0f32; 4];
        data.extend(vec![1.0f32; 4]);
        let batch = Tensor::from_vec(data, [2, 1, 2, 2]).unwrap();
        save_batch(&path, &batch).unwrap();
        let img = image::open(&path).unwrap().to_luma8();
        assert_eq!(img.dimensions(), (4, 2));
        assert_eq!(img.get_pixel(0, 0).0[0], 0);
        assert_eq!(img.get_pixel(3, 1).0[0], 255);
    }

    #[test]
    fn mismatched_plane_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(save_grayscale(dir.path().join("x.png"), &[0.0; 3], 2, 2).is_err());
    }
}
