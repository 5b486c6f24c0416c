//! QR code decoding for receipt photos.

use image::imageops::FilterType;
use image::GrayImage;

use super::ReceiptError;

/// Wider photos are downscaled before detection.
pub const MAX_IMAGE_WIDTH: u32 = 1500;

/// Neighbourhood size of the adaptive threshold fallback, in pixels.
pub const THRESHOLD_BLOCK_SIZE: u32 = 21;

/// Subtracted from the weighted neighbourhood mean.
pub const THRESHOLD_C: f32 = 11.0;

/// Decodes receipt QR codes. Built once at start-up and shared.
#[derive(Debug, Clone)]
pub struct QrDecoder {
    max_width: u32,
    block_size: u32,
    c: f32,
}

impl Default for QrDecoder {
    fn default() -> Self {
        Self {
            max_width: MAX_IMAGE_WIDTH,
            block_size: THRESHOLD_BLOCK_SIZE,
            c: THRESHOLD_C,
        }
    }
}

impl QrDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the first QR code found in a JPEG or PNG image.
    ///
    /// The grey image is scanned as is first; when nothing decodes, a
    /// binarized copy is scanned again.
    pub fn decode(&self, bytes: &[u8]) -> Result<String, ReceiptError> {
        let img = image::load_from_memory(bytes).map_err(|e| ReceiptError::Image(e.to_string()))?;

        let img = if img.width() > self.max_width {
            let height = (img.height() as f64 * self.max_width as f64 / img.width() as f64)
                .round()
                .max(1.0) as u32;
            img.resize_exact(self.max_width, height, FilterType::Triangle)
        } else {
            img
        };

        let gray = img.to_luma8();
        if let Some(content) = scan(&gray) {
            return Ok(content);
        }

        tracing::debug!("No QR code in raw image, retrying with adaptive threshold");
        let binary = adaptive_threshold(&gray, self.block_size, self.c);
        scan(&binary).ok_or(ReceiptError::NoQrCode)
    }
}

fn scan(img: &GrayImage) -> Option<String> {
    let mut prepared =
        rqrr::PreparedImage::prepare_from_greyscale(img.width() as usize, img.height() as usize, |x, y| {
            img.get_pixel(x as u32, y as u32).0[0]
        });

    prepared
        .detect_grids()
        .into_iter()
        .find_map(|grid| grid.decode().ok().map(|(_, content)| content))
        .filter(|content| !content.trim().is_empty())
}

/// Normalized 1-D Gaussian weights for a window of `size` pixels, with
/// sigma derived from the size the way common imaging libraries do.
fn gaussian_kernel(size: u32) -> Vec<f32> {
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let half = (size / 2) as i32;
    let weights: Vec<f32> = (-half..=half)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}

/// Gaussian adaptive threshold: a pixel turns white when it is brighter
/// than its weighted neighbourhood mean minus `c`, black otherwise.
/// Borders replicate the edge pixels.
pub fn adaptive_threshold(img: &GrayImage, block_size: u32, c: f32) -> GrayImage {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return img.clone();
    }

    let kernel = gaussian_kernel(block_size | 1);
    let half = (kernel.len() / 2) as i64;
    let clamp = |v: i64, max: u32| v.clamp(0, max as i64 - 1) as u32;

    let mut horizontal = vec![0f32; (width * height) as usize];
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0;
            for (k, w) in kernel.iter().enumerate() {
                let sx = clamp(x as i64 + k as i64 - half, width);
                acc += w * img.get_pixel(sx, y).0[0] as f32;
            }
            horizontal[(y * width + x) as usize] = acc;
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        let mut mean = 0.0;
        for (k, w) in kernel.iter().enumerate() {
            let sy = clamp(y as i64 + k as i64 - half, height);
            mean += w * horizontal[(sy * width + x) as usize];
        }
        let value = img.get_pixel(x, y).0[0] as f32;
        if value > mean - c {
            image::Luma([255])
        } else {
            image::Luma([0])
        }
    })
}
