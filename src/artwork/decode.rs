//! Decode, resize, and letterbox artwork for one `(w, h)` tile request
//! (§4.5 "Resize and letterboxing").
//!
//! `image`'s built-in `FilterType` doesn't expose a tunable
//! Mitchell-Netravali kernel (B, C), so this module implements the
//! two-parameter cubic filter directly and drives a small separable
//! resampler with it, in the same spirit as `image::imageops`'s own
//! cubic-convolution resize.

use image::{GenericImageView, ImageBuffer, Rgba, RgbaImage};

use crate::error::{Error, Result};

/// Pixel format of a decoded tile, ready to be handed to the terminal
/// inline-image writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Raw, tightly packed RGB8, `width * height * 3` bytes.
    Rgb,
    /// A complete PNG byte stream (used when letterboxing, so
    /// transparency survives).
    Png,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// How far the source aspect ratio may deviate from the target before
/// we letterbox instead of stretching, per §4.5.
const ASPECT_DEVIATION_THRESHOLD: f64 = 0.05;

/// Mitchell-Netravali cubic filter with B = C = 1/3.
fn mitchell_netravali(x: f64) -> f64 {
    const B: f64 = 1.0 / 3.0;
    const C: f64 = 1.0 / 3.0;
    let x = x.abs();
    if x < 1.0 {
        ((12.0 - 9.0 * B - 6.0 * C) * x.powi(3)
            + (-18.0 + 12.0 * B + 6.0 * C) * x.powi(2)
            + (6.0 - 2.0 * B))
            / 6.0
    } else if x < 2.0 {
        ((-B - 6.0 * C) * x.powi(3)
            + (6.0 * B + 30.0 * C) * x.powi(2)
            + (-12.0 * B - 48.0 * C) * x
            + (8.0 * B + 24.0 * C))
            / 6.0
    } else {
        0.0
    }
}

/// Separable Mitchell-Netravali resize of an RGBA buffer to exactly
/// `(new_w, new_h)`.
fn resize_rgba(src: &RgbaImage, new_w: u32, new_h: u32) -> RgbaImage {
    if new_w == 0 || new_h == 0 {
        return ImageBuffer::new(new_w.max(1), new_h.max(1));
    }
    let (src_w, src_h) = src.dimensions();
    if src_w == new_w && src_h == new_h {
        return src.clone();
    }

    // Horizontal pass.
    let mut horiz: ImageBuffer<Rgba<f32>, Vec<f32>> = ImageBuffer::new(new_w, src_h);
    let x_scale = src_w as f64 / new_w as f64;
    for out_x in 0..new_w {
        let center = (out_x as f64 + 0.5) * x_scale - 0.5;
        let lo = (center - 2.0).floor() as i64;
        let hi = (center + 2.0).ceil() as i64;
        let mut weights = Vec::new();
        let mut weight_sum = 0.0;
        for sx in lo..=hi {
            let w = mitchell_netravali(sx as f64 - center);
            if w != 0.0 {
                weights.push((sx.clamp(0, src_w as i64 - 1) as u32, w));
                weight_sum += w;
            }
        }
        for out_y in 0..src_h {
            let mut acc = [0f32; 4];
            for &(sx, w) in &weights {
                let p = src.get_pixel(sx, out_y);
                for c in 0..4 {
                    acc[c] += p[c] as f64 as f32 * (w / weight_sum) as f32;
                }
            }
            horiz.put_pixel(out_x, out_y, Rgba(acc));
        }
    }

    // Vertical pass.
    let mut out: RgbaImage = ImageBuffer::new(new_w, new_h);
    let y_scale = src_h as f64 / new_h as f64;
    for out_y in 0..new_h {
        let center = (out_y as f64 + 0.5) * y_scale - 0.5;
        let lo = (center - 2.0).floor() as i64;
        let hi = (center + 2.0).ceil() as i64;
        let mut weights = Vec::new();
        let mut weight_sum = 0.0;
        for sy in lo..=hi {
            let w = mitchell_netravali(sy as f64 - center);
            if w != 0.0 {
                weights.push((sy.clamp(0, src_h as i64 - 1) as u32, w));
                weight_sum += w;
            }
        }
        for out_x in 0..new_w {
            let mut acc = [0f32; 4];
            for &(sy, w) in &weights {
                let p = horiz.get_pixel(out_x, sy);
                for c in 0..4 {
                    acc[c] += p[c] * (w / weight_sum) as f32;
                }
            }
            let clamp = |v: f32| v.round().clamp(0.0, 255.0) as u8;
            out.put_pixel(
                out_x,
                out_y,
                Rgba([clamp(acc[0]), clamp(acc[1]), clamp(acc[2]), clamp(acc[3])]),
            );
        }
    }

    out
}

/// Decode `bytes` and produce a tile fit to `(target_w, target_h)`
/// pixels, letterboxing when the aspect ratio deviates by more than
/// `ASPECT_DEVIATION_THRESHOLD`.
pub fn decode_and_fit(bytes: &[u8], target_w: u32, target_h: u32) -> Result<DecodedImage> {
    let img = image::load_from_memory(bytes)
        .map_err(|_| Error::artwork_decode_failed("tile source bytes"))?;
    let (src_w, src_h) = img.dimensions();
    if src_w == 0 || src_h == 0 {
        return Err(Error::artwork_decode_failed("zero-sized source image"));
    }
    let rgba = img.to_rgba8();

    let src_aspect = src_w as f64 / src_h as f64;
    let target_aspect = target_w as f64 / target_h as f64;
    let deviation = (src_aspect - target_aspect).abs() / target_aspect;

    if deviation > ASPECT_DEVIATION_THRESHOLD {
        let scale = (target_w as f64 / src_w as f64).min(target_h as f64 / src_h as f64);
        let fit_w = ((src_w as f64 * scale).round() as u32).max(1);
        let fit_h = ((src_h as f64 * scale).round() as u32).max(1);
        let resized = resize_rgba(&rgba, fit_w, fit_h);

        let mut canvas: RgbaImage = ImageBuffer::from_pixel(target_w, target_h, Rgba([0, 0, 0, 0]));
        let x_off = (target_w.saturating_sub(fit_w)) / 2;
        let y_off = (target_h.saturating_sub(fit_h)) / 2;
        image::imageops::overlay(&mut canvas, &resized, x_off as i64, y_off as i64);

        let mut png_bytes = Vec::new();
        {
            use image::ImageEncoder;
            let encoder = image::codecs::png::PngEncoder::new(&mut png_bytes);
            encoder
                .write_image(
                    canvas.as_raw(),
                    target_w,
                    target_h,
                    image::ExtendedColorType::Rgba8,
                )
                .map_err(|_| Error::artwork_decode_failed("png encode of letterboxed tile"))?;
        }

        Ok(DecodedImage {
            pixels: png_bytes,
            width: target_w,
            height: target_h,
            format: PixelFormat::Png,
        })
    } else {
        let resized = resize_rgba(&rgba, target_w, target_h);
        let rgb: Vec<u8> = resized
            .pixels()
            .flat_map(|p| [p[0], p[1], p[2]])
            .collect();
        Ok(DecodedImage {
            pixels: rgb,
            width: target_w,
            height: target_h,
            format: PixelFormat::Rgb,
        })
    }
}
