//! Alpha matting refinement of segmentation masks
//!
//! The mask is split into a trimap: pixels at or above the foreground
//! threshold are sure foreground, pixels at or below the background threshold
//! are sure background, and both regions are eroded so that the band around
//! every edge becomes unknown. Sure pixels are snapped to fully opaque or fully
//! transparent; unknown pixels take a Gaussian-smoothed mask value, giving soft
//! edges instead of the hard staircase of the raw mask.

use crate::error::Result;
use crate::types::{RemovalOptions, SegmentationMask};
use image::{imageops, GrayImage, Luma};

/// Trimap label for a single pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimapLabel {
    Foreground,
    Background,
    Unknown,
}

/// Refine a mask with alpha matting
///
/// # Errors
/// - Mask data does not match its dimensions
pub fn refine_mask(mask: &SegmentationMask, options: &RemovalOptions) -> Result<SegmentationMask> {
    let image = mask.to_image()?;
    let trimap = build_trimap(&image, options);
    if !trimap.contains(&TrimapLabel::Unknown) {
        let data = trimap
            .iter()
            .map(|label| if *label == TrimapLabel::Foreground { 255 } else { 0 })
            .collect();
        return Ok(SegmentationMask::new(data, mask.dimensions));
    }

    let sigma = (options.erode_size as f32 / 2.0).max(1.0);
    let smoothed = imageops::blur(&image, sigma);

    let (width, height) = image.dimensions();
    let refined = GrayImage::from_fn(width, height, |x, y| {
        let index = (y * width + x) as usize;
        match trimap.get(index).copied().unwrap_or(TrimapLabel::Unknown) {
            TrimapLabel::Foreground => Luma([255]),
            TrimapLabel::Background => Luma([0]),
            TrimapLabel::Unknown => *smoothed.get_pixel(x, y),
        }
    });

    Ok(SegmentationMask::from_image(refined))
}

/// Classify every pixel of the mask
#[must_use]
pub fn build_trimap(mask: &GrayImage, options: &RemovalOptions) -> Vec<TrimapLabel> {
    let (width, height) = mask.dimensions();
    let is_foreground: Vec<bool> = mask
        .pixels()
        .map(|p| p.0[0] >= options.foreground_threshold)
        .collect();
    let is_background: Vec<bool> = mask
        .pixels()
        .map(|p| p.0[0] <= options.background_threshold)
        .collect();

    let radius = options.erode_size / 2;
    let sure_foreground = erode(&is_foreground, width, height, radius);
    let sure_background = erode(&is_background, width, height, radius);

    sure_foreground
        .iter()
        .zip(&sure_background)
        .map(|(&fg, &bg)| match (fg, bg) {
            (true, _) => TrimapLabel::Foreground,
            (false, true) => TrimapLabel::Background,
            (false, false) => TrimapLabel::Unknown,
        })
        .collect()
}

/// Binary erosion with a square window of side `2 * radius + 1`
///
/// The window is clipped at the image border.
fn erode(map: &[bool], width: u32, height: u32, radius: u32) -> Vec<bool> {
    if radius == 0 {
        return map.to_vec();
    }

    let w = width as usize;
    let h = height as usize;
    let r = radius as usize;

    // Summed-area table with a zero row and column in front
    let stride = w + 1;
    let mut integral = vec![0u32; stride * (h + 1)];
    for y in 0..h {
        let mut row_sum = 0u32;
        for x in 0..w {
            row_sum += u32::from(map.get(y * w + x).copied().unwrap_or(false));
            let above = integral.get(y * stride + x + 1).copied().unwrap_or(0);
            if let Some(cell) = integral.get_mut((y + 1) * stride + x + 1) {
                *cell = above + row_sum;
            }
        }
    }

    let at = |x: usize, y: usize| integral.get(y * stride + x).copied().unwrap_or(0);

    let mut out = Vec::with_capacity(w * h);
    for y in 0..h {
        let y0 = y.saturating_sub(r);
        let y1 = (y + r + 1).min(h);
        for x in 0..w {
            let x0 = x.saturating_sub(r);
            let x1 = (x + r + 1).min(w);
            let count = at(x1, y1) + at(x0, y0) - at(x0, y1) - at(x1, y0);
            let area = ((x1 - x0) * (y1 - y0)) as u32;
            out.push(count == area);
        }
    }
    out
}
