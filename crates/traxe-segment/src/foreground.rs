use image::GrayImage;
use imageproc::distance_transform::Norm;
use traxe_core::{DepthFrame, Mask};

use crate::{BackgroundModel, SegmentParams};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SegmentError {
    #[error("frame is {frame_w}x{frame_h} but background is {bg_w}x{bg_h}")]
    DimensionMismatch {
        frame_w: usize,
        frame_h: usize,
        bg_w: usize,
        bg_h: usize,
    },
}

/// Segment pixels that are inside the sensor range and significantly nearer
/// than the background, then denoise the mask.
///
/// The raw mask is `min < d < max && (bg - d) > delta`; it is followed by a
/// median filter and a morphological opening with square kernels.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(width = frame.width, height = frame.height))
)]
pub fn segment(
    frame: &DepthFrame,
    background: &BackgroundModel,
    params: &SegmentParams,
) -> Result<Mask, SegmentError> {
    if frame.width != background.width() || frame.height != background.height() {
        return Err(SegmentError::DimensionMismatch {
            frame_w: frame.width,
            frame_h: frame.height,
            bg_w: background.width(),
            bg_h: background.height(),
        });
    }

    let raw = threshold_mask(frame, background, params);
    if raw.is_empty() {
        return Ok(raw);
    }
    Ok(denoise(raw, params))
}

fn threshold_mask(frame: &DepthFrame, background: &BackgroundModel, p: &SegmentParams) -> Mask {
    let mut mask = Mask::empty(frame.width, frame.height);
    let bg = background.view();
    for y in 0..frame.height {
        for x in 0..frame.width {
            if let Some(roi) = &p.roi {
                if !roi.contains(x, y) {
                    continue;
                }
            }
            let d = frame.get(x, y);
            let valid = d > p.min_depth_m && d < p.max_depth_m;
            let closer = (bg.get(x, y) - d) > p.depth_delta_m;
            if valid && closer {
                mask.data[y * frame.width + x] = Mask::ON;
            }
        }
    }
    mask
}

fn denoise(mask: Mask, p: &SegmentParams) -> Mask {
    let (width, height) = (mask.width, mask.height);
    let Some(mut img) = GrayImage::from_raw(width as u32, height as u32, mask.data) else {
        return Mask::empty(width, height);
    };

    let median_radius = p.median_kernel / 2;
    if median_radius > 0 {
        img = imageproc::filter::median_filter(&img, median_radius, median_radius);
    }

    // L-infinity ball of radius k is a (2k+1)x(2k+1) square.
    let open_radius = (p.open_kernel / 2).min(u8::MAX as u32) as u8;
    if open_radius > 0 {
        img = imageproc::morphology::open(&img, Norm::LInf, open_radius);
    }

    Mask {
        width,
        height,
        data: img.into_raw(),
    }
}
