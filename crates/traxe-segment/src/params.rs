use serde::{Deserialize, Serialize};

/// Rectangular region of interest in sensor pixels.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Roi {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Roi {
    #[inline]
    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}

/// Foreground segmentation settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentParams {
    /// Nearest trusted depth; anything at or below is sensor noise floor.
    pub min_depth_m: f32,
    /// Farthest trusted depth; anything at or beyond is a far-range artifact.
    pub max_depth_m: f32,
    /// How much nearer than the background a pixel must be to count as
    /// foreground. Lower values detect thinner objects but admit more noise.
    pub depth_delta_m: f32,
    /// Side of the square median filter window (odd).
    pub median_kernel: u32,
    /// Side of the square structuring element of the opening (odd).
    pub open_kernel: u32,
    /// Optional ROI; pixels outside it are never foreground.
    pub roi: Option<Roi>,
}

impl Default for SegmentParams {
    fn default() -> Self {
        Self {
            min_depth_m: 0.4,
            max_depth_m: 4.0,
            depth_delta_m: 0.08,
            median_kernel: 5,
            open_kernel: 5,
            roi: None,
        }
    }
}
