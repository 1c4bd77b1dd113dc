use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Integer pixel coordinates in sensor space.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: i32,
    pub y: i32,
}

impl PixelPoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other` in pixels.
    #[inline]
    pub fn distance(self, other: PixelPoint) -> f32 {
        let dx = (self.x - other.x) as f32;
        let dy = (self.y - other.y) as f32;
        (dx * dx + dy * dy).sqrt()
    }
}

/// One metric depth frame: row-major distances in meters.
///
/// `timestamp` is the capture time measured from the UNIX epoch. Zero depth
/// means "no measurement" (the sensor's invalid value).
#[derive(Clone, Debug, PartialEq)]
pub struct DepthFrame {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
    pub timestamp: Duration,
}

impl DepthFrame {
    /// Frame with every pixel at `depth_m`.
    pub fn filled(width: usize, height: usize, depth_m: f32, timestamp: Duration) -> Self {
        Self {
            width,
            height,
            data: vec![depth_m; width * height],
            timestamp,
        }
    }

    /// Build a frame from raw sensor units (e.g. z16 millimeters) and a depth scale.
    pub fn from_raw_u16(
        width: usize,
        height: usize,
        raw: &[u16],
        depth_scale: f32,
        timestamp: Duration,
    ) -> Option<Self> {
        if raw.len() != width.checked_mul(height)? {
            return None;
        }
        Some(Self {
            width,
            height,
            data: raw.iter().map(|&v| v as f32 * depth_scale).collect(),
            timestamp,
        })
    }

    pub fn view(&self) -> DepthView<'_> {
        DepthView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, depth_m: f32) {
        self.data[y * self.width + x] = depth_m;
    }

    #[inline]
    pub fn same_shape(&self, other: &DepthView<'_>) -> bool {
        self.width == other.width && self.height == other.height
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DepthView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [f32], // row-major, len = w*h
}

impl DepthView<'_> {
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }
}

/// Binary occupancy mask. Foreground pixels hold 255, background 0.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl Mask {
    pub const ON: u8 = 255;

    pub fn empty(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    #[inline]
    pub fn is_set(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x] != 0
    }

    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.data.iter().all(|&v| v == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_u16_is_scaled_to_meters() {
        let raw = [1000u16, 2000, 0, 1500];
        let frame = DepthFrame::from_raw_u16(2, 2, &raw, 0.001, Duration::ZERO).expect("frame");
        assert_eq!(frame.get(0, 0), 1.0);
        assert_eq!(frame.get(1, 0), 2.0);
        assert_eq!(frame.get(0, 1), 0.0);
        assert_eq!(frame.get(1, 1), 1.5);
    }

    #[test]
    fn raw_u16_rejects_wrong_length() {
        assert!(DepthFrame::from_raw_u16(3, 2, &[0u16; 5], 0.001, Duration::ZERO).is_none());
    }

    #[test]
    fn pixel_distance_is_euclidean() {
        let a = PixelPoint::new(0, 0);
        let b = PixelPoint::new(3, 4);
        assert_eq!(a.distance(b), 5.0);
    }

    #[test]
    fn mask_counts_foreground() {
        let mut mask = Mask::empty(4, 4);
        assert!(mask.is_empty());
        mask.data[5] = Mask::ON;
        assert_eq!(mask.count(), 1);
        assert!(mask.is_set(1, 1));
    }
}
