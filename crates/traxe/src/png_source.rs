//! Replay of recorded depth frames stored as 16-bit grayscale PNGs.

use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use log::{debug, info};
use traxe_core::{AcquisitionError, DepthFrame, FrameSource};

/// Plays a directory of `*.png` depth images in file-name order.
///
/// Pixel values are raw sensor units multiplied by `depth_scale`. Frame
/// timestamps start at `start` and advance by `frame_period` per frame, so a
/// replay is deterministic regardless of how fast it is processed.
#[derive(Debug)]
pub struct PngSequenceSource {
    paths: Vec<PathBuf>,
    next: usize,
    depth_scale: f32,
    start: Duration,
    frame_period: Duration,
    resolution: Option<(usize, usize)>,
    stopped: bool,
}

impl PngSequenceSource {
    pub fn open(
        dir: impl AsRef<Path>,
        depth_scale: f32,
        frame_period: Duration,
    ) -> Result<Self, AcquisitionError> {
        let dir = dir.as_ref();
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("png"))
            })
            .collect();
        paths.sort();
        if paths.is_empty() {
            return Err(AcquisitionError::NoFrames);
        }
        info!("replaying {} depth frames from {}", paths.len(), dir.display());

        let start = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Ok(Self {
            paths,
            next: 0,
            depth_scale,
            start,
            frame_period,
            resolution: None,
            stopped: false,
        })
    }

    /// Override the timestamp of the first frame.
    pub fn with_start(mut self, start: Duration) -> Self {
        self.start = start;
        self
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for PngSequenceSource {
    fn next_frame(&mut self) -> Result<DepthFrame, AcquisitionError> {
        if self.stopped {
            return Err(AcquisitionError::Disconnected);
        }
        let index = self.next;
        let path = self.paths.get(index).ok_or(AcquisitionError::EndOfStream)?;
        self.next += 1;

        let img = image::ImageReader::open(path)?
            .decode()
            .map_err(|e| AcquisitionError::Decode(format!("{}: {e}", path.display())))?
            .to_luma16();
        let (w, h) = (img.width() as usize, img.height() as usize);

        match self.resolution {
            Some((ew, eh)) if (ew, eh) != (w, h) => {
                return Err(AcquisitionError::Resolution {
                    index,
                    expected_width: ew,
                    expected_height: eh,
                    width: w,
                    height: h,
                });
            }
            Some(_) => {}
            None => self.resolution = Some((w, h)),
        }

        let timestamp = self.start + self.frame_period * index as u32;
        debug!("frame {index} from {}", path.display());
        DepthFrame::from_raw_u16(w, h, img.as_raw(), self.depth_scale, timestamp)
            .ok_or_else(|| AcquisitionError::Decode(format!("{}: bad buffer size", path.display())))
    }

    fn stop(&mut self) {
        self.stopped = true;
    }

    fn resolution(&self) -> Option<(usize, usize)> {
        self.resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};

    fn write_frame(dir: &Path, name: &str, w: u32, h: u32, value: u16) {
        let img: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_pixel(w, h, Luma([value]));
        img.save(dir.join(name)).expect("save png");
    }

    #[test]
    fn frames_are_scaled_and_timed() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_frame(dir.path(), "0001.png", 8, 6, 2000);
        write_frame(dir.path(), "0000.png", 8, 6, 1500);
        fs::write(dir.path().join("notes.txt"), "ignored").expect("write");

        let mut src = PngSequenceSource::open(dir.path(), 0.001, Duration::from_millis(33))
            .expect("open")
            .with_start(Duration::from_secs(10));
        assert_eq!(src.len(), 2);

        let a = src.next_frame().expect("frame 0");
        assert_eq!((a.width, a.height), (8, 6));
        assert!((a.get(3, 3) - 1.5).abs() < 1e-6);
        assert_eq!(a.timestamp, Duration::from_secs(10));

        let b = src.next_frame().expect("frame 1");
        assert!((b.get(0, 0) - 2.0).abs() < 1e-6);
        assert_eq!(b.timestamp, Duration::from_millis(10_033));

        assert!(matches!(src.next_frame(), Err(AcquisitionError::EndOfStream)));
    }

    #[test]
    fn resolution_change_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_frame(dir.path(), "a.png", 8, 6, 1000);
        write_frame(dir.path(), "b.png", 4, 4, 1000);
        let mut src =
            PngSequenceSource::open(dir.path(), 0.001, Duration::from_millis(33)).expect("open");
        src.next_frame().expect("first");
        assert!(matches!(
            src.next_frame(),
            Err(AcquisitionError::Resolution { index: 1, .. })
        ));
    }

    #[test]
    fn empty_directory_has_no_frames() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            PngSequenceSource::open(dir.path(), 0.001, Duration::from_millis(33)),
            Err(AcquisitionError::NoFrames)
        ));
    }

    #[test]
    fn stopped_source_reports_disconnect() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_frame(dir.path(), "a.png", 2, 2, 1000);
        let mut src =
            PngSequenceSource::open(dir.path(), 0.001, Duration::from_millis(33)).expect("open");
        src.stop();
        assert!(matches!(src.next_frame(), Err(AcquisitionError::Disconnected)));
    }
}
