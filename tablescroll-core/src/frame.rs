use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use tablescroll_common::{Result, ScrollError};
use tablescroll_drivers::Surface;
use tablescroll_vision::ImageData;
use tracing::{debug, warn};
use uuid::Uuid;

/// One screenshot of the current rendering, used for a single decision cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationFrame {
    pub id: Uuid,
    pub image: ImageData,
    pub captured_at: DateTime<Local>,
}

impl ObservationFrame {
    /// Take a fresh full-page screenshot.
    pub async fn capture(surface: &dyn Surface) -> Result<Self> {
        let encoded = surface.take_screenshot(true).await?;
        let frame = Self::from_base64(&encoded)?;
        debug!(frame = %frame.id, media = frame.image.media_type.as_mime(), "frame.captured");
        Ok(frame)
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        let image = ImageData::from_base64(encoded);
        if image.base64.is_empty() {
            return Err(ScrollError::device("screenshot came back empty"));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            image,
            captured_at: Local::now(),
        })
    }

    pub fn file_name(&self) -> String {
        format!(
            "screenshot_{}.{}",
            self.captured_at.format("%Y-%m-%d_%H-%M-%S_%3f"),
            self.image.media_type.extension()
        )
    }

    /// Write the frame under `dir`. Failures are logged, never raised.
    pub fn archive(&self, dir: &Path) -> Option<PathBuf> {
        let bytes = match STANDARD.decode(self.image.base64.as_bytes()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(frame = %self.id, error = %e, "frame.archive_decode_failed");
                return None;
            }
        };
        let path = dir.join(self.file_name());
        let written = fs::create_dir_all(dir).and_then(|()| fs::write(&path, bytes));
        match written {
            Ok(()) => {
                debug!(frame = %self.id, path = %path.display(), "frame.archived");
                Some(path)
            }
            Err(e) => {
                warn!(frame = %self.id, path = %path.display(), error = %e, "frame.archive_failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablescroll_drivers::MemorySurface;
    use tablescroll_vision::MediaType;

    const PNG_B64: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mP8z8BQDwAEhQGAhKmMIQAAAABJRU5ErkJggg==";

    #[tokio::test]
    async fn capture_reads_a_full_page_screenshot() {
        let surface = MemorySurface::with_frames([format!("data:image/png;base64,{PNG_B64}")]);
        let frame = ObservationFrame::capture(&surface).await.unwrap();
        assert_eq!(frame.image.media_type, MediaType::Png);
        assert_eq!(frame.image.base64, PNG_B64);
    }

    #[test]
    fn empty_screenshot_is_a_device_error() {
        let err = ObservationFrame::from_base64("  ").unwrap_err();
        assert!(matches!(err, ScrollError::Device(_)));
    }

    #[test]
    fn archive_writes_timestamped_file() {
        let tmp = tempfile::tempdir().unwrap();
        let frame = ObservationFrame::from_base64(PNG_B64).unwrap();
        let path = frame.archive(&tmp.path().join("shots")).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("screenshot_") && name.ends_with(".png"), "{name}");
        assert_eq!(fs::read(&path).unwrap(), STANDARD.decode(PNG_B64).unwrap());
    }

    #[test]
    fn undecodable_frame_is_not_archived() {
        let tmp = tempfile::tempdir().unwrap();
        let frame = ObservationFrame::from_base64("not base64 at all!").unwrap();
        assert!(frame.archive(tmp.path()).is_none());
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }
}
