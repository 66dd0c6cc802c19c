//! Assistive capture channel — an in-process service handle that takes
//! the screenshot itself instead of shelling out to a privileged command.
//!
//! The trait seam exists because the real service is host-provided (a
//! compositor portal, an accessibility bridge). The shipped
//! implementation uses `xcap` to grab the primary monitor and writes the
//! PNG into the media root, which is the in-process analog of pressing
//! the OS screenshot key.

use std::io::Cursor;
use std::path::PathBuf;

use image::{DynamicImage, ImageFormat};
use xcap::Monitor;

use crate::media::watcher::epoch_ms;

/// Live handle to the assistive capture service.
pub trait AssistiveService: Send + Sync {
    /// Is the service connected and able to take a screenshot right now?
    fn is_connected(&self) -> bool;

    /// Ask the service to take a screenshot. Returns whether the request
    /// was dispatched; the artifact itself lands in the media index.
    fn request_screenshot(&self) -> bool;
}

/// `xcap`-backed assistive service capturing the primary monitor.
pub struct CompositorCapture {
    output_dir: PathBuf,
}

impl CompositorCapture {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn capture_primary(&self) -> Result<DynamicImage, CaptureError> {
        let monitors =
            Monitor::all().map_err(|e| CaptureError::MonitorEnumeration(e.to_string()))?;

        let primary = monitors
            .into_iter()
            .find(|m| m.is_primary().unwrap_or(false))
            .or_else(|| {
                // No monitor reports as primary on some hosts; take the first.
                let all = Monitor::all().ok()?;
                all.into_iter().next()
            })
            .ok_or(CaptureError::NoPrimaryMonitor)?;

        let image = primary
            .capture_image()
            .map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;

        Ok(DynamicImage::ImageRgba8(image))
    }

    fn write_screenshot(&self, image: &DynamicImage) -> Result<PathBuf, CaptureError> {
        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| CaptureError::WriteFailed(e.to_string()))?;

        let mut png_bytes: Vec<u8> = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)
            .map_err(|e| CaptureError::WriteFailed(e.to_string()))?;

        let path = self
            .output_dir
            .join(format!("screenshot_{}.png", epoch_ms()));
        std::fs::write(&path, &png_bytes).map_err(|e| CaptureError::WriteFailed(e.to_string()))?;
        Ok(path)
    }
}

impl AssistiveService for CompositorCapture {
    fn is_connected(&self) -> bool {
        Monitor::all().map(|m| !m.is_empty()).unwrap_or(false)
    }

    fn request_screenshot(&self) -> bool {
        let started = std::time::Instant::now();
        match self.capture_primary().and_then(|img| self.write_screenshot(&img)) {
            Ok(path) => {
                log::info!(
                    "[ASSIST] Captured to {} in {}ms",
                    path.display(),
                    started.elapsed().as_millis()
                );
                true
            }
            Err(e) => {
                log::error!("[ASSIST] Capture failed: {}", e);
                false
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to enumerate monitors: {0}")]
    MonitorEnumeration(String),

    #[error("no primary monitor found")]
    NoPrimaryMonitor,

    #[error("screen capture failed: {0}")]
    CaptureFailed(String),

    #[error("failed to write screenshot: {0}")]
    WriteFailed(String),
}
