use crate::error::PipelineError;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use tracing::info;

/// Source of camera frames; `Ok(None)` marks the end of the stream
pub trait FrameSource: Send {
    fn capture(&mut self) -> Result<Option<DynamicImage>, PipelineError>;
}

/// Replays still images from a directory in file-name order
pub struct ImageDirSource {
    files: Vec<PathBuf>,
    next: usize,
}

impl ImageDirSource {
    pub fn open(dir: &Path) -> Result<Self, PipelineError> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| PipelineError::load(dir.display().to_string(), e))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| PipelineError::load(dir.display().to_string(), e))?
                .path();
            if path.is_file() && is_image(&path) {
                files.push(path);
            }
        }
        files.sort();

        info!(dir = %dir.display(), frames = files.len(), "frame directory opened");
        Ok(Self { files, next: 0 })
    }

    pub fn remaining(&self) -> usize {
        self.files.len() - self.next
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            matches!(
                ext.to_ascii_lowercase().as_str(),
                "jpg" | "jpeg" | "png" | "bmp"
            )
        })
        .unwrap_or(false)
}

impl FrameSource for ImageDirSource {
    fn capture(&mut self) -> Result<Option<DynamicImage>, PipelineError> {
        let Some(path) = self.files.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;

        image::open(path)
            .map(Some)
            .map_err(|e| PipelineError::load(path.display().to_string(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_replay_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        DynamicImage::new_rgb8(4, 2)
            .save(dir.path().join("frame_002.png"))
            .unwrap();
        DynamicImage::new_rgb8(8, 2)
            .save(dir.path().join("frame_001.png"))
            .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();

        let mut source = ImageDirSource::open(dir.path()).unwrap();
        assert_eq!(source.remaining(), 2);

        assert_eq!(source.capture().unwrap().unwrap().width(), 8);
        assert_eq!(source.capture().unwrap().unwrap().width(), 4);
        assert!(source.capture().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_frame_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("frame_001.jpg"), b"garbage").unwrap();

        let mut source = ImageDirSource::open(dir.path()).unwrap();
        assert!(matches!(source.capture(), Err(PipelineError::Load { .. })));
        assert!(source.capture().unwrap().is_none());
    }

    #[test]
    fn test_missing_directory() {
        assert!(ImageDirSource::open(Path::new("/nonexistent/frames")).is_err());
    }
}
