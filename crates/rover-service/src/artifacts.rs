use crate::error::PipelineError;
use crate::pipeline::CascadeOutput;
use common::{Detection, PixelRegion};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};

const VEHICLE_COLOUR: Rgb<u8> = Rgb([0, 255, 0]);
const PLATE_COLOUR: Rgb<u8> = Rgb([255, 0, 0]);

/// Writes annotated frames and plate crops for offline review
pub struct ArtifactWriter {
    dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| PipelineError::artifact(dir.display().to_string(), e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save the frame with vehicle and plate boxes drawn on it
    pub fn save_annotated(
        &self,
        sequence: u64,
        frame: &DynamicImage,
        output: &CascadeOutput,
    ) -> Result<PathBuf, PipelineError> {
        let mut canvas = frame.to_rgb8();
        for vehicle in &output.vehicles {
            draw_box(&mut canvas, &vehicle.vehicle, VEHICLE_COLOUR);
            for plate in &vehicle.plates {
                draw_box(&mut canvas, plate, PLATE_COLOUR);
            }
        }

        let path = self.dir.join(format!("frame_{:05}.jpg", sequence));
        canvas
            .save(&path)
            .map_err(|e| PipelineError::artifact(path.display().to_string(), e))?;
        Ok(path)
    }

    /// Save one plate crop
    pub fn save_plate(
        &self,
        sequence: u64,
        index: usize,
        crop: &DynamicImage,
    ) -> Result<PathBuf, PipelineError> {
        let path = self
            .dir
            .join(format!("frame_{:05}_plate_{}.png", sequence, index));
        crop.save(&path)
            .map_err(|e| PipelineError::artifact(path.display().to_string(), e))?;
        Ok(path)
    }
}

fn draw_box(canvas: &mut RgbImage, detection: &Detection, colour: Rgb<u8>) {
    let Some(PixelRegion {
        x,
        y,
        width,
        height,
    }) = detection.bbox.clamp_to(canvas.width(), canvas.height())
    else {
        return;
    };
    let rect = Rect::at(x as i32, y as i32).of_size(width, height);
    draw_hollow_rect_mut(canvas, rect, colour);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::VehiclePlates;
    use common::DetectionBox;

    #[test]
    fn test_annotated_frame_and_crop_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path().join("debug")).unwrap();

        let output = CascadeOutput {
            vehicles: vec![VehiclePlates {
                vehicle: Detection {
                    bbox: DetectionBox::new(5.0, 5.0, 60.0, 40.0).unwrap(),
                    score: 0.9,
                    class_id: 0,
                },
                plates: vec![Detection {
                    bbox: DetectionBox::new(20.0, 30.0, 40.0, 36.0).unwrap(),
                    score: 0.8,
                    class_id: 0,
                }],
            }],
        };

        let frame = DynamicImage::new_rgb8(64, 48);
        let annotated = writer.save_annotated(7, &frame, &output).unwrap();
        assert!(annotated.ends_with("frame_00007.jpg"));
        assert!(annotated.exists());

        let reloaded = image::open(&annotated).unwrap().to_rgb8();
        assert_eq!(reloaded.dimensions(), (64, 48));

        let crop = writer
            .save_plate(7, 0, &frame.crop_imm(20, 30, 20, 6))
            .unwrap();
        assert!(crop.exists());
    }

    #[test]
    fn test_unwritable_directory_is_artifact_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("debug");
        std::fs::write(&blocker, b"a file, not a directory").unwrap();

        let err = ArtifactWriter::new(blocker.join("frames"))
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::Artifact { .. }));
        assert!(err.to_string().starts_with("failed to write"));
    }
}
