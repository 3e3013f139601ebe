//! Detection contracts shared by the inference pipeline.
//!
//! Boxes are axis-aligned rectangles in image-pixel coordinates. A box always
//! has a positive width and height: constructors return `None` instead of a
//! degenerate rectangle.

use chrono::{DateTime, Utc};
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in corner form (x1, y1, x2, y2)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBox")]
pub struct DetectionBox {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

#[derive(Deserialize)]
struct RawBox {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

impl TryFrom<RawBox> for DetectionBox {
    type Error = String;

    fn try_from(raw: RawBox) -> Result<Self, Self::Error> {
        DetectionBox::new(raw.x1, raw.y1, raw.x2, raw.y2).ok_or_else(|| {
            format!(
                "degenerate box ({}, {}) -> ({}, {})",
                raw.x1, raw.y1, raw.x2, raw.y2
            )
        })
    }
}

impl DetectionBox {
    /// Build a box from its corners; `None` unless x2 > x1 and y2 > y1
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Option<Self> {
        // NaN fails both comparisons
        if x2 > x1 && y2 > y1 {
            Some(Self { x1, y1, x2, y2 })
        } else {
            None
        }
    }

    /// Build a box from YOLO center form (cx, cy, w, h)
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Option<Self> {
        Self::new(
            cx - width / 2.0,
            cy - height / 2.0,
            cx + width / 2.0,
            cy + height / 2.0,
        )
    }

    pub fn x1(&self) -> f32 {
        self.x1
    }

    pub fn y1(&self) -> f32 {
        self.y1
    }

    pub fn x2(&self) -> f32 {
        self.x2
    }

    pub fn y2(&self) -> f32 {
        self.y2
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Scale each axis independently
    pub fn scale(&self, sx: f32, sy: f32) -> Option<Self> {
        Self::new(self.x1 * sx, self.y1 * sy, self.x2 * sx, self.y2 * sy)
    }

    /// Shift the box by (dx, dy); used to move crop-local boxes into frame space
    pub fn translate(&self, dx: f32, dy: f32) -> Self {
        Self {
            x1: self.x1 + dx,
            y1: self.y1 + dy,
            x2: self.x2 + dx,
            y2: self.y2 + dy,
        }
    }

    /// Area shared with another box (0.0 when disjoint)
    pub fn intersection(&self, other: &DetectionBox) -> f32 {
        let w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        w * h
    }

    /// Integer pixel region of this box clipped to a `width` x `height` image.
    ///
    /// Returns `None` when nothing of the box remains inside the image.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<PixelRegion> {
        let x0 = self.x1.max(0.0).floor() as u32;
        let y0 = self.y1.max(0.0).floor() as u32;
        let x_end = (self.x2.max(0.0).floor() as u32).min(width);
        let y_end = (self.y2.max(0.0).floor() as u32).min(height);

        if x_end <= x0 || y_end <= y0 {
            return None;
        }

        Some(PixelRegion {
            x: x0,
            y: y0,
            width: x_end - x0,
            height: y_end - y0,
        })
    }
}

/// Non-empty integer rectangle inside an image, suitable for cropping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Single detector output after thresholding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Corner-form box in image-pixel coordinates
    #[serde(rename = "box")]
    pub bbox: DetectionBox,

    /// objectness x class score, in [0, 1]
    pub score: f32,

    /// Index into the model's class list
    pub class_id: usize,
}

/// A captured frame and where along the course it was taken
#[derive(Debug, Clone)]
pub struct FrameContext {
    pub raw_image: DynamicImage,

    /// 1-based segment of the course the frame belongs to
    pub segment_index: u32,

    /// Metres driven from the start line when the frame was captured
    pub distance_covered: f64,

    /// Monotonic frame counter within a mission
    pub sequence: u64,

    pub captured_at: DateTime<Utc>,
}

impl FrameContext {
    pub fn width(&self) -> u32 {
        self.raw_image.width()
    }

    pub fn height(&self) -> u32 {
        self.raw_image.height()
    }
}
