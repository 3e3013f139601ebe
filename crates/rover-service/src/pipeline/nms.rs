//! Greedy non-maximum suppression.

use common::{Detection, DetectionBox};
use std::collections::BTreeMap;

/// Intersection over union; 0.0 when the union is empty
pub fn iou(a: &DetectionBox, b: &DetectionBox) -> f32 {
    let intersection = a.intersection(b);
    let union = a.area() + b.area() - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Indices of the boxes kept by greedy NMS, highest score first.
///
/// Ties in score keep their original order. A box is discarded when its IoU
/// with an already kept box is strictly greater than `iou_threshold`.
pub fn suppress(boxes: &[DetectionBox], scores: &[f32], iou_threshold: f32) -> Vec<usize> {
    let len = boxes.len().min(scores.len());
    let mut order: Vec<usize> = (0..len).collect();
    // sort_by is stable, so equal scores stay in index order
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut keep: Vec<usize> = Vec::new();
    for candidate in order {
        let overlaps = keep
            .iter()
            .any(|&kept| iou(&boxes[kept], &boxes[candidate]) > iou_threshold);
        if !overlaps {
            keep.push(candidate);
        }
    }

    keep
}

/// Run [`suppress`] independently for each class id.
///
/// Survivors are returned by descending score across all classes.
pub fn suppress_per_class(detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    let mut by_class: BTreeMap<usize, Vec<Detection>> = BTreeMap::new();
    for detection in detections {
        by_class.entry(detection.class_id).or_default().push(detection);
    }

    let mut survivors = Vec::new();
    for (_, group) in by_class {
        let boxes: Vec<DetectionBox> = group.iter().map(|d| d.bbox).collect();
        let scores: Vec<f32> = group.iter().map(|d| d.score).collect();
        let kept = suppress(&boxes, &scores, iou_threshold);
        survivors.extend(kept.into_iter().map(|i| group[i].clone()));
    }

    survivors.sort_by(|a, b| b.score.total_cmp(&a.score));
    survivors
}
