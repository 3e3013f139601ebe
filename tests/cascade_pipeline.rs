/// Integration tests for the vehicle -> plate detection cascade
mod support;

use image::DynamicImage;
use std::sync::atomic::Ordering;
use rover_service::pipeline::CascadeConfig;
use support::{cascade, cascade_with, row};

#[test]
fn test_zero_vehicles_skips_plate_model() {
    let (mut pipeline, vehicle_calls, plate_calls) = cascade(
        vec![row(320.0, 320.0, 100.0, 100.0, 0.2)],
        vec![row(320.0, 320.0, 64.0, 32.0, 0.9)],
    );

    let output = pipeline
        .infer(&DynamicImage::new_rgb8(1280, 640))
        .unwrap();

    assert_eq!(output.vehicle_count(), 0);
    assert_eq!(output.plate_count(), 0);
    assert_eq!(vehicle_calls.load(Ordering::SeqCst), 1);
    assert_eq!(plate_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_non_vehicle_classes_are_filtered() {
    // single-class model: every detection is class 0
    let (mut pipeline, _, plate_calls) = cascade_with(
        CascadeConfig {
            vehicle_class_ids: vec![2, 3],
        },
        vec![row(320.0, 320.0, 100.0, 100.0, 0.9)],
        vec![row(320.0, 320.0, 64.0, 32.0, 0.9)],
    );

    let output = pipeline
        .infer(&DynamicImage::new_rgb8(640, 640))
        .unwrap();
    assert_eq!(output.vehicle_count(), 0);
    assert_eq!(plate_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_plate_boxes_are_in_frame_coordinates() {
    let (mut pipeline, _, plate_calls) = cascade(
        vec![row(320.0, 320.0, 320.0, 320.0, 0.9)],
        vec![row(320.0, 320.0, 64.0, 32.0, 0.9)],
    );

    // vehicle scales by (2.0, 1.0): box (320, 160) -> (960, 480)
    let output = pipeline
        .infer(&DynamicImage::new_rgb8(1280, 640))
        .unwrap();

    assert_eq!(output.vehicle_count(), 1);
    assert_eq!(plate_calls.load(Ordering::SeqCst), 1);

    let vehicle = &output.vehicles[0].vehicle;
    assert_eq!(vehicle.bbox.x1(), 320.0);
    assert_eq!(vehicle.bbox.y1(), 160.0);
    assert_eq!(vehicle.bbox.x2(), 960.0);
    assert_eq!(vehicle.bbox.y2(), 480.0);

    // crop is 640x320, so the plate scales by (1.0, 0.5) then shifts by (320, 160)
    let plates = &output.vehicles[0].plates;
    assert_eq!(plates.len(), 1);
    assert_eq!(plates[0].bbox.x1(), 288.0 + 320.0);
    assert_eq!(plates[0].bbox.x2(), 352.0 + 320.0);
    assert_eq!(plates[0].bbox.y1(), 152.0 + 160.0);
    assert_eq!(plates[0].bbox.y2(), 168.0 + 160.0);
}

#[test]
fn test_overlapping_vehicles_are_suppressed() {
    let (mut pipeline, _, plate_calls) = cascade(
        vec![
            row(320.0, 320.0, 200.0, 200.0, 0.9),
            row(325.0, 322.0, 200.0, 200.0, 0.8),
            row(100.0, 100.0, 80.0, 80.0, 0.7),
        ],
        vec![],
    );

    let output = pipeline
        .infer(&DynamicImage::new_rgb8(640, 640))
        .unwrap();

    assert_eq!(output.vehicle_count(), 2);
    assert!(output.vehicles[0].vehicle.score > output.vehicles[1].vehicle.score);
    assert_eq!(plate_calls.load(Ordering::SeqCst), 2);
    assert_eq!(output.plate_count(), 0);
}

#[test]
fn test_nan_scored_vehicle_does_not_suppress_real_one() {
    let (mut pipeline, _, _) = cascade(
        vec![
            row(320.0, 320.0, 200.0, 200.0, 0.9),
            row(322.0, 322.0, 200.0, 200.0, f32::NAN),
        ],
        vec![],
    );

    let output = pipeline
        .infer(&DynamicImage::new_rgb8(640, 640))
        .unwrap();

    assert_eq!(output.vehicle_count(), 1);
    let vehicle = &output.vehicles[0].vehicle;
    assert!((vehicle.score - 0.9).abs() < 1e-6);
    assert_eq!(vehicle.bbox.x1(), 220.0);
}

#[test]
fn test_vehicle_outside_frame_is_skipped() {
    let (mut pipeline, _, plate_calls) = cascade(
        vec![row(-100.0, -100.0, 50.0, 50.0, 0.9)],
        vec![row(320.0, 320.0, 64.0, 32.0, 0.9)],
    );

    let output = pipeline
        .infer(&DynamicImage::new_rgb8(640, 640))
        .unwrap();

    assert_eq!(output.vehicle_count(), 1);
    assert!(output.vehicles[0].plates.is_empty());
    assert_eq!(plate_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_plate_detections_are_capped() {
    let plate_rows = (0..8)
        .map(|i| row(40.0 + 70.0 * i as f32, 320.0, 40.0, 20.0, 0.9 - 0.01 * i as f32))
        .collect();
    let (mut pipeline, _, _) = cascade(vec![row(320.0, 320.0, 640.0, 640.0, 0.9)], plate_rows);

    let output = pipeline
        .infer(&DynamicImage::new_rgb8(640, 640))
        .unwrap();
    assert_eq!(output.plate_count(), 5);
}
