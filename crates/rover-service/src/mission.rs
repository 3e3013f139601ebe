//! One pass of the rover along the course.
//!
//! At each capture point the rover grabs a frame, runs the cascade, reads and
//! normalizes every plate, records new plates, then drives one segment on.
//! Per-frame and per-plate failures are counted and skipped; store and
//! actuation failures end the mission. The rover is stopped and the store
//! closed on every exit path.

use crate::actuation::Actuator;
use crate::artifacts::ArtifactWriter;
use crate::camera::FrameSource;
use crate::error::PipelineError;
use crate::normalizer::normalize;
use crate::ocr::OcrEngine;
use crate::pipeline::CascadePipeline;
use crate::registry::RegistryService;
use crate::store::close_store;
use chrono::Utc;
use common::{FrameContext, PlateRecord};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use telemetry::metrics::{ROVER_DISTANCE_COVERED, ROVER_FRAMES_PROCESSED, ROVER_PLATE_OUTCOMES};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

#[derive(Debug, Clone)]
pub struct MissionConfig {
    /// Course length in metres
    pub total_distance: f64,
    pub num_slots: u32,
    /// Drive speed in m/s
    pub velocity: f64,
    /// Distance between capture points in metres
    pub segment_distance: f64,
    pub mission_timeout: Duration,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            total_distance: 10.0,
            num_slots: 5,
            velocity: 1.0,
            segment_distance: 1.0,
            mission_timeout: Duration::from_secs(120),
        }
    }
}

impl MissionConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let positive = |name: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(anyhow::anyhow!("{} must be a positive number, got {}", name, value))
            }
        };
        positive("total distance", self.total_distance)?;
        positive("velocity", self.velocity)?;
        positive("segment distance", self.segment_distance)?;
        if self.num_slots == 0 {
            anyhow::bail!("number of slots must be at least 1");
        }
        if self.total_distance / self.segment_distance >= u32::MAX as f64 {
            anyhow::bail!(
                "course of {} m has too many {} m segments",
                self.total_distance,
                self.segment_distance
            );
        }
        Ok(())
    }

    /// 1-based course segment for a position
    pub fn segment_index(&self, distance_covered: f64) -> u32 {
        // float-to-int casts saturate
        ((distance_covered / self.segment_distance).floor() as u32).saturating_add(1)
    }
}

/// Counters reported when a mission ends
#[derive(Debug, Clone, Default, Serialize)]
pub struct MissionSummary {
    pub frames: u64,
    pub frame_errors: u64,
    pub vehicles: u64,
    pub plates_detected: u64,
    pub ocr_failures: u64,
    pub parse_failures: u64,
    pub slot_overflows: u64,
    pub duplicates: u64,
    /// Plates inserted during this mission with their slots
    pub unique_plates: Vec<PlateRecord>,
    pub distance_covered: f64,
    pub elapsed_secs: f64,
    pub timed_out: bool,
}

impl MissionSummary {
    pub fn fps(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.frames as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }

    fn log(&self) {
        info!(
            frames = self.frames,
            frame_errors = self.frame_errors,
            vehicles = self.vehicles,
            plates_detected = self.plates_detected,
            unique_plates = self.unique_plates.len(),
            parse_failures = self.parse_failures,
            ocr_failures = self.ocr_failures,
            slot_overflows = self.slot_overflows,
            duplicates = self.duplicates,
            distance = self.distance_covered,
            elapsed_secs = self.elapsed_secs,
            fps = self.fps(),
            timed_out = self.timed_out,
            "mission summary"
        );
        for record in &self.unique_plates {
            info!(plate = %record.normalized_text, slot = record.slot_id, "registered plate");
        }
    }
}

/// Fatal failure, with the counters gathered before the abort
#[derive(Debug, Error)]
#[error("mission aborted: {source}")]
pub struct MissionError {
    #[source]
    pub source: PipelineError,
    pub summary: MissionSummary,
}

pub struct Mission {
    pipeline: CascadePipeline,
    ocr: Box<dyn OcrEngine>,
    registry: RegistryService,
    actuator: Box<dyn Actuator>,
    frames: Box<dyn FrameSource>,
    config: MissionConfig,
    artifacts: Option<ArtifactWriter>,
    metrics_file: Option<PathBuf>,
}

impl Mission {
    pub fn new(
        pipeline: CascadePipeline,
        ocr: Box<dyn OcrEngine>,
        registry: RegistryService,
        actuator: Box<dyn Actuator>,
        frames: Box<dyn FrameSource>,
        config: MissionConfig,
    ) -> Self {
        Self {
            pipeline,
            ocr,
            registry,
            actuator,
            frames,
            config,
            artifacts: None,
            metrics_file: None,
        }
    }

    pub fn with_artifacts(mut self, artifacts: ArtifactWriter) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    pub fn with_metrics_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.metrics_file = Some(path.into());
        self
    }

    /// Drive the course, then stop the rover and close the store.
    pub async fn run(mut self) -> Result<MissionSummary, MissionError> {
        let started = Instant::now();
        let mut summary = MissionSummary::default();

        info!(
            total_distance = self.config.total_distance,
            num_slots = self.config.num_slots,
            segment_distance = self.config.segment_distance,
            velocity = self.config.velocity,
            "mission started"
        );

        let result = self.drive_course(&mut summary, started).await;
        if let Err(e) = &result {
            error!(error = %e, "mission aborted");
        }

        let cleanup = self.shutdown().await;

        summary.elapsed_secs = started.elapsed().as_secs_f64();
        summary.unique_plates = self.registry.recorded().await;
        summary.log();
        self.dump_metrics();

        match result.and(cleanup) {
            Ok(()) => Ok(summary),
            Err(source) => Err(MissionError { source, summary }),
        }
    }

    async fn drive_course(
        &mut self,
        summary: &mut MissionSummary,
        started: Instant,
    ) -> Result<(), PipelineError> {
        let deadline = started + self.config.mission_timeout;
        let mut covered = 0.0_f64;
        let mut sequence = 0_u64;

        while covered < self.config.total_distance {
            if Instant::now() >= deadline {
                warn!(distance = covered, "mission timeout reached");
                summary.timed_out = true;
                break;
            }

            match self.frames.capture() {
                Ok(Some(raw_image)) => {
                    sequence += 1;
                    summary.frames += 1;
                    let frame = FrameContext {
                        raw_image,
                        segment_index: self.config.segment_index(covered),
                        distance_covered: covered,
                        sequence,
                        captured_at: Utc::now(),
                    };

                    let span = info_span!(
                        "frame",
                        sequence = frame.sequence,
                        segment = frame.segment_index
                    );
                    match self.process_frame(&frame, summary).instrument(span).await {
                        Ok(()) => {
                            ROVER_FRAMES_PROCESSED.with_label_values(&["ok"]).inc();
                        }
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => {
                            summary.frame_errors += 1;
                            ROVER_FRAMES_PROCESSED.with_label_values(&[e.kind()]).inc();
                            warn!(sequence, error = %e, "frame skipped");
                        }
                    }
                }
                Ok(None) => {
                    info!(frames = summary.frames, "frame source exhausted");
                    break;
                }
                Err(e) => {
                    summary.frame_errors += 1;
                    ROVER_FRAMES_PROCESSED.with_label_values(&[e.kind()]).inc();
                    warn!(error = %e, "frame capture failed");
                }
            }

            let step = self
                .config
                .segment_distance
                .min(self.config.total_distance - covered);
            self.actuator.drive(step, self.config.velocity).await?;
            covered = (covered + step).min(self.config.total_distance);
            summary.distance_covered = covered;
            ROVER_DISTANCE_COVERED.set((covered * 100.0).round() as i64);
        }

        Ok(())
    }

    async fn process_frame(
        &mut self,
        frame: &FrameContext,
        summary: &mut MissionSummary,
    ) -> Result<(), PipelineError> {
        let output = self.pipeline.infer(&frame.raw_image)?;
        summary.vehicles += output.vehicle_count() as u64;
        summary.plates_detected += output.plate_count() as u64;

        debug!(
            vehicles = output.vehicle_count(),
            plates = output.plate_count(),
            "cascade complete"
        );

        if let Some(artifacts) = &self.artifacts {
            if output.vehicle_count() > 0 {
                if let Err(e) = artifacts.save_annotated(frame.sequence, &frame.raw_image, &output)
                {
                    warn!(error = %e, "failed to write annotated frame");
                }
            }
        }

        for (index, plate) in output.plates().enumerate() {
            let Some(region) = plate.bbox.clamp_to(frame.width(), frame.height()) else {
                continue;
            };
            let crop = frame
                .raw_image
                .crop_imm(region.x, region.y, region.width, region.height);

            if let Some(artifacts) = &self.artifacts {
                if let Err(e) = artifacts.save_plate(frame.sequence, index, &crop) {
                    warn!(error = %e, "failed to write plate crop");
                }
            }

            let raw = match self.ocr.read_text(&crop) {
                Ok(raw) => raw,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    summary.ocr_failures += 1;
                    ROVER_PLATE_OUTCOMES.with_label_values(&["ocr_failed"]).inc();
                    warn!(error = %e, "plate OCR failed");
                    continue;
                }
            };

            let text = match normalize(&raw) {
                Ok(text) => text,
                Err(e) => {
                    summary.parse_failures += 1;
                    ROVER_PLATE_OUTCOMES.with_label_values(&[e.kind()]).inc();
                    debug!(raw = %raw, "{}", e);
                    continue;
                }
            };

            match self
                .registry
                .record_if_new(
                    &text,
                    frame.distance_covered,
                    self.config.total_distance,
                    self.config.num_slots,
                )
                .await
            {
                Ok(outcome) if outcome.inserted => {
                    ROVER_PLATE_OUTCOMES.with_label_values(&["inserted"]).inc();
                }
                Ok(_) => {
                    summary.duplicates += 1;
                    ROVER_PLATE_OUTCOMES.with_label_values(&["duplicate"]).inc();
                }
                Err(e @ PipelineError::SlotOverflow { .. }) => {
                    summary.slot_overflows += 1;
                    ROVER_PLATE_OUTCOMES.with_label_values(&[e.kind()]).inc();
                    warn!(plate = %text, error = %e, "plate not recorded");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    /// Stop the rover and release the store; both are attempted
    async fn shutdown(&mut self) -> Result<(), PipelineError> {
        let stopped = self.actuator.stop().await;
        if let Err(e) = &stopped {
            error!(error = %e, "failed to stop rover");
        }

        close_store(self.registry.store().as_ref()).await;

        stopped
    }

    fn dump_metrics(&self) {
        let Some(path) = &self.metrics_file else {
            return;
        };

        match telemetry::metrics::encode_metrics() {
            Ok(text) => {
                if let Err(e) = std::fs::write(path, text) {
                    warn!(path = %path.display(), "failed to write metrics: {}", e);
                }
            }
            Err(e) => warn!("failed to encode metrics: {}", e),
        }
    }
}
