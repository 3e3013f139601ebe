use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ==== Mission Metrics ====
    pub static ref ROVER_FRAMES_PROCESSED: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "rover_frames_processed_total",
                "Total number of captured frames run through the pipeline",
            ),
            &["status"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref ROVER_DISTANCE_COVERED: IntGauge = {
        let metric = IntGauge::new(
            "rover_distance_covered_centimetres",
            "Distance driven along the course in the current mission",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Pipeline Metrics ====
    pub static ref ROVER_DETECTIONS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "rover_detections_total",
                "Detections surviving suppression, by cascade stage",
            ),
            &["stage"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref ROVER_INFERENCE_TIME: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "rover_inference_time_seconds",
                "Time spent in model inference (excluding pre/post processing)",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.02, 0.05, 0.1, 0.2, 0.5, 1.0]),
            &["model", "execution_provider"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Registry Metrics ====
    pub static ref ROVER_PLATE_OUTCOMES: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "rover_plate_outcomes_total",
                "Plate reads by outcome (inserted, duplicate, parse_failed, slot_overflow, ocr_failed)",
            ),
            &["outcome"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };
}

/// Helper function to encode metrics in the Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e))
    })
}
