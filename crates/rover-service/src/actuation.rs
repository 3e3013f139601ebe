use crate::error::PipelineError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

/// Drive interface of the rover base
#[async_trait]
pub trait Actuator: Send {
    /// Drive forward `distance` metres at `velocity` m/s and return once stopped
    async fn drive(&mut self, distance: f64, velocity: f64) -> Result<(), PipelineError>;

    /// Bring the rover to a halt; safe to call repeatedly
    async fn stop(&mut self) -> Result<(), PipelineError>;
}

/// Stand-in for the RC-override drive, for bench runs without hardware.
///
/// Sleeps for `distance / velocity * time_scale` seconds per move.
pub struct SimulatedActuator {
    time_scale: f64,
    odometer: f64,
    moving: bool,
}

impl SimulatedActuator {
    pub fn new(time_scale: f64) -> Self {
        Self {
            time_scale: time_scale.max(0.0),
            odometer: 0.0,
            moving: false,
        }
    }

    /// Metres driven since construction
    pub fn odometer(&self) -> f64 {
        self.odometer
    }

    pub fn is_moving(&self) -> bool {
        self.moving
    }
}

#[async_trait]
impl Actuator for SimulatedActuator {
    async fn drive(&mut self, distance: f64, velocity: f64) -> Result<(), PipelineError> {
        if !(velocity.is_finite() && velocity > 0.0) {
            return Err(PipelineError::Actuation(format!(
                "velocity must be positive, got {}",
                velocity
            )));
        }
        if !(distance.is_finite() && distance >= 0.0) {
            return Err(PipelineError::Actuation(format!(
                "distance must be non-negative, got {}",
                distance
            )));
        }

        self.moving = true;
        let secs = distance / velocity * self.time_scale;
        debug!(distance, velocity, secs, "driving");
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
        self.odometer += distance;
        self.moving = false;

        Ok(())
    }

    async fn stop(&mut self) -> Result<(), PipelineError> {
        self.moving = false;
        info!(odometer = self.odometer, "rover stopped");
        Ok(())
    }
}
