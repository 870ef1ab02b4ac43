use serde_derive::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Distance minimized by the ICP solver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorMetric {
    /// Distance from the source point to the tangent plane of its target correspondence.
    /// Needs target normals.
    #[default]
    PointToPlane,
    /// Euclidean distance between corresponding points, solved in closed form.
    PointToPoint,
}

/// ICP parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IcpParams {
    /// Correspondences farther than this (meters) are rejected.
    pub max_correspondence_distance: f32,
    /// Maximum number of iterations.
    pub max_iterations: usize,
    /// Stops when the incremental transform's change, `max(|t|^2, 1 - cos(angle))`,
    /// is at most this value. The default only stops on a zero update.
    pub transformation_epsilon: f32,
    /// Stops when the fitness changes by less than this between iterations.
    /// Disabled when zero.
    pub fitness_epsilon: f32,
    pub metric: ErrorMetric,
}

impl Default for IcpParams {
    fn default() -> Self {
        Self {
            max_correspondence_distance: 0.03,
            max_iterations: 100,
            transformation_epsilon: 0.0,
            fitness_epsilon: 0.0,
            metric: ErrorMetric::PointToPlane,
        }
    }
}

impl IcpParams {
    pub fn with_max_correspondence_distance(mut self, value: f32) -> Self {
        self.max_correspondence_distance = value;
        self
    }

    pub fn with_max_iterations(mut self, value: usize) -> Self {
        self.max_iterations = value;
        self
    }

    pub fn with_transformation_epsilon(mut self, value: f32) -> Self {
        self.transformation_epsilon = value;
        self
    }

    pub fn with_fitness_epsilon(mut self, value: f32) -> Self {
        self.fitness_epsilon = value;
        self
    }

    pub fn with_metric(mut self, metric: ErrorMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Checks that the parameters are usable.
    pub fn validate(&self) -> Result<()> {
        if !(self.max_correspondence_distance.is_finite() && self.max_correspondence_distance > 0.0)
        {
            return Err(Error::invalid_parameter(format!(
                "Maximum correspondence distance must be positive, got {}",
                self.max_correspondence_distance
            )));
        }
        if self.max_iterations == 0 {
            return Err(Error::invalid_parameter(
                "Maximum number of iterations must be at least 1",
            ));
        }
        if self.transformation_epsilon < 0.0 || self.fitness_epsilon < 0.0 {
            return Err(Error::invalid_parameter("Convergence thresholds can't be negative"));
        }
        Ok(())
    }
}
