use log::{debug, warn};
use nalgebra::Vector3;
use rayon::prelude::*;

use super::cost_function::{PointPlaneDistance, PointPointDistance};
use super::params::{ErrorMetric, IcpParams};
use crate::{
    error::{Error, Result},
    kdtree::{KdTree, NearestNeighbors},
    optim::GaussNewton,
    pointcloud::PointCloud,
    transform::Transform,
};

/// Stages of an ICP run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcpState {
    Initialized,
    Iterating,
    /// One of the convergence thresholds was met.
    Converged,
    /// Stopped by the iteration limit.
    MaxIterationsReached,
    /// The correspondence set became empty, reported as [`Error::Registration`].
    Diverged,
}

/// Outcome of a successful ICP run.
#[derive(Debug, Clone)]
pub struct IcpResult {
    /// Transform that moves the source cloud onto the target cloud.
    pub transform: Transform,
    /// Either [`IcpState::Converged`] or [`IcpState::MaxIterationsReached`].
    pub state: IcpState,
    /// Mean squared residual over the correspondences at `transform`.
    pub fitness: f32,
    /// Number of iterations run.
    pub iterations: usize,
    /// Number of correspondences used to compute `fitness`.
    pub num_correspondences: usize,
    /// The source cloud moved by `transform`.
    pub aligned: PointCloud,
}

impl IcpResult {
    pub fn has_converged(&self) -> bool {
        self.state == IcpState::Converged
    }
}

/// Result of one correspondence pass.
struct Step {
    update: Option<Transform>,
    fitness: f32,
    /// Pairs that entered the system.
    num_correspondences: usize,
    /// Pairs within the maximum distance, including those without a valid target normal.
    num_matches: usize,
}

/// Finds the nearest target point of every source point moved by `transform`.
///
/// # Returns
///
/// Pairs of (moved source point, target index) within `max_distance`.
fn correspondences<'a>(
    kdtree: &'a KdTree,
    source: &'a PointCloud,
    transform: &'a Transform,
    max_distance: f32,
) -> impl ParallelIterator<Item = (Vector3<f32>, usize)> + 'a {
    let max_sqr_distance = max_distance * max_distance;

    (0..source.len()).into_par_iter().filter_map(move |i| {
        let source_point = transform.transform_vector(&source.point(i));
        let (target_index, sqr_distance) = kdtree.nearest(&source_point)?;
        if sqr_distance <= max_sqr_distance {
            Some((source_point, target_index))
        } else {
            None
        }
    })
}

/// Standard Iterative Closest Point (ICP) algorithm for aligning two point clouds.
/// The target is indexed once, so the same instance can align many sources,
/// also from different threads.
pub struct Icp<'target_lt> {
    /// Parameters of the ICP algorithm.
    pub params: IcpParams,
    target: &'target_lt PointCloud,
    kdtree: KdTree,
}

impl<'target_lt> Icp<'target_lt> {
    /// Create a new ICP instance.
    ///
    /// # Arguments
    ///
    /// * params - Parameters of the ICP algorithm.
    /// * target - Target point cloud, it must have normals for the point to plane metric.
    pub fn new(params: IcpParams, target: &'target_lt PointCloud) -> Result<Self> {
        params.validate()?;
        if params.metric == ErrorMetric::PointToPlane && target.normals.is_none() {
            return Err(Error::invalid_parameter(
                "The target point cloud must have normals for point to plane ICP",
            ));
        }

        Ok(Self {
            params,
            target,
            kdtree: KdTree::new(&target.points.view()),
        })
    }

    pub fn target(&self) -> &PointCloud {
        self.target
    }

    /// Aligns the source point cloud to the target point cloud starting from the identity.
    pub fn align(&self, source: &PointCloud) -> Result<IcpResult> {
        self.align_with(source, &Transform::eye())
    }

    /// Aligns the source point cloud to the target point cloud.
    ///
    /// # Arguments
    ///
    /// * source - Source point cloud.
    /// * initial_transform - Initial guess of the source to target transform.
    ///
    /// # Returns
    ///
    /// The transformation that aligns the source point cloud to the target point cloud.
    ///
    /// # Errors
    ///
    /// [`Error::Registration`] if at some iteration no source point has a
    /// correspondence within the maximum distance, or the correspondences
    /// don't give a solvable update (e.g. every target normal is invalid).
    pub fn align_with(&self, source: &PointCloud, initial_transform: &Transform) -> Result<IcpResult> {
        let mut optim_transform = initial_transform.clone();
        let mut state = IcpState::Initialized;
        let mut last_fitness: Option<f32> = None;
        let mut last_num_correspondences = 0;
        let mut iterations = 0;

        for iteration in 0..self.params.max_iterations {
            state = IcpState::Iterating;
            let step = self.correspondence_step(source, &optim_transform);
            let update = match step.update {
                Some(update) => update,
                None => {
                    state = IcpState::Diverged;
                    warn!(
                        "ICP {:?} at iteration {}: {} correspondences within {} m, {} usable",
                        state,
                        iteration,
                        step.num_matches,
                        self.params.max_correspondence_distance,
                        step.num_correspondences
                    );
                    return Err(Error::Registration {
                        iteration,
                        num_correspondences: step.num_matches,
                        last_fitness,
                    });
                }
            };

            optim_transform = &update * &optim_transform;
            iterations = iteration + 1;

            let change = update.change_magnitude();
            let fitness_change = last_fitness.map(|previous| (step.fitness - previous).abs());
            last_fitness = Some(step.fitness);
            last_num_correspondences = step.num_correspondences;

            debug!(
                "ICP iteration {}: {} correspondences, fitness {:.6e}, change {:.3e}",
                iteration, step.num_correspondences, step.fitness, change
            );

            let fitness_converged =
                fitness_change.map_or(false, |delta| delta < self.params.fitness_epsilon);
            if change <= self.params.transformation_epsilon || fitness_converged {
                state = IcpState::Converged;
                break;
            }
        }

        if state != IcpState::Converged {
            state = IcpState::MaxIterationsReached;
        }

        let final_step = self.correspondence_step(source, &optim_transform);
        let (fitness, num_correspondences) = if final_step.num_correspondences > 0 {
            (final_step.fitness, final_step.num_correspondences)
        } else {
            (last_fitness.unwrap_or(f32::INFINITY), last_num_correspondences)
        };

        debug!(
            "ICP finished as {:?} after {} iterations, fitness {:.6e}",
            state, iterations, fitness
        );

        Ok(IcpResult {
            aligned: &optim_transform * source,
            transform: optim_transform,
            state,
            fitness,
            iterations,
            num_correspondences,
        })
    }

    fn correspondence_step(&self, source: &PointCloud, transform: &Transform) -> Step {
        let pairs = correspondences(
            &self.kdtree,
            source,
            transform,
            self.params.max_correspondence_distance,
        );

        match self.params.metric {
            ErrorMetric::PointToPlane => {
                let geom_cost = PointPlaneDistance {};
                let (optimizer, num_matches) = pairs
                    .fold(
                        || (GaussNewton::<6>::new(), 0),
                        |(mut optimizer, num_matches), (source_point, index)| {
                            // Invalid target normals don't constrain the plane distance.
                            if let Some(target_normal) = self.target.normal(index) {
                                let (residual, jacobian) = geom_cost.jacobian(
                                    &source_point,
                                    &self.target.point(index),
                                    &target_normal,
                                );
                                optimizer.step(residual, &jacobian);
                            }
                            (optimizer, num_matches + 1)
                        },
                    )
                    .reduce(
                        || (GaussNewton::<6>::new(), 0),
                        |(mut lhs, lhs_matches), (rhs, rhs_matches)| {
                            lhs.add(&rhs);
                            (lhs, lhs_matches + rhs_matches)
                        },
                    );

                Step {
                    update: optimizer.solve().map(|update| Transform::exp(&update)),
                    fitness: optimizer.mean_squared_residual().unwrap_or(f32::INFINITY),
                    num_correspondences: optimizer.count(),
                    num_matches,
                }
            }
            ErrorMetric::PointToPoint => {
                let system = pairs
                    .fold(PointPointDistance::new, |mut system, (source_point, index)| {
                        system.step(&source_point, &self.target.point(index));
                        system
                    })
                    .reduce(PointPointDistance::new, |mut lhs, rhs| {
                        lhs.add(&rhs);
                        lhs
                    });

                Step {
                    update: system.solve(),
                    fitness: system.mean_squared_residual().unwrap_or(f32::INFINITY),
                    num_correspondences: system.count(),
                    num_matches: system.count(),
                }
            }
        }
    }
}
