use log::debug;
use nalgebra::{Matrix3, Vector3};
use ndarray::Array2;
use rayon::prelude::*;
use serde_derive::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::kdtree::{KdTree, NearestNeighbors};
use crate::pointcloud::PointCloud;

/// Estimates per point normals by principal component analysis of the
/// neighbors found within a fixed radius.
///
/// Points whose neighborhood is too small get a zero (invalid) normal, they are
/// kept in the cloud. The sign of the normals is not oriented.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalEstimator {
    /// Search radius in meters.
    pub radius: f32,
    /// Minimum neighborhood size, the point itself included.
    pub min_neighbors: usize,
}

impl Default for NormalEstimator {
    fn default() -> Self {
        Self {
            radius: 0.01,
            min_neighbors: 3,
        }
    }
}

impl NormalEstimator {
    pub fn new(radius: f32) -> Self {
        Self {
            radius,
            ..Default::default()
        }
    }

    pub fn with_min_neighbors(mut self, min_neighbors: usize) -> Self {
        self.min_neighbors = min_neighbors;
        self
    }

    fn check(&self) -> Result<()> {
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(Error::invalid_parameter(format!(
                "Normal search radius must be positive, got {}",
                self.radius
            )));
        }
        if self.min_neighbors < 3 {
            return Err(Error::invalid_parameter(
                "Normal estimation needs at least 3 neighbors",
            ));
        }
        Ok(())
    }

    /// Returns a copy of the cloud with estimated normals, replacing any existing ones.
    pub fn estimate(&self, pcl: &PointCloud) -> Result<PointCloud> {
        self.check()?;
        let kdtree = KdTree::new(&pcl.points.view());
        let normals = self.estimate_with(pcl, &kdtree);

        let result = PointCloud::new(pcl.points.clone(), Some(normals), pcl.colors.clone())?;
        let num_invalid = result.len() - result.count_valid_normals();
        if num_invalid > 0 {
            debug!(
                "{} of {} points have less than {} neighbors within {} m, their normals are invalid",
                num_invalid,
                result.len(),
                self.min_neighbors,
                self.radius
            );
        }
        Ok(result)
    }

    /// Computes the normals of `pcl` using a prebuilt index over the same points.
    ///
    /// # Returns
    ///
    /// Nx3 array of unit normals, zero rows where the estimation failed.
    pub fn estimate_with<N: NearestNeighbors>(&self, pcl: &PointCloud, index: &N) -> Array2<f32> {
        let normals = (0..pcl.len())
            .into_par_iter()
            .map(|i| {
                let neighbors = index.radius_search(&pcl.point(i), self.radius);
                if neighbors.len() < self.min_neighbors {
                    return None;
                }
                normal_from_neighborhood(neighbors.iter().map(|j| pcl.point(*j)))
            })
            .collect::<Vec<_>>();

        let mut result = Array2::<f32>::zeros((pcl.len(), 3));
        for (mut row, normal) in result.rows_mut().into_iter().zip(normals) {
            if let Some(normal) = normal {
                row[0] = normal[0];
                row[1] = normal[1];
                row[2] = normal[2];
            }
        }
        result
    }
}

/// Eigenvector of the smallest eigenvalue of the neighborhood's covariance.
/// `None` for degenerate neighborhoods (all points equal).
fn normal_from_neighborhood<I>(neighbors: I) -> Option<Vector3<f32>>
where
    I: Iterator<Item = Vector3<f32>> + Clone,
{
    let count = neighbors.clone().count() as f64;
    let centroid = neighbors
        .clone()
        .fold(Vector3::<f64>::zeros(), |acc, p| acc + p.cast::<f64>())
        / count;

    let mut covariance = Matrix3::<f64>::zeros();
    for point in neighbors {
        let diff = point.cast::<f64>() - centroid;
        covariance += diff * diff.transpose();
    }
    if covariance.trace() <= f64::EPSILON * f64::EPSILON {
        return None;
    }

    let eigen = covariance.symmetric_eigen();
    let min_idx = eigen.eigenvalues.imin();
    let normal = eigen.eigenvectors.column(min_idx).into_owned();
    normal
        .try_normalize(1e-10)
        .filter(|normal| normal.iter().all(|v| v.is_finite()))
        .map(|normal| normal.cast::<f32>())
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rstest::rstest;

    use super::NormalEstimator;
    use crate::{
        error::Error,
        pointcloud::PointCloud,
        unit_test::{planar_cloud, wavy_surface},
    };

    #[rstest]
    fn plane_normals_are_perpendicular(planar_cloud: PointCloud) {
        let pcl = NormalEstimator::new(0.025).estimate(&planar_cloud).unwrap();

        assert_eq!(pcl.count_valid_normals(), pcl.len());
        for i in 0..pcl.len() {
            let normal = pcl.normal(i).unwrap();
            assert_abs_diff_eq!(normal.norm(), 1.0, epsilon = 1e-4);
            assert_abs_diff_eq!(normal[2].abs(), 1.0, epsilon = 1e-4);
        }
        assert_eq!(pcl.points, planar_cloud.points);
        assert_eq!(pcl.colors, planar_cloud.colors);
    }

    #[rstest]
    fn curved_surface_normals_follow_the_surface(wavy_surface: PointCloud) {
        let pcl = NormalEstimator::new(0.025).estimate(&wavy_surface).unwrap();

        for i in 0..pcl.len() {
            let estimated = pcl.normal(i).unwrap();
            let exact = wavy_surface.normal(i).unwrap();
            assert_abs_diff_eq!(estimated.norm(), 1.0, epsilon = 1e-4);
            assert!(estimated.dot(&exact).abs() > 0.95);
        }
    }

    #[test]
    fn sparse_points_get_invalid_normals() {
        let pcl = PointCloud::new(
            array![
                [0.0, 0.0, 1.0],
                [0.005, 0.0, 1.0],
                [0.0, 0.005, 1.0],
                [1.0, 1.0, 1.0],
                [1.005, 1.0, 1.0]
            ],
            None,
            None,
        )
        .unwrap();
        let pcl = NormalEstimator::default().estimate(&pcl).unwrap();

        assert_eq!(pcl.len(), 5);
        assert!(pcl.normal(0).is_some());
        assert_abs_diff_eq!(pcl.normal(0).unwrap()[2].abs(), 1.0, epsilon = 1e-4);
        assert_eq!(pcl.normal(3), None);
        assert_eq!(pcl.normal(4), None);
        assert_eq!(pcl.count_valid_normals(), 3);
    }

    #[test]
    fn should_reject_invalid_parameters() {
        let pcl = PointCloud::new(array![[0.0, 0.0, 0.0]], None, None).unwrap();
        assert!(matches!(
            NormalEstimator::new(0.0).estimate(&pcl),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            NormalEstimator::new(0.1).with_min_neighbors(2).estimate(&pcl),
            Err(Error::InvalidParameter(_))
        ));
    }
}
