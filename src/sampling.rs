use std::collections::BTreeMap;

use nalgebra::Vector3;
use ndarray::Array2;
use serde_derive::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pointcloud::PointCloud;

/// Reduces the density of a geometry.
pub trait Downsample {
    type Output;

    /// Downsamples using cells of `leaf_size` meters.
    fn downsample(&self, leaf_size: f32) -> Result<Self::Output>;
}

#[derive(Default)]
struct Voxel {
    point_sum: Vector3<f64>,
    normal_sum: Vector3<f64>,
    color_sum: [u64; 3],
    count: usize,
}

/// Voxel grid filter, replaces all points inside an axis-aligned cube by their centroid.
///
/// The grid is anchored at the origin, so the same input always produces the
/// same output, in lexicographic voxel order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoxelGrid {
    /// Edge length of the cubes in meters.
    pub leaf_size: f32,
}

impl VoxelGrid {
    /// Creates a voxel grid filter.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] if `leaf_size` isn't a positive finite number.
    pub fn new(leaf_size: f32) -> Result<Self> {
        if !(leaf_size.is_finite() && leaf_size > 0.0) {
            return Err(Error::invalid_parameter(format!(
                "Voxel leaf size must be positive, got {leaf_size}"
            )));
        }
        Ok(Self { leaf_size })
    }

    /// Filters a point cloud. Colors are averaged (rounded) per channel, normals, when
    /// present, are averaged and renormalized.
    /// Points with non-finite coordinates are dropped.
    pub fn filter(&self, pcl: &PointCloud) -> PointCloud {
        let mut grid = BTreeMap::<(i64, i64, i64), Voxel>::new();
        let inv_leaf = 1.0 / self.leaf_size as f64;

        for i in 0..pcl.len() {
            let point = pcl.point(i).cast::<f64>();
            if !point.iter().all(|v| v.is_finite()) {
                continue;
            }

            let key = (
                (point[0] * inv_leaf).floor() as i64,
                (point[1] * inv_leaf).floor() as i64,
                (point[2] * inv_leaf).floor() as i64,
            );
            let voxel = grid.entry(key).or_default();
            voxel.point_sum += point;
            voxel.count += 1;
            if let Some(color) = pcl.color(i) {
                for c in 0..3 {
                    voxel.color_sum[c] += color[c] as u64;
                }
            }
            if let Some(normal) = pcl.normal(i) {
                voxel.normal_sum += normal.cast::<f64>();
            }
        }

        let len = grid.len();
        let mut points = Array2::<f32>::zeros((len, 3));
        let mut colors = pcl.colors.as_ref().map(|_| Array2::<u8>::zeros((len, 3)));
        let mut normals = pcl.normals.as_ref().map(|_| Array2::<f32>::zeros((len, 3)));

        for (idx, voxel) in grid.values().enumerate() {
            let count = voxel.count as f64;
            let centroid = voxel.point_sum / count;
            for c in 0..3 {
                points[[idx, c]] = centroid[c] as f32;
            }

            if let Some(colors) = colors.as_mut() {
                for c in 0..3 {
                    colors[[idx, c]] = (voxel.color_sum[c] as f64 / count).round() as u8;
                }
            }

            if let Some(normals) = normals.as_mut() {
                if let Some(normal) = voxel.normal_sum.try_normalize(1e-12) {
                    for c in 0..3 {
                        normals[[idx, c]] = normal[c] as f32;
                    }
                }
            }
        }

        PointCloud {
            points,
            normals,
            colors,
        }
    }
}

impl Downsample for PointCloud {
    type Output = PointCloud;

    fn downsample(&self, leaf_size: f32) -> Result<PointCloud> {
        Ok(VoxelGrid::new(leaf_size)?.filter(self))
    }
}
