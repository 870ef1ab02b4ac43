use nalgebra::Vector3;
use ndarray::prelude::*;
use ndarray::{concatenate, Array2};

use crate::error::{Error, Result};
use crate::io::Geometry;
use crate::transform::Transform;

/// Squared norm below which a normal is considered invalid (failed estimation).
pub const INVALID_NORMAL_EPSILON: f32 = 1e-12;

/// Colored point cloud with optional per point normals.
///
/// Points are stored row-wise, row `i` of `points`, `normals` and `colors`
/// describe the same point.
#[derive(Clone, Debug, PartialEq)]
pub struct PointCloud {
    /// Positions in meters. Shape is (Nx3).
    pub points: Array2<f32>,
    /// Unit normals, or zero rows where the estimation failed. Shape is (Nx3).
    pub normals: Option<Array2<f32>>,
    /// RGB colors. Shape is (Nx3).
    pub colors: Option<Array2<u8>>,
}

impl PointCloud {
    /// Creates a point cloud, checking that the attributes agree in length.
    pub fn new(
        points: Array2<f32>,
        normals: Option<Array2<f32>>,
        colors: Option<Array2<u8>>,
    ) -> Result<Self> {
        let len = points.nrows();
        if points.ncols() != 3 {
            return Err(Error::invalid_parameter("Points must have shape (N, 3)"));
        }
        if let Some(normals) = &normals {
            if normals.dim() != (len, 3) {
                return Err(Error::invalid_parameter(
                    "Normals must have the same shape as the points",
                ));
            }
        }
        if let Some(colors) = &colors {
            if colors.dim() != (len, 3) {
                return Err(Error::invalid_parameter(
                    "Colors must have the same shape as the points",
                ));
            }
        }

        Ok(Self {
            points,
            normals,
            colors,
        })
    }

    pub fn from_geometry(geometry: Geometry) -> Result<Self> {
        Self::new(geometry.points, geometry.normals, geometry.colors)
    }

    pub fn len(&self) -> usize {
        self.points.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn point(&self, index: usize) -> Vector3<f32> {
        let row = self.points.row(index);
        Vector3::new(row[0], row[1], row[2])
    }

    /// The normal of a point, `None` if the cloud has no normals or if the normal is invalid.
    pub fn normal(&self, index: usize) -> Option<Vector3<f32>> {
        let normals = self.normals.as_ref()?;
        let row = normals.row(index);
        let normal = Vector3::new(row[0], row[1], row[2]);
        if normal.norm_squared() > INVALID_NORMAL_EPSILON {
            Some(normal)
        } else {
            None
        }
    }

    pub fn color(&self, index: usize) -> Option<[u8; 3]> {
        let colors = self.colors.as_ref()?;
        let row = colors.row(index);
        Some([row[0], row[1], row[2]])
    }

    /// Number of points holding a valid normal.
    pub fn count_valid_normals(&self) -> usize {
        (0..self.len())
            .filter(|index| self.normal(*index).is_some())
            .count()
    }

    /// Concatenates point clouds into a single one. Normals and colors are kept only
    /// if every cloud has them.
    pub fn merge(clouds: &[&PointCloud]) -> Result<PointCloud> {
        if clouds.is_empty() {
            return PointCloud::new(Array2::zeros((0, 3)), None, None);
        }

        let points = clouds.iter().map(|pcl| pcl.points.view()).collect::<Vec<_>>();
        let points = concatenate(Axis(0), &points)
            .map_err(|err| Error::invalid_parameter(format!("Can't merge clouds: {err}")))?;

        let normals = if clouds.iter().all(|pcl| pcl.normals.is_some()) {
            let normals = clouds
                .iter()
                .filter_map(|pcl| pcl.normals.as_ref().map(|normals| normals.view()))
                .collect::<Vec<_>>();
            Some(
                concatenate(Axis(0), &normals).map_err(|err| {
                    Error::invalid_parameter(format!("Can't merge normals: {err}"))
                })?,
            )
        } else {
            None
        };

        let colors = if clouds.iter().all(|pcl| pcl.colors.is_some()) {
            let colors = clouds
                .iter()
                .filter_map(|pcl| pcl.colors.as_ref().map(|colors| colors.view()))
                .collect::<Vec<_>>();
            Some(
                concatenate(Axis(0), &colors).map_err(|err| {
                    Error::invalid_parameter(format!("Can't merge colors: {err}"))
                })?,
            )
        } else {
            None
        };

        PointCloud::new(points, normals, colors)
    }
}

impl std::ops::Mul<&PointCloud> for &Transform {
    type Output = PointCloud;
    fn mul(self, rhs: &PointCloud) -> PointCloud {
        PointCloud {
            points: self * &rhs.points,
            normals: rhs.normals.as_ref().map(|normals| {
                let rotation = self.ortho_rotation();
                let mut result = normals.clone();
                for mut normal in result.axis_iter_mut(Axis(0)) {
                    let v = rotation * Vector3::new(normal[0], normal[1], normal[2]);
                    normal[0] = v[0];
                    normal[1] = v[1];
                    normal[2] = v[2];
                }
                result
            }),
            colors: rhs.colors.clone(),
        }
    }
}

impl From<PointCloud> for Geometry {
    fn from(pcl: PointCloud) -> Geometry {
        Geometry {
            points: pcl.points,
            normals: pcl.normals,
            colors: pcl.colors,
        }
    }
}
