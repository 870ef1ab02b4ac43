use ndarray::prelude::*;

/// Generic representation of the per vertex attributes found in point cloud files.
#[derive(Debug, Clone)]
pub struct Geometry {
    /// The 3D points. Shape is (Nx3).
    pub points: Array2<f32>,
    /// The RGB colors. Shape is (Nx3).
    pub colors: Option<Array2<u8>>,
    /// Per vertices normals. Shape is (Nx3)
    pub normals: Option<Array2<f32>>,
}
