pub mod dataset;
mod geometry;
pub use geometry::Geometry;
mod pcd;
pub use pcd::{read_pcd, write_pcd};
mod ply;
pub use ply::{read_ply, write_ply};
mod visualizer;
pub use visualizer::{CloudExporter, CloudFormat, Visualizer};

use std::path::Path;

use crate::{error::Result, pointcloud::PointCloud};

/// Reads a point cloud choosing the format by the file extension (`.pcd` or `.ply`).
pub fn read_point_cloud<P: AsRef<Path>>(filepath: P) -> Result<PointCloud> {
    CloudFormat::from_path(filepath.as_ref())?.read(filepath)
}
