use std::path::{Path, PathBuf};

use log::{info, warn};
use serde_derive::{Deserialize, Serialize};

use super::{read_pcd, read_ply, write_pcd, write_ply};
use crate::error::{Error, Result};
use crate::pointcloud::PointCloud;

/// Sink for point clouds that are ready to be displayed. Rendering happens
/// after registration finishes, implementations never feed anything back.
pub trait Visualizer {
    /// Adds a named point cloud rendered with the given point size.
    fn add_point_cloud(&mut self, name: &str, pcl: &PointCloud, point_size: f32);
}

/// Point cloud file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudFormat {
    Ply,
    Pcd,
}

impl CloudFormat {
    /// Guesses the format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        extension.parse()
    }

    pub fn extension(&self) -> &'static str {
        match self {
            CloudFormat::Ply => "ply",
            CloudFormat::Pcd => "pcd",
        }
    }

    pub fn write<P: AsRef<Path>>(&self, filepath: P, pcl: &PointCloud) -> Result<()> {
        match self {
            CloudFormat::Ply => write_ply(filepath, pcl),
            CloudFormat::Pcd => write_pcd(filepath, pcl),
        }
    }

    pub fn read<P: AsRef<Path>>(&self, filepath: P) -> Result<PointCloud> {
        match self {
            CloudFormat::Ply => read_ply(filepath),
            CloudFormat::Pcd => read_pcd(filepath),
        }
    }
}

impl std::str::FromStr for CloudFormat {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "ply" => Ok(CloudFormat::Ply),
            "pcd" => Ok(CloudFormat::Pcd),
            _ => Err(Error::invalid_parameter(format!(
                "Unknown point cloud format: `{value}`"
            ))),
        }
    }
}

/// Visualizer that saves every added point cloud into a directory, so it
/// can be inspected with an external viewer.
pub struct CloudExporter {
    directory: PathBuf,
    format: CloudFormat,
    written: Vec<PathBuf>,
}

impl CloudExporter {
    pub fn new<P: AsRef<Path>>(directory: P, format: CloudFormat) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            format,
            written: Vec::new(),
        }
    }

    /// Files successfully written so far.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    /// Writes a point cloud, returning the path of the created file.
    pub fn export(&mut self, name: &str, pcl: &PointCloud) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.directory)?;
        let filepath = self
            .directory
            .join(format!("{name}.{}", self.format.extension()));
        self.format.write(&filepath, pcl)?;
        self.written.push(filepath.clone());
        Ok(filepath)
    }
}

impl Visualizer for CloudExporter {
    fn add_point_cloud(&mut self, name: &str, pcl: &PointCloud, point_size: f32) {
        match self.export(name, pcl) {
            Ok(filepath) => info!(
                "Saved {} ({} points, point size {point_size}) to {}",
                name,
                pcl.len(),
                filepath.display()
            ),
            Err(err) => warn!("Could not save {name}: {err}"),
        }
    }
}
