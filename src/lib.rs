//! Multi-view RGB-D registration: depth projection, voxel downsampling,
//! normal estimation and point to plane ICP against a reference view.
pub mod camera;
pub mod error;
pub mod icp;
pub mod image;
pub mod io;
pub mod kdtree;
pub mod metrics;
pub mod normals;
mod optim;
pub mod pointcloud;
pub mod projection;
pub mod registration;
pub mod sampling;
pub mod transform;

#[cfg(test)]
mod unit_test;

pub use crate::error::{Error, Result};
pub use crate::image::{ColorOrder, RgbdImage};
