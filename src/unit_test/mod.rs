mod images;
pub(crate) use images::{planar_patch_camera, planar_patch_rgbd, wavy_camera, wavy_rgbd};
mod point_clouds;
pub(crate) use point_clouds::{planar_cloud, wavy_height, wavy_surface};
