use nalgebra::Vector3;
use ndarray::Array2;

use crate::{camera::CameraIntrinsics, image::RgbdImage, pointcloud::PointCloud};

/// Back-projects every pixel of an RGB-D image into a colored point cloud.
///
/// The cloud has exactly `width * height` points in row-major pixel order and
/// is expressed in the camera's frame, in meters. Pixels without depth are kept
/// and land on the camera center.
///
/// # Arguments
///
/// * camera - Intrinsics of the depth sensor.
/// * rgbd_image - Registered depth and color rasters.
pub fn project_rgbd_image(camera: &CameraIntrinsics, rgbd_image: &RgbdImage) -> PointCloud {
    let (height, width) = (rgbd_image.height(), rgbd_image.width());
    let depth_scale = rgbd_image.depth_scale as f32;

    let mut points = Array2::<f32>::zeros((width * height, 3));
    let mut colors = Array2::<u8>::zeros((width * height, 3));

    for row in 0..height {
        for col in 0..width {
            let idx = row * width + col;
            let depth = rgbd_image.depth[[row, col]] as f32;
            let point = camera.backproject(col as f32, row as f32, depth) * depth_scale;
            let color = rgbd_image.rgb(row, col);
            for c in 0..3 {
                points[[idx, c]] = point[c];
                colors[[idx, c]] = color[c];
            }
        }
    }

    PointCloud {
        points,
        normals: None,
        colors: Some(colors),
    }
}

/// Inverse of the projection: recovers the pixel (row, column) and raw depth of a point.
///
/// # Returns
///
/// `None` for points at or behind the camera center.
pub fn unproject_point(
    camera: &CameraIntrinsics,
    point: &Vector3<f32>,
    depth_scale: f64,
) -> Option<(f32, f32, f32)> {
    if point[2] <= 0.0 {
        return None;
    }
    let (x, y) = camera.project(point);
    Some((y, x, point[2] / depth_scale as f32))
}

impl PointCloud {
    /// See [`project_rgbd_image`].
    pub fn from_rgbd_image(camera: &CameraIntrinsics, rgbd_image: &RgbdImage) -> Self {
        project_rgbd_image(camera, rgbd_image)
    }
}
