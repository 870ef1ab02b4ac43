use ndarray::{Array2, Array3};
use rstest::fixture;

use crate::{camera::CameraIntrinsics, image::RgbdImage};

use super::wavy_height;

#[fixture]
pub fn planar_patch_camera() -> CameraIntrinsics {
    CameraIntrinsics::from_focal(570.0, 4.5, 4.5)
}

/// 10x10 view of a wall 1 meter away.
#[fixture]
pub fn planar_patch_rgbd() -> RgbdImage {
    let mut color = Array3::<u8>::zeros((10, 10, 3));
    color.indexed_iter_mut().for_each(|((row, col, channel), value)| {
        *value = match channel {
            0 => (row * 25) as u8,
            1 => (col * 25) as u8,
            _ => 128,
        };
    });
    RgbdImage::new(color, Array2::from_elem((10, 10), 1000)).unwrap()
}

#[fixture]
pub fn wavy_camera() -> CameraIntrinsics {
    CameraIntrinsics::from_focal(100.0, 39.5, 29.5)
}

/// 80x60 view of a curved surface about 1 meter in front of the camera.
#[fixture]
pub fn wavy_rgbd() -> RgbdImage {
    let camera = wavy_camera();
    let mut depth = Array2::<u16>::zeros((60, 80));
    let mut color = Array3::<u8>::zeros((60, 80, 3));

    for ((row, col), value) in depth.indexed_iter_mut() {
        // Fixed point iteration of z = 1 + h(x(z), y(z)) along the pixel's ray.
        let ray = camera.backproject(col as f32, row as f32, 1.0);
        let mut z = 1.0;
        for _ in 0..30 {
            z = 1.0 + wavy_height(ray[0] * z, ray[1] * z);
        }
        *value = (z * 1000.0).round() as u16;
        color[[row, col, 0]] = (row * 4) as u8;
        color[[row, col, 1]] = (col * 3) as u8;
        color[[row, col, 2]] = (z * 100.0) as u8;
    }

    RgbdImage::new(color, depth).unwrap()
}
