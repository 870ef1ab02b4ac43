use std::path::Path;

use image::{ImageBuffer, Luma, Rgb, RgbImage};
use multiview_align::{camera::CameraIntrinsics, transform::Transform};
use nalgebra::Vector3;

pub const WIDTH: u32 = 120;
pub const HEIGHT: u32 = 90;

pub fn camera() -> CameraIntrinsics {
    CameraIntrinsics::from_focal(150.0, 59.5, 44.5)
}

/// Height above the z = 1 plane of the rendered surface.
fn height(x: f32, y: f32) -> f32 {
    0.03 * (10.0 * x + 0.3).sin() + 0.03 * (8.0 * y - 0.2).cos() + 0.02 * (7.0 * (x + y)).sin()
}

/// Camera to world poses of the rendered views, the first is the world frame.
pub fn poses() -> Vec<Transform> {
    vec![
        Transform::eye(),
        Transform::from_axis_angle(
            &Vector3::new(0.1, 0.0, 1.0).normalize(),
            3.0_f32.to_radians(),
            &Vector3::new(0.02, 0.0, 0.0),
        ),
        Transform::from_axis_angle(
            &Vector3::y(),
            -2.0_f32.to_radians(),
            &Vector3::new(0.0, 0.015, 0.01),
        ),
    ]
}

/// Ray casts the surface from `pose`, returns the depth (millimeters) and color images.
pub fn render(pose: &Transform) -> (ImageBuffer<Luma<u16>, Vec<u16>>, RgbImage) {
    let camera = camera();
    let center = pose.translation();
    let mut depth = ImageBuffer::<Luma<u16>, Vec<u16>>::new(WIDTH, HEIGHT);
    let mut color = RgbImage::new(WIDTH, HEIGHT);

    for row in 0..HEIGHT {
        for col in 0..WIDTH {
            // Ray with unit camera z, so the ray parameter is the depth.
            let ray = pose.transform_normal(&camera.backproject(col as f32, row as f32, 1.0));
            let mut t = (1.0 - center[2]) / ray[2];
            for _ in 0..50 {
                let hit = center + ray * t;
                t = (1.0 + height(hit[0], hit[1]) - center[2]) / ray[2];
            }
            let hit = center + ray * t;

            depth.put_pixel(col, row, Luma([(t * 1000.0).round() as u16]));
            color.put_pixel(
                col,
                row,
                Rgb([
                    (128.0 + 300.0 * hit[0]).clamp(0.0, 255.0) as u8,
                    (128.0 + 300.0 * hit[1]).clamp(0.0, 255.0) as u8,
                    200,
                ]),
            );
        }
    }

    (depth, color)
}

/// Writes the rendered views as `depth/depth{i}.png` and `color/color{i}.png` plus the
/// `intrinsics.json`.
pub fn write_dataset(dir: &Path) {
    std::fs::create_dir_all(dir.join("depth")).unwrap();
    std::fs::create_dir_all(dir.join("color")).unwrap();

    for (index, pose) in poses().iter().enumerate() {
        let (depth, color) = render(pose);
        depth
            .save(dir.join("depth").join(format!("depth{index}.png")))
            .unwrap();
        color
            .save(dir.join("color").join(format!("color{index}.png")))
            .unwrap();
    }

    std::fs::write(
        dir.join("intrinsics.json"),
        serde_json::to_string(&camera()).unwrap(),
    )
    .unwrap();
}
