use nalgebra::Vector3;
use ndarray::Array2;
use rstest::fixture;

use crate::pointcloud::PointCloud;

/// Height of the synthetic curved surface used by the tests.
pub fn wavy_height(x: f32, y: f32) -> f32 {
    0.03 * (10.0 * x + 0.3).sin() + 0.03 * (8.0 * y - 0.2).cos() + 0.02 * (7.0 * (x + y)).sin()
}

fn wavy_normal(x: f32, y: f32) -> Vector3<f32> {
    let dx = 0.3 * (10.0 * x + 0.3).cos() + 0.14 * (7.0 * (x + y)).cos();
    let dy = -0.24 * (8.0 * y - 0.2).sin() + 0.14 * (7.0 * (x + y)).cos();
    Vector3::new(-dx, -dy, 1.0).normalize()
}

fn grid_cloud<F>(size: usize, spacing: f32, surface: F) -> PointCloud
where
    F: Fn(f32, f32) -> (f32, Vector3<f32>),
{
    let mut points = Array2::<f32>::zeros((size * size, 3));
    let mut normals = Array2::<f32>::zeros((size * size, 3));
    let mut colors = Array2::<u8>::zeros((size * size, 3));
    let offset = (size - 1) as f32 * spacing * 0.5;

    for row in 0..size {
        for col in 0..size {
            let idx = row * size + col;
            let x = col as f32 * spacing - offset;
            let y = row as f32 * spacing - offset;
            let (z, normal) = surface(x, y);
            for c in 0..3 {
                normals[[idx, c]] = normal[c];
            }
            points[[idx, 0]] = x;
            points[[idx, 1]] = y;
            points[[idx, 2]] = z;
            colors[[idx, 0]] = (row * 255 / size) as u8;
            colors[[idx, 1]] = (col * 255 / size) as u8;
        }
    }

    PointCloud::new(points, Some(normals), Some(colors)).unwrap()
}

/// 31x31 samples of the curved surface, 1 cm apart, with exact normals.
#[fixture]
pub fn wavy_surface() -> PointCloud {
    grid_cloud(31, 0.01, |x, y| (1.0 + wavy_height(x, y), wavy_normal(x, y)))
}

/// 21x21 samples of the z = 1 plane, 1 cm apart.
#[fixture]
pub fn planar_cloud() -> PointCloud {
    grid_cloud(21, 0.01, |_, _| (1.0, Vector3::z()))
}
