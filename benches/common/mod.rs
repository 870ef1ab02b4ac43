use multiview_align::pointcloud::PointCloud;
use ndarray::Array2;

/// Samples a `size`x`size` grid of a wavy surface one meter away from the camera.
pub fn wavy_cloud(size: usize, spacing: f32) -> PointCloud {
    let half = (size as f32 - 1.0) * spacing * 0.5;
    let mut points = Array2::<f32>::zeros((size * size, 3));
    for (i, mut point) in points.rows_mut().into_iter().enumerate() {
        let x = (i % size) as f32 * spacing - half;
        let y = (i / size) as f32 * spacing - half;
        point[0] = x;
        point[1] = y;
        point[2] = 1.0
            + 0.03 * (10.0 * x + 0.3).sin()
            + 0.03 * (8.0 * y - 0.2).cos()
            + 0.02 * (7.0 * (x + y)).sin();
    }
    PointCloud::new(points, None, None).unwrap()
}
