use nalgebra::Vector3;
use serde_derive::{Deserialize, Serialize};

/// Camera intrinsic parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraIntrinsics {
    /// Focal length and pixel scale in the X-axis.
    pub fx: f64,
    /// Focal length and pixel scale in the Y-axis.
    pub fy: f64,
    /// Camera X-center.
    pub cx: f64,
    /// Camera Y-center.
    pub cy: f64,
}

impl Default for CameraIntrinsics {
    /// Intrinsics of the 640x480 depth sensor used to capture the reference dataset.
    fn default() -> Self {
        Self::from_focal(570.0, 319.5, 239.5)
    }
}

impl CameraIntrinsics {
    pub fn from_simple_intrinsic(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Intrinsics with a single focal length for both axes.
    ///
    /// # Arguments
    ///
    /// * focal: The focal length in pixels.
    /// * px: The principal point X coordinate.
    /// * py: The principal point Y coordinate.
    pub fn from_focal(focal: f64, px: f64, py: f64) -> Self {
        Self::from_simple_intrinsic(focal, focal, px, py)
    }

    /// Project a 3D point into image space.
    ///
    /// # Arguments
    ///
    /// * point: The 3D point.
    ///
    /// # Returns
    ///
    /// * (x and y) coordinates.
    pub fn project(&self, point: &Vector3<f32>) -> (f32, f32) {
        (
            point[0] * self.fx as f32 / point[2] + self.cx as f32,
            point[1] * self.fy as f32 / point[2] + self.cy as f32,
        )
    }

    /// Back-projects an image coordinate with depth `z` into camera space.
    pub fn backproject(&self, x: f32, y: f32, z: f32) -> Vector3<f32> {
        Vector3::new(
            (x - self.cx as f32) * z / self.fx as f32,
            (y - self.cy as f32) * z / self.fy as f32,
            z,
        )
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use nalgebra::Vector3;

    use super::CameraIntrinsics;

    #[test]
    fn should_backproject_and_project_back() {
        let camera = CameraIntrinsics::default();
        let point = camera.backproject(100.0, 50.0, 1.5);
        let (x, y) = camera.project(&point);
        assert_abs_diff_eq!(x, 100.0, epsilon = 1e-3);
        assert_abs_diff_eq!(y, 50.0, epsilon = 1e-3);
        assert_abs_diff_eq!(point[2], 1.5);
    }

    #[test]
    fn principal_point_lies_on_optical_axis() {
        let camera = CameraIntrinsics::from_focal(570.0, 4.5, 4.5);
        let point = camera.backproject(4.5, 4.5, 2.0);
        assert_eq!(point, Vector3::new(0.0, 0.0, 2.0));
    }

    #[test]
    fn should_parse_partial_json() {
        let camera: CameraIntrinsics = serde_json::from_str(r#"{"fx": 500.0, "fy": 500.0}"#).unwrap();
        assert_eq!(camera.fx, 500.0);
        assert_eq!(camera.cx, 319.5);
    }
}
