use nalgebra::{Isometry3, Matrix3, Rotation3, Translation3, UnitQuaternion, Vector3};

use crate::transform::Transform;

/// Point to plane distance, the residual is the distance along the target normal.
pub struct PointPlaneDistance {}

fn se3_jacobian(source_point: &Vector3<f32>, target_normal: &Vector3<f32>) -> [f32; 6] {
    let twist = source_point.cross(target_normal);
    [
        target_normal[0],
        target_normal[1],
        target_normal[2],
        twist[0],
        twist[1],
        twist[2],
    ]
}

impl PointPlaneDistance {
    /// Computes the residual and the Jacobian of the point-plane distance.
    ///
    /// # Arguments
    ///
    /// * source_point - 3D point in the source frame, already moved by the current estimate.
    /// * target_point - 3D point in the target frame.
    /// * target_normal - Normal of the plane in the target frame.
    ///
    /// # Returns
    ///
    /// * The residual `(target - source) . normal` and its (6) Jacobian with
    /// respect to the twist `[tx, ty, tz, wx, wy, wz]`.
    pub fn jacobian(
        &self,
        source_point: &Vector3<f32>,
        target_point: &Vector3<f32>,
        target_normal: &Vector3<f32>,
    ) -> (f32, [f32; 6]) {
        let residual = (target_point - source_point).dot(target_normal);
        (residual, se3_jacobian(source_point, target_normal))
    }
}

/// Accumulates point pairs for the closed form point to point alignment (Kabsch).
/// Partial systems can be merged with [`PointPointDistance::add`].
#[derive(Clone, Debug, Default)]
pub struct PointPointDistance {
    source_sum: Vector3<f64>,
    target_sum: Vector3<f64>,
    cross_sum: Matrix3<f64>,
    squared_residual_sum: f64,
    count: usize,
}

impl PointPointDistance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a correspondence.
    pub fn step(&mut self, source_point: &Vector3<f32>, target_point: &Vector3<f32>) {
        let source_point = source_point.cast::<f64>();
        let target_point = target_point.cast::<f64>();

        self.source_sum += source_point;
        self.target_sum += target_point;
        self.cross_sum += source_point * target_point.transpose();
        self.squared_residual_sum += (target_point - source_point).norm_squared();
        self.count += 1;
    }

    pub fn add(&mut self, other: &Self) {
        self.source_sum += other.source_sum;
        self.target_sum += other.target_sum;
        self.cross_sum += other.cross_sum;
        self.squared_residual_sum += other.squared_residual_sum;
        self.count += other.count;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Mean squared distance between the pairs, `None` if there are none.
    pub fn mean_squared_residual(&self) -> Option<f32> {
        if self.count == 0 {
            None
        } else {
            Some((self.squared_residual_sum / self.count as f64) as f32)
        }
    }

    /// The rigid transform that best moves the source points onto the target points.
    pub fn solve(&self) -> Option<Transform> {
        if self.count == 0 {
            return None;
        }

        let count = self.count as f64;
        let source_centroid = self.source_sum / count;
        let target_centroid = self.target_sum / count;
        let covariance =
            self.cross_sum / count - source_centroid * target_centroid.transpose();

        let svd = covariance.svd(true, true);
        let u = svd.u?;
        let v = svd.v_t?.transpose();

        // Flips the last axis if the solution is a reflection.
        let mut correction = Matrix3::<f64>::identity();
        correction[(2, 2)] = (v * u.transpose()).determinant().signum();
        let rotation = v * correction * u.transpose();
        let translation = target_centroid - rotation * source_centroid;

        if !(rotation.iter().all(|v| v.is_finite()) && translation.iter().all(|v| v.is_finite())) {
            return None;
        }

        let rotation: Matrix3<f32> = nalgebra::convert(rotation);
        let translation: Vector3<f32> = nalgebra::convert(translation);
        Some(Transform::from(Isometry3::from_parts(
            Translation3::from(translation),
            UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rotation)),
        )))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use nalgebra::Vector3;

    use super::{PointPlaneDistance, PointPointDistance};
    use crate::transform::Transform;

    #[test]
    fn point_plane_residual_is_the_distance_along_the_normal() {
        let (residual, jacobian) = PointPlaneDistance {}.jacobian(
            &Vector3::new(1.0, 2.0, 0.5),
            &Vector3::new(3.0, -1.0, 1.0),
            &Vector3::z(),
        );
        assert_abs_diff_eq!(residual, 0.5);
        assert_eq!(jacobian, [0.0, 0.0, 1.0, 2.0, -1.0, 0.0]);
    }

    #[test]
    fn should_recover_rigid_motion_from_pairs() {
        let transform = Transform::from_axis_angle(
            &Vector3::new(0.2, 1.0, 0.3),
            0.4,
            &Vector3::new(0.1, -0.05, 0.3),
        );
        let points = [
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(0.3, 0.0, 1.1),
            Vector3::new(0.0, 0.2, 0.9),
            Vector3::new(-0.1, 0.15, 1.3),
            Vector3::new(0.25, -0.3, 1.0),
        ];

        let mut first = PointPointDistance::new();
        let mut second = PointPointDistance::new();
        for (i, point) in points.iter().enumerate() {
            let target = transform.transform_vector(point);
            if i % 2 == 0 {
                first.step(point, &target);
            } else {
                second.step(point, &target);
            }
        }
        first.add(&second);
        assert_eq!(first.count(), 5);
        assert!(first.mean_squared_residual().unwrap() > 0.0);

        let estimated = first.solve().unwrap();
        assert_abs_diff_eq!(estimated.angle(), 0.4, epsilon = 1e-4);
        assert_abs_diff_eq!(
            estimated.translation(),
            transform.translation(),
            epsilon = 1e-4
        );
        assert!(PointPointDistance::new().solve().is_none());
    }
}
