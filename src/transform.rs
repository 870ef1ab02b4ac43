use nalgebra::{
    Isometry3, Matrix3, Matrix4, Quaternion, Rotation3, Translation3, UnitQuaternion, Vector3,
    Vector6,
};
use ndarray::{Array2, Axis};

use std::ops;

/// Rigid transformation (rotation and translation) in 3D space.
#[derive(Clone, Debug, PartialEq)]
pub struct Transform(Isometry3<f32>);

impl Default for Transform {
    fn default() -> Self {
        Self::eye()
    }
}

impl Transform {
    /// Identity transform.
    pub fn eye() -> Self {
        Self(Isometry3::identity())
    }

    /// Creates a transform from a translation and a (not necessarily normalized) quaternion.
    pub fn new(xyz: &Vector3<f32>, rotation: &Quaternion<f32>) -> Self {
        Self(Isometry3::from_parts(
            Translation3::from(*xyz),
            UnitQuaternion::from_quaternion(*rotation),
        ))
    }

    /// Creates a transform that rotates `angle` radians around `axis` and then translates by `xyz`.
    pub fn from_axis_angle(axis: &Vector3<f32>, angle: f32, xyz: &Vector3<f32>) -> Self {
        let scaled_axis = axis.normalize() * angle;
        Self(Isometry3::from_parts(
            Translation3::from(*xyz),
            UnitQuaternion::from_scaled_axis(scaled_axis),
        ))
    }

    /// Exponential map of a twist vector `[tx, ty, tz, wx, wy, wz]`.
    /// The rotational part is the scaled axis `w`, so the result is always a proper rotation.
    pub fn exp(twist: &Vector6<f32>) -> Self {
        let translation = Translation3::new(twist[0], twist[1], twist[2]);
        let so3 = Vector3::new(twist[3], twist[4], twist[5]);

        Self(Isometry3::from_parts(
            translation,
            UnitQuaternion::from_scaled_axis(so3),
        ))
    }

    /// Creates a transform from a 4x4 homogeneous matrix.
    /// The upper 3x3 block is re-orthonormalized before use.
    pub fn from_matrix4(matrix: &Matrix4<f32>) -> Self {
        let translation = Translation3::new(matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)]);
        let rotation: Matrix3<f32> = matrix.fixed_slice::<3, 3>(0, 0).into_owned();
        let rotation = Rotation3::from_matrix(&rotation);
        Self(Isometry3::from_parts(
            translation,
            UnitQuaternion::from_rotation_matrix(&rotation),
        ))
    }

    /// 4x4 homogeneous matrix of this transform.
    pub fn matrix(&self) -> Matrix4<f32> {
        self.0.to_homogeneous()
    }

    pub fn inverse(&self) -> Self {
        Self(self.0.inverse())
    }

    /// Rotation angle in radians.
    pub fn angle(&self) -> f32 {
        self.0.rotation.angle()
    }

    pub fn translation(&self) -> Vector3<f32> {
        self.0.translation.vector
    }

    pub fn ortho_rotation(&self) -> Rotation3<f32> {
        self.0.rotation.to_rotation_matrix()
    }

    /// Transforms a point (rotation and translation).
    pub fn transform_vector(&self, point: &Vector3<f32>) -> Vector3<f32> {
        self.0.transform_point(&(*point).into()).coords
    }

    /// Transforms a direction, only the rotation is applied.
    pub fn transform_normal(&self, normal: &Vector3<f32>) -> Vector3<f32> {
        self.0.rotation * normal
    }

    /// Magnitude of the motion described by this transform, used as
    /// convergence measure for incremental updates: `max(|t|^2, 1 - cos(angle))`.
    pub fn change_magnitude(&self) -> f32 {
        let translation_sqr = self.translation().norm_squared();
        let rotation = 1.0 - self.angle().cos();
        translation_sqr.max(rotation)
    }
}

impl From<Isometry3<f32>> for Transform {
    fn from(isometry: Isometry3<f32>) -> Self {
        Self(isometry)
    }
}

impl ops::Mul<&Array2<f32>> for &Transform {
    type Output = Array2<f32>;

    fn mul(self, rhs: &Array2<f32>) -> Self::Output {
        let mut result = Array2::<f32>::zeros((rhs.len_of(Axis(0)), 3));

        for (in_iter, mut out_iter) in rhs.axis_iter(Axis(0)).zip(result.axis_iter_mut(Axis(0))) {
            let v = self.transform_vector(&Vector3::new(in_iter[0], in_iter[1], in_iter[2]));
            out_iter[0] = v[0];
            out_iter[1] = v[1];
            out_iter[2] = v[2];
        }

        result
    }
}

impl ops::Mul<&Vector3<f32>> for &Transform {
    type Output = Vector3<f32>;

    fn mul(self, rhs: &Vector3<f32>) -> Self::Output {
        self.transform_vector(rhs)
    }
}

impl ops::Mul<&Transform> for &Transform {
    type Output = Transform;

    fn mul(self, rhs: &Transform) -> Self::Output {
        let mut isometry = self.0 * rhs.0;
        isometry.rotation.renormalize();
        Transform(isometry)
    }
}

impl From<Transform> for Matrix4<f32> {
    fn from(transform: Transform) -> Self {
        transform.matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::Transform;
    use approx::assert_abs_diff_eq;
    use nalgebra::{Matrix4, Vector3, Vector6};
    use ndarray::{array, Array2};

    #[test]
    fn test_mul_op() {
        let transform = Transform::eye();
        let points = array![[1., 2., 3.], [4., 5., 6.], [7., 8., 9.]];
        let mult_result = &transform * &points;

        assert_eq!(mult_result, points);

        let transform = Transform::from_axis_angle(
            &Vector3::y(),
            std::f32::consts::PI,
            &Vector3::new(0., 0., 3.),
        );

        let result = &transform * &array![[1.0, 2.0, 3.0], [1.0, 2.0, 3.0]];
        let expected: Array2<f32> = array![[-1.0, 2.0, 0.0], [-1.0, 2.0, 0.0]];
        for (value, expected) in result.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(value, expected, epsilon = 1e-5);
        }
    }

    #[test]
    fn should_compose_with_inverse_into_identity() {
        let transform = Transform::from_axis_angle(
            &Vector3::new(1.0, 1.0, 0.0),
            0.3,
            &Vector3::new(0.1, -0.2, 0.5),
        );
        let identity = &transform * &transform.inverse();
        assert_abs_diff_eq!(identity.angle(), 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(identity.translation().norm(), 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(identity.change_magnitude(), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn exp_of_zero_twist_is_identity() {
        let transform = Transform::exp(&Vector6::zeros());
        assert_eq!(transform, Transform::eye());
        assert_eq!(transform.change_magnitude(), 0.0);
    }

    #[test]
    fn should_convert_to_and_from_matrix() {
        let transform =
            Transform::from_axis_angle(&Vector3::z(), 0.25, &Vector3::new(1.0, 2.0, 3.0));
        let matrix: Matrix4<f32> = transform.clone().into();
        assert_abs_diff_eq!(matrix[(2, 3)], 3.0);

        let back = Transform::from_matrix4(&matrix);
        assert_abs_diff_eq!(back.angle(), 0.25, epsilon = 1e-5);
        assert_abs_diff_eq!(back.translation(), transform.translation(), epsilon = 1e-5);
    }

    #[test]
    fn normals_ignore_translation() {
        let transform =
            Transform::from_axis_angle(&Vector3::z(), std::f32::consts::FRAC_PI_2, &Vector3::x());
        let normal = transform.transform_normal(&Vector3::x());
        assert_abs_diff_eq!(normal, Vector3::y(), epsilon = 1e-6);
    }
}
