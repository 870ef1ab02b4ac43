use nalgebra::{Cholesky, Const, DMatrix, DVector, SMatrix, SVector};
use num::Zero;

/// Relative threshold under which singular values are treated as zero
/// when the system is rank deficient.
const SINGULAR_VALUE_EPSILON: f64 = 1e-9;

/// Implements the standard Gauss Newton optimization.
/// The normal equations are accumulated in double precision.
///
/// # Type parameters
///
/// * `DIM` - The dimension of the problem.
#[derive(Clone, Debug)]
pub struct GaussNewton<const DIM: usize> {
    hessian: SMatrix<f64, DIM, DIM>,
    gradient: SVector<f64, DIM>,
    squared_residual_sum: f64,
    count: usize,
}

impl<const DIM: usize> Default for GaussNewton<DIM> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const DIM: usize> GaussNewton<DIM> {
    /// Creates a new Gauss Newton optimizer.
    pub fn new() -> Self {
        Self {
            hessian: SMatrix::zeros(),
            gradient: SVector::zeros(),
            squared_residual_sum: 0.0,
            count: 0,
        }
    }

    /// Resets the optimizer.
    pub fn reset(&mut self) {
        self.hessian.set_zero();
        self.gradient.set_zero();
        self.squared_residual_sum = 0.0;
        self.count = 0;
    }

    /// Adds a new step to the optimizer.
    ///
    /// # Arguments
    ///
    /// * `residual` - The residual of the step.
    /// * `jacobian` - The jacobian of the step.
    pub fn step(&mut self, residual: f32, jacobian: &[f32; DIM]) {
        let residual = residual as f64;
        for i in 0..DIM {
            let ival = jacobian[i] as f64;
            self.gradient[i] += ival * residual;

            self.hessian[(i, i)] += ival * ival;
            for j in i + 1..DIM {
                let mul = ival * jacobian[j] as f64;
                self.hessian[(i, j)] += mul;
                self.hessian[(j, i)] += mul;
            }
        }

        self.squared_residual_sum += residual * residual;
        self.count += 1;
    }

    /// Solve the current gauss newton system.
    /// Uses Cholesky and falls back to the SVD pseudo-inverse when the system is
    /// singular, e.g. when the geometry doesn't constrain all degrees of freedom.
    ///
    /// # Returns
    ///
    /// The update vector, `None` if no step was added or the system has no solution.
    pub fn solve(&self) -> Option<SVector<f32, DIM>> {
        if self.count == 0 {
            return None;
        }

        let update = Cholesky::<f64, Const<DIM>>::new(self.hessian)
            .filter(|cholesky| {
                // Tiny pivots relative to the largest one mean a (nearly) singular system.
                let pivots = cholesky.l_dirty().diagonal().map(|d| d * d);
                pivots.min() > pivots.max() * SINGULAR_VALUE_EPSILON
            })
            .map(|cholesky| cholesky.solve(&self.gradient))
            .filter(|update| update.iter().all(|v| v.is_finite()))
            .or_else(|| self.solve_pseudo_inverse())?;

        Some(nalgebra::convert(update))
    }

    fn solve_pseudo_inverse(&self) -> Option<SVector<f64, DIM>> {
        let hessian = DMatrix::from_column_slice(DIM, DIM, self.hessian.as_slice());
        let gradient = DVector::from_column_slice(self.gradient.as_slice());
        let svd = hessian.svd(true, true);
        let eps = svd.singular_values.max() * SINGULAR_VALUE_EPSILON;
        let update = svd.solve(&gradient, eps).ok()?;

        if update.iter().all(|v| v.is_finite()) {
            Some(SVector::<f64, DIM>::from_column_slice(update.as_slice()))
        } else {
            None
        }
    }

    /// Adds the values of another optimizer to this one.
    /// Use this to combine the state of sub optimizers.
    ///
    /// # Arguments
    ///
    /// * `other` - The other optimizer.
    pub fn add(&mut self, other: &Self) {
        self.hessian += other.hessian;
        self.gradient += other.gradient;
        self.squared_residual_sum += other.squared_residual_sum;
        self.count += other.count;
    }

    /// Number of residuals added since the last reset.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Returns the mean squared residual, `None` if no residual was added.
    pub fn mean_squared_residual(&self) -> Option<f32> {
        if self.count == 0 {
            None
        } else {
            Some((self.squared_residual_sum / self.count as f64) as f32)
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use nalgebra::Vector3;
    use nshare::ToNalgebra;

    use super::GaussNewton;

    #[test]
    fn test_gauss_newton() {
        use ndarray::array;

        let mut gn = GaussNewton::<6>::new();

        gn.step(1.0, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        gn.step(2.0, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        gn.step(3.0, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let expected_hessian = array![
            [3.0, 6.0, 9.0, 12.0, 15.0, 18.0],
            [6.0, 12.0, 18.0, 24.0, 30.0, 36.0],
            [9.0, 18.0, 27.0, 36.0, 45.0, 54.0],
            [12.0, 24.0, 36.0, 48.0, 60.0, 72.0],
            [15.0, 30.0, 45.0, 60.0, 75.0, 90.0],
            [18.0, 36.0, 54.0, 72.0, 90.0, 108.0],
        ]
        .into_nalgebra();
        assert_eq!(gn.hessian, expected_hessian);

        let expected_gradient = array![6.0, 12.0, 18.0, 24.0, 30.0, 36.0].into_nalgebra();
        assert_eq!(gn.gradient, expected_gradient);
        assert_eq!(gn.count(), 3);
        assert_abs_diff_eq!(gn.mean_squared_residual().unwrap(), 14.0 / 3.0, epsilon = 1e-6);
    }

    #[test]
    fn should_solve_linear_least_squares() {
        // Fits y = 2 x0 - x1 + 0.5 x2.
        let samples = [
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [2.0, -1.0, 0.5],
        ];
        let mut gn = GaussNewton::<3>::new();
        for sample in samples.iter() {
            let y = 2.0 * sample[0] - sample[1] + 0.5 * sample[2];
            gn.step(y, sample);
        }

        let solution = gn.solve().unwrap();
        assert_abs_diff_eq!(solution, Vector3::new(2.0, -1.0, 0.5), epsilon = 1e-5);
    }

    #[test]
    fn should_fall_back_to_pseudo_inverse() {
        // Only the first unknown is observed.
        let mut gn = GaussNewton::<3>::new();
        gn.step(2.0, &[1.0, 0.0, 0.0]);
        gn.step(4.0, &[2.0, 0.0, 0.0]);

        let solution = gn.solve().unwrap();
        assert_abs_diff_eq!(solution, Vector3::new(2.0, 0.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn should_merge_partial_systems() {
        let mut first = GaussNewton::<2>::new();
        let mut second = GaussNewton::<2>::new();
        let mut all = GaussNewton::<2>::new();

        first.step(1.0, &[1.0, 2.0]);
        all.step(1.0, &[1.0, 2.0]);
        second.step(-3.0, &[0.5, 1.0]);
        all.step(-3.0, &[0.5, 1.0]);

        first.add(&second);
        assert_eq!(first.hessian, all.hessian);
        assert_eq!(first.gradient, all.gradient);
        assert_eq!(first.count(), 2);

        first.reset();
        assert_eq!(first.count(), 0);
        assert_eq!(first.mean_squared_residual(), None);
        assert_eq!(first.solve(), None);
    }
}
