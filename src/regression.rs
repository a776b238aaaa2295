//! Curve fitting for the GAP pipeline
//!
//! Ordinary least-squares polynomial fitting, natural cubic smoothing
//! splines and in-sample R² scoring. Everything here is deterministic pure
//! math over slices; orchestration against the activity cache lives in
//! [`crate::gap`].

use nalgebra::{DMatrix, DVector};
use std::cmp::Ordering;

use crate::error::{CalculationError, Result};

/// Numerical zero for variance/residual comparisons
const EPS: f64 = 1e-12;

/// Polynomial with coefficients in ascending degree order
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    coefficients: Vec<f64>,
}

impl Polynomial {
    pub fn degree(&self) -> usize {
        self.coefficients.len() - 1
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Evaluate by Horner's scheme
    pub fn evaluate(&self, x: f64) -> f64 {
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, &c| acc * x + c)
    }
}

/// Ordinary least-squares polynomial fit of the chosen degree.
///
/// Solves the Vandermonde system by SVD; closed-form and deterministic for
/// identical inputs. Needs at least `degree + 1` samples.
pub fn fit_polynomial(x: &[f64], y: &[f64], degree: usize) -> Result<Polynomial> {
    check_lengths("polynomial fit", x, y)?;
    if x.len() < degree + 1 {
        return Err(CalculationError::InsufficientData {
            calculation: "polynomial fit".to_string(),
            reason: format!("{} samples for degree {}", x.len(), degree),
        }
        .into());
    }

    let vandermonde = DMatrix::from_fn(x.len(), degree + 1, |i, j| x[i].powi(j as i32));
    let rhs = DVector::from_column_slice(y);
    let solution = vandermonde
        .svd(true, true)
        .solve(&rhs, EPS)
        .map_err(|_| CalculationError::SingularSystem {
            calculation: "polynomial fit".to_string(),
        })?;

    Ok(Polynomial {
        coefficients: solution.iter().copied().collect(),
    })
}

/// Natural cubic smoothing spline over strictly increasing knots
///
/// Minimizes the residual sum of squares plus `smoothing` times the
/// integrated squared second derivative; a smoothing factor of zero yields
/// the interpolating natural cubic spline. Evaluation extrapolates linearly
/// beyond the knot range, as a natural spline does.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothingSpline {
    knots: Vec<f64>,
    values: Vec<f64>,
    // second derivatives at the knots; zero at both ends
    second_derivatives: Vec<f64>,
}

impl SmoothingSpline {
    pub fn knot_count(&self) -> usize {
        self.knots.len()
    }

    pub fn evaluate(&self, t: f64) -> f64 {
        let x = &self.knots;
        let a = &self.values;
        let m = &self.second_derivatives;
        let n = x.len();

        if t <= x[0] {
            return a[0] + self.end_slope(0) * (t - x[0]);
        }
        if t >= x[n - 1] {
            return a[n - 1] + self.end_slope(n - 1) * (t - x[n - 1]);
        }

        let i = x.partition_point(|&xi| xi <= t) - 1;
        let h = x[i + 1] - x[i];
        let below = x[i + 1] - t;
        let above = t - x[i];
        m[i] * below.powi(3) / (6.0 * h)
            + m[i + 1] * above.powi(3) / (6.0 * h)
            + (a[i] / h - m[i] * h / 6.0) * below
            + (a[i + 1] / h - m[i + 1] * h / 6.0) * above
    }

    fn end_slope(&self, i: usize) -> f64 {
        let x = &self.knots;
        let a = &self.values;
        let m = &self.second_derivatives;
        let n = x.len();
        if i == 0 {
            let h = x[1] - x[0];
            (a[1] - a[0]) / h - h * (2.0 * m[0] + m[1]) / 6.0
        } else {
            let h = x[n - 1] - x[n - 2];
            (a[n - 1] - a[n - 2]) / h + h * (2.0 * m[n - 1] + m[n - 2]) / 6.0
        }
    }
}

/// Fit a natural cubic smoothing spline (Green & Silverman formulation).
///
/// The abscissae must be strictly increasing: duplicates fail loudly with
/// [`CalculationError::DuplicateAbscissa`] rather than producing a silently
/// wrong curve; [`sort_dedup_by_abscissa`] is the supported mitigation.
pub fn fit_spline(x: &[f64], y: &[f64], smoothing: f64) -> Result<SmoothingSpline> {
    check_lengths("spline fit", x, y)?;
    let n = x.len();
    if n < 3 {
        return Err(CalculationError::InsufficientData {
            calculation: "spline fit".to_string(),
            reason: format!("{n} knots, need at least 3"),
        }
        .into());
    }
    if !(smoothing >= 0.0) {
        return Err(CalculationError::InvalidParameter {
            calculation: "spline fit".to_string(),
            parameter: "smoothing".to_string(),
            value: smoothing.to_string(),
        }
        .into());
    }
    for window in x.windows(2) {
        match window[0].partial_cmp(&window[1]) {
            Some(Ordering::Less) => {}
            Some(Ordering::Equal) => {
                return Err(CalculationError::DuplicateAbscissa { value: window[0] }.into())
            }
            _ => {
                return Err(CalculationError::InvalidParameter {
                    calculation: "spline fit".to_string(),
                    parameter: "x".to_string(),
                    value: "not strictly increasing".to_string(),
                }
                .into())
            }
        }
    }

    let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();

    // Q^T maps knot values to scaled second differences; R is the Gram
    // matrix of the curvature penalty (both from the natural-spline basis)
    let qt = DMatrix::from_fn(n - 2, n, |i, j| {
        if j == i {
            1.0 / h[i]
        } else if j == i + 1 {
            -(1.0 / h[i] + 1.0 / h[i + 1])
        } else if j == i + 2 {
            1.0 / h[i + 1]
        } else {
            0.0
        }
    });
    let r = DMatrix::from_fn(n - 2, n - 2, |i, j| {
        if j == i {
            (h[i] + h[i + 1]) / 3.0
        } else if j + 1 == i || i + 1 == j {
            h[i.max(j)] / 6.0
        } else {
            0.0
        }
    });
    let r_lu = r.lu();
    let singular = || CalculationError::SingularSystem {
        calculation: "spline fit".to_string(),
    };

    let yvec = DVector::from_column_slice(y);
    let fitted = if smoothing == 0.0 {
        // interpolating spline: fitted values are the data themselves
        yvec.clone()
    } else {
        // solve (I + λ Q R⁻¹ Qᵀ) a = y
        let r_inv_qt = r_lu.solve(&qt).ok_or_else(singular)?;
        let roughness = qt.transpose() * r_inv_qt;
        let system = DMatrix::identity(n, n) + roughness * smoothing;
        system.lu().solve(&yvec).ok_or_else(singular)?
    };

    // second derivatives at the interior knots: R γ = Qᵀ a
    let gamma = r_lu.solve(&(&qt * &fitted)).ok_or_else(singular)?;
    let mut second_derivatives = vec![0.0; n];
    second_derivatives[1..n - 1].copy_from_slice(gamma.as_slice());

    Ok(SmoothingSpline {
        knots: x.to_vec(),
        values: fitted.iter().copied().collect(),
        second_derivatives,
    })
}

/// Sort samples by abscissa and keep exactly one ordinate per distinct
/// abscissa, the first occurrence under the input order.
///
/// Duplicate handling mirrors the upstream analysis this pipeline reproduces;
/// averaging the duplicate ordinates is the likely better semantics and this
/// helper is the single place to change it.
pub fn sort_dedup_by_abscissa(x: &[f64], y: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut order: Vec<usize> = (0..x.len()).collect();
    // stable sort keeps the earliest original index first among equal x
    order.sort_by(|&a, &b| x[a].partial_cmp(&x[b]).unwrap_or(Ordering::Equal));

    let mut out_x = Vec::with_capacity(x.len());
    let mut out_y = Vec::with_capacity(y.len());
    for &i in &order {
        if out_x.last() != Some(&x[i]) {
            out_x.push(x[i]);
            out_y.push(y[i]);
        }
    }
    (out_x, out_y)
}

/// In-sample coefficient of determination.
///
/// Convention for zero-variance targets: when the total sum of squares is
/// numerically zero, R² is 1.0 if the residuals are also numerically zero
/// (a constant predictor matching a constant target is a perfect fit) and
/// 0.0 otherwise.
pub fn r_squared(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    check_lengths("r_squared", y_true, y_pred)?;
    if y_true.is_empty() {
        return Err(CalculationError::InsufficientData {
            calculation: "r_squared".to_string(),
            reason: "empty sample set".to_string(),
        }
        .into());
    }

    let mean = y_true.iter().sum::<f64>() / y_true.len() as f64;
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p) * (t - p))
        .sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean) * (t - mean)).sum();

    if ss_tot <= EPS {
        return Ok(if ss_res <= EPS { 1.0 } else { 0.0 });
    }
    Ok(1.0 - ss_res / ss_tot)
}

fn check_lengths(calculation: &str, left: &[f64], right: &[f64]) -> Result<()> {
    if left.len() != right.len() {
        return Err(CalculationError::LengthMismatch {
            calculation: calculation.to_string(),
            left: left.len(),
            right: right.len(),
        }
        .into());
    }
    Ok(())
}
