//! Least squares polynomial fitting for the calibration curves

use nalgebra::linalg::SVD;
use nalgebra::{DMatrix, DVector};

/// Singular values below this threshold are treated as zero by the least
/// squares solver.
const SOLVE_EPSILON: f64 = 1e-12;

/// Polynomial with coefficients stored highest degree first, the same
/// convention the persisted coefficient files use.
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    coefficients: Vec<f64>,
}

impl Polynomial {
    pub fn new(coefficients: Vec<f64>) -> Self {
        Polynomial { coefficients }
    }

    /// Coefficients, highest degree first.
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Evaluate at `x` using Horner's scheme.
    pub fn value(&self, x: f64) -> f64 {
        self.coefficients.iter().fold(0.0, |acc, &c| acc * x + c)
    }

    /// The derivative polynomial.
    pub fn derivative(&self) -> Polynomial {
        let terms = self.coefficients.len();
        if terms <= 1 {
            return Polynomial::new(vec![0.0]);
        }
        let coefficients = self.coefficients[..terms - 1]
            .iter()
            .enumerate()
            .map(|(i, &c)| c * (terms - 1 - i) as f64)
            .collect();
        Polynomial::new(coefficients)
    }
}

/// Least squares fit of a polynomial of the given degree. Coefficients come
/// back highest degree first. The system is solved through the SVD, so a
/// degenerate sample set (for example all x equal) still yields the minimum
/// norm solution instead of failing.
pub fn polyfit(x: &[f64], y: &[f64], degree: usize) -> Result<Polynomial, &'static str> {
    if x.len() != y.len() {
        return Err("x and y must have the same length");
    }
    if x.is_empty() {
        return Err("cannot fit a polynomial to an empty sample set");
    }

    let terms = degree + 1;
    // Vandermonde matrix with the highest power in the leftmost column.
    let vandermonde = DMatrix::from_fn(x.len(), terms, |row, column| {
        x[row].powi((degree - column) as i32)
    });
    let rhs = DVector::from_column_slice(y);

    let svd = SVD::new(vandermonde, true, true);
    let solution = svd.solve(&rhs, SOLVE_EPSILON)?;
    Ok(Polynomial::new(solution.iter().copied().collect()))
}

/// Evenly spaced values across an inclusive range. The endpoint is set
/// exactly rather than accumulated.
pub fn linspace(start: f64, stop: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (count - 1) as f64;
            let mut values: Vec<f64> = (0..count).map(|i| start + step * i as f64).collect();
            values[count - 1] = stop;
            values
        }
    }
}
