//! Conversion of flow matrices into trip probabilities.
use crate::matrix::Matrix;
use ndarray::Zip;

/// Scale each row of a flow matrix so that it sums to one.
///
/// Entry `[i, j]` of the result is the probability that a trip from origin `i` ends at destination
/// `j`. Rows whose total is not positive are passed through unchanged, so an origin with no flow
/// gets a row of zeros rather than NaNs.
pub fn normalise_rows(flows: &Matrix) -> Matrix {
    let mut probabilities = flows.clone();
    Zip::from(probabilities.rows_mut()).par_for_each(|mut row| {
        let total = row.sum();
        if total > 0.0 {
            row /= total;
        }
    });

    probabilities
}
