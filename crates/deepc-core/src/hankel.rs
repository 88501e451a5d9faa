//! Block-Hankel matrix construction from trajectory data.
//!
//! A length-`L` block-Hankel matrix of a `(T, dim)` time series exposes every
//! length-`L` sub-trajectory of the data as one column: column `s` stacks
//! rows `s..s+L-1`, each row contributing `dim` contiguous entries.

use nalgebra::DMatrix;

use crate::error::DimensionError;

/// Build a block-Hankel matrix from a `(T, dim)` series and window length `L`.
///
/// The result has shape `(dim * L, T - L + 1)`.
///
/// # Example
///
/// ```
/// use nalgebra::DMatrix;
/// use deepc_core::hankel::hankel;
///
/// let series = DMatrix::from_row_slice(4, 1, &[1.0, 2.0, 3.0, 4.0]);
/// let h = hankel(&series, 2).unwrap();
/// assert_eq!(h.shape(), (2, 3));
/// // Column 1 is the sub-trajectory starting at row 1.
/// assert_eq!(h[(0, 1)], 2.0);
/// assert_eq!(h[(1, 1)], 3.0);
/// ```
///
/// # Errors
///
/// Fails with a [`DimensionError`] when the window is empty or longer than
/// the series.
pub fn hankel(series: &DMatrix<f64>, window: usize) -> Result<DMatrix<f64>, DimensionError> {
    let data_len = series.nrows();
    let dim = series.ncols();

    if window == 0 {
        return Err(DimensionError::EmptyWindow);
    }
    if window > data_len {
        return Err(DimensionError::WindowExceedsData { window, data_len });
    }

    let cols = data_len - window + 1;
    let mut h = DMatrix::zeros(dim * window, cols);
    for s in 0..cols {
        for k in 0..window {
            for d in 0..dim {
                h[(k * dim + d, s)] = series[(s + k, d)];
            }
        }
    }
    Ok(h)
}
