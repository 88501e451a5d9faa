//! Inequality constraint assembly over the prediction horizon.
//!
//! Bounding component `v` of the future inputs means bounding row
//! `v + i * u_dim` of `Uf · g` for every horizon step `i`; likewise for
//! outputs via `Yf`. The selected rows are stacked into one matrix `Hc`
//! with per-row lower/upper bounds, so the whole block enters the solver as
//! `lb ≤ Hc · g ≤ ub`.

use nalgebra::{DMatrix, DVector};

use deepc_core::dims::{DataMatrices, ProblemDimensions};
use deepc_core::error::ConfigError;
use deepc_core::types::{ConstrainedVariable, ConstraintSpec};

/// Stacked inequality rows with parallel bound vectors. May be empty: the
/// unconstrained case is supported, not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct InequalityBlock {
    pub matrix: DMatrix<f64>,
    pub lower: DVector<f64>,
    pub upper: DVector<f64>,
}

impl InequalityBlock {
    #[must_use]
    pub fn empty(g_dim: usize) -> Self {
        Self {
            matrix: DMatrix::zeros(0, g_dim),
            lower: DVector::zeros(0),
            upper: DVector::zeros(0),
        }
    }

    /// Number of inequality rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.matrix.nrows()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matrix.nrows() == 0
    }
}

/// Assemble the inequality block for the given constraint specification.
///
/// Rows are emitted step-major: for each horizon step, the requested
/// components in listing order, with their scalar bounds repeated to match.
///
/// # Errors
///
/// Fails when a component index exceeds the variable's dimension or the
/// bound lists disagree with the index list.
pub fn build_inequalities(
    spec: &ConstraintSpec,
    dims: &ProblemDimensions,
    data: &DataMatrices,
) -> Result<InequalityBlock, ConfigError> {
    if spec.is_empty() {
        return Ok(InequalityBlock::empty(dims.g_dim()));
    }

    let total_rows: usize = spec
        .entries()
        .iter()
        .map(|e| e.indices.len() * dims.np())
        .sum();
    let mut matrix = DMatrix::zeros(total_rows, dims.g_dim());
    let mut lower = DVector::zeros(total_rows);
    let mut upper = DVector::zeros(total_rows);

    let mut row = 0;
    for entry in spec.entries() {
        let (base, dim) = match entry.variable {
            ConstrainedVariable::Input => (data.uf(), dims.u_dim()),
            ConstrainedVariable::Output => (data.yf(), dims.y_dim()),
        };

        if entry.lower.len() != entry.indices.len() || entry.upper.len() != entry.indices.len() {
            return Err(ConfigError::BoundCountMismatch {
                variable: entry.variable.name(),
                indices: entry.indices.len(),
                lower: entry.lower.len(),
                upper: entry.upper.len(),
            });
        }

        for step in 0..dims.np() {
            for (k, &component) in entry.indices.iter().enumerate() {
                if component >= dim {
                    return Err(ConfigError::IndexOutOfRange {
                        variable: entry.variable.name(),
                        index: component,
                        dim,
                    });
                }
                matrix
                    .row_mut(row)
                    .copy_from(&base.row(component + step * dim));
                lower[row] = entry.lower[k];
                upper[row] = entry.upper[k];
                row += 1;
            }
        }
    }

    Ok(InequalityBlock {
        matrix,
        lower,
        upper,
    })
}
