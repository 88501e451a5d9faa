//! Problem dimensions and the sliced Hankel data matrices.
//!
//! [`ProblemDimensions`] fixes the size algebra once: every structural matrix
//! has a shape determined by `(u_dim, y_dim, T, Tini, Np)`:
//!
//! ```text
//! Up, Yp         (dim * Tini, g_dim)      g_dim = T - Tini - Np + 1
//! Uf, Yf         (dim * Np,   g_dim)
//! uref, yref     (dim * Np,   1)
//! Q, R           (dim * Np) square
//! lambda_g       (g_dim, g_dim)
//! lambda_y       (y_dim * Tini) square
//! ```
//!
//! [`DataMatrices`] builds the two block-Hankel matrices from offline data,
//! splits them into past/future blocks, and evaluates the persistent
//! excitation condition (non-fatal: logged and kept queryable).

use log::warn;
use nalgebra::{DMatrix, DVector};

use crate::error::{DeepcError, DimensionError, ShapeError};
use crate::hankel::hankel;
use crate::types::{ReferenceSignals, TrajectoryData, WeightMatrices};

/// Singular values below this threshold are treated as zero in rank and
/// pseudo-inverse computations.
pub const RANK_EPS: f64 = 1e-9;

// ---------------------------------------------------------------------------
// ProblemDimensions
// ---------------------------------------------------------------------------

/// Validated size relationships of one DeePC problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProblemDimensions {
    u_dim: usize,
    y_dim: usize,
    t: usize,
    tini: usize,
    np: usize,
    g_dim: usize,
}

impl ProblemDimensions {
    /// Derive and validate the dimensions.
    ///
    /// # Errors
    ///
    /// Every field must be positive and `g_dim = T - Tini - Np + 1` must be a
    /// positive integer; violations are fatal.
    pub fn new(
        u_dim: usize,
        y_dim: usize,
        t: usize,
        tini: usize,
        np: usize,
    ) -> Result<Self, DimensionError> {
        for (name, value) in [
            ("u_dim", u_dim),
            ("y_dim", y_dim),
            ("T", t),
            ("Tini", tini),
            ("Np", np),
        ] {
            if value == 0 {
                return Err(DimensionError::ZeroDimension { name });
            }
        }

        let g_dim = t as i64 - tini as i64 - np as i64 + 1;
        if g_dim <= 0 {
            return Err(DimensionError::EmptyDecisionSpace {
                g_dim,
                t,
                tini,
                np,
            });
        }

        Ok(Self {
            u_dim,
            y_dim,
            t,
            tini,
            np,
            g_dim: g_dim as usize,
        })
    }

    #[must_use]
    pub const fn u_dim(&self) -> usize {
        self.u_dim
    }

    #[must_use]
    pub const fn y_dim(&self) -> usize {
        self.y_dim
    }

    #[must_use]
    pub const fn t(&self) -> usize {
        self.t
    }

    #[must_use]
    pub const fn tini(&self) -> usize {
        self.tini
    }

    #[must_use]
    pub const fn np(&self) -> usize {
        self.np
    }

    /// Decision-vector dimension `g_dim = T - Tini - Np + 1`.
    #[must_use]
    pub const fn g_dim(&self) -> usize {
        self.g_dim
    }

    /// Hankel window length `L = Tini + Np`.
    #[must_use]
    pub const fn window(&self) -> usize {
        self.tini + self.np
    }

    #[must_use]
    pub const fn past_input_rows(&self) -> usize {
        self.u_dim * self.tini
    }

    #[must_use]
    pub const fn future_input_rows(&self) -> usize {
        self.u_dim * self.np
    }

    #[must_use]
    pub const fn past_output_rows(&self) -> usize {
        self.y_dim * self.tini
    }

    #[must_use]
    pub const fn future_output_rows(&self) -> usize {
        self.y_dim * self.np
    }

    /// Check the weight matrices against the shape table.
    pub fn validate_weights(&self, weights: &WeightMatrices) -> Result<(), ShapeError> {
        check_shape(
            "Q",
            &weights.q,
            self.future_output_rows(),
            self.future_output_rows(),
        )?;
        check_shape(
            "R",
            &weights.r,
            self.future_input_rows(),
            self.future_input_rows(),
        )?;
        if let Some(lambda_g) = &weights.lambda_g {
            check_shape("lambda_g", lambda_g, self.g_dim, self.g_dim)?;
        }
        if let Some(lambda_y) = &weights.lambda_y {
            check_shape(
                "lambda_y",
                lambda_y,
                self.past_output_rows(),
                self.past_output_rows(),
            )?;
        }
        Ok(())
    }

    /// Check the tiled reference vectors against the shape table.
    pub fn validate_references(&self, references: &ReferenceSignals) -> Result<(), ShapeError> {
        check_len("yref", references.yref(), self.future_output_rows())?;
        if let Some(uref) = references.uref() {
            check_len("uref", uref, self.future_input_rows())?;
        }
        Ok(())
    }

    /// Check a pair of rolling history vectors supplied to a solve step.
    pub fn validate_history(
        &self,
        uini: &DVector<f64>,
        yini: &DVector<f64>,
    ) -> Result<(), ShapeError> {
        check_len("uini", uini, self.past_input_rows())?;
        check_len("yini", yini, self.past_output_rows())
    }
}

fn check_shape(
    name: &'static str,
    m: &DMatrix<f64>,
    rows: usize,
    cols: usize,
) -> Result<(), ShapeError> {
    if m.nrows() != rows || m.ncols() != cols {
        return Err(ShapeError {
            name,
            expected_rows: rows,
            expected_cols: cols,
            got_rows: m.nrows(),
            got_cols: m.ncols(),
        });
    }
    Ok(())
}

fn check_len(name: &'static str, v: &DVector<f64>, len: usize) -> Result<(), ShapeError> {
    if v.len() != len {
        return Err(ShapeError {
            name,
            expected_rows: len,
            expected_cols: 1,
            got_rows: v.len(),
            got_cols: 1,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ExcitationReport
// ---------------------------------------------------------------------------

/// Persistent-excitation diagnostics for the offline input data.
///
/// The condition requires at least `u_dim * (Tini + Np)` Hankel columns and
/// full row rank of the input Hankel matrix. Failure does not prevent
/// formulation; it signals that the data may not be informative enough and
/// shows up at solve time as infeasibility or poor conditioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExcitationReport {
    /// Required row rank `u_dim * (Tini + Np)`.
    pub required: usize,
    /// Available Hankel columns (`g_dim`).
    pub columns: usize,
    /// Numerical rank of the input Hankel matrix.
    pub input_hankel_rank: usize,
}

impl ExcitationReport {
    fn evaluate(dims: &ProblemDimensions, input_hankel: &DMatrix<f64>) -> Self {
        Self {
            required: dims.u_dim() * dims.window(),
            columns: dims.g_dim(),
            input_hankel_rank: input_hankel.clone().rank(RANK_EPS),
        }
    }

    #[must_use]
    pub const fn depth_ok(&self) -> bool {
        self.columns >= self.required
    }

    #[must_use]
    pub const fn rank_ok(&self) -> bool {
        self.input_hankel_rank == self.required
    }

    #[must_use]
    pub const fn is_satisfied(&self) -> bool {
        self.depth_ok() && self.rank_ok()
    }
}

// ---------------------------------------------------------------------------
// DataMatrices
// ---------------------------------------------------------------------------

/// Past/future Hankel blocks sliced from the offline data, immutable after
/// construction.
#[derive(Debug, Clone, PartialEq)]
pub struct DataMatrices {
    up: DMatrix<f64>,
    uf: DMatrix<f64>,
    yp: DMatrix<f64>,
    yf: DMatrix<f64>,
    excitation: ExcitationReport,
}

impl DataMatrices {
    /// Build both Hankel matrices and slice them into `Up/Uf/Yp/Yf`.
    ///
    /// # Errors
    ///
    /// Fails when `ud`/`yd` disagree with the dimension table. The persistent
    /// excitation condition is checked but only warned about.
    pub fn new(dims: &ProblemDimensions, data: &TrajectoryData) -> Result<Self, DeepcError> {
        check_shape("ud", data.ud(), dims.t(), dims.u_dim())?;
        check_shape("yd", data.yd(), dims.t(), dims.y_dim())?;

        let hud = hankel(data.ud(), dims.window())?;
        let hyd = hankel(data.yd(), dims.window())?;

        let up = hud.rows(0, dims.past_input_rows()).into_owned();
        let uf = hud
            .rows(dims.past_input_rows(), dims.future_input_rows())
            .into_owned();
        let yp = hyd.rows(0, dims.past_output_rows()).into_owned();
        let yf = hyd
            .rows(dims.past_output_rows(), dims.future_output_rows())
            .into_owned();

        let excitation = ExcitationReport::evaluate(dims, &hud);
        if !excitation.depth_ok() {
            warn!(
                "persistent excitation condition not met: g_dim = {} < u_dim * (Tini + Np) = {}",
                excitation.columns, excitation.required
            );
        }
        if !excitation.rank_ok() {
            warn!(
                "input Hankel matrix is rank deficient: rank {} < required {}",
                excitation.input_hankel_rank, excitation.required
            );
        }

        Ok(Self {
            up,
            uf,
            yp,
            yf,
            excitation,
        })
    }

    #[must_use]
    pub const fn up(&self) -> &DMatrix<f64> {
        &self.up
    }

    #[must_use]
    pub const fn uf(&self) -> &DMatrix<f64> {
        &self.uf
    }

    #[must_use]
    pub const fn yp(&self) -> &DMatrix<f64> {
        &self.yp
    }

    #[must_use]
    pub const fn yf(&self) -> &DMatrix<f64> {
        &self.yf
    }

    #[must_use]
    pub const fn excitation(&self) -> &ExcitationReport {
        &self.excitation
    }
}
