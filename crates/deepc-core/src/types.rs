use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::dims::ProblemDimensions;
use crate::error::{ConfigError, ShapeError};

// ---------------------------------------------------------------------------
// Design selection
// ---------------------------------------------------------------------------

/// Which DeePC design to formulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesignMode {
    /// Hard equality matching of both input and output history.
    Standard,
    /// Output-history matching relaxed into a penalized slack; input history
    /// stays a hard equality.
    Robust,
}

impl DesignMode {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Robust => "robust",
        }
    }
}

/// Control-effort term of the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlLoss {
    /// `||u||_R^2`: penalize the raw future inputs.
    U,
    /// `||u - us||_R^2`: penalize deviation from the input set-point.
    Uus,
    /// `||du||_R^2`: penalize consecutive control differences, seeded with
    /// the most recent historical input sample.
    Du,
}

impl ControlLoss {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::U => "u",
            Self::Uus => "uus",
            Self::Du => "du",
        }
    }
}

// ---------------------------------------------------------------------------
// TrajectoryData
// ---------------------------------------------------------------------------

/// Offline input/output trajectory data, immutable once constructed.
///
/// `ud` is `(T, u_dim)`, `yd` is `(T, y_dim)`; both series must cover the
/// same `T` samples.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryData {
    ud: DMatrix<f64>,
    yd: DMatrix<f64>,
}

impl TrajectoryData {
    pub fn new(ud: DMatrix<f64>, yd: DMatrix<f64>) -> Result<Self, ShapeError> {
        if yd.nrows() != ud.nrows() {
            return Err(ShapeError {
                name: "yd",
                expected_rows: ud.nrows(),
                expected_cols: yd.ncols(),
                got_rows: yd.nrows(),
                got_cols: yd.ncols(),
            });
        }
        Ok(Self { ud, yd })
    }

    /// Number of offline samples `T`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ud.nrows()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ud.nrows() == 0
    }

    #[must_use]
    pub const fn ud(&self) -> &DMatrix<f64> {
        &self.ud
    }

    #[must_use]
    pub const fn yd(&self) -> &DMatrix<f64> {
        &self.yd
    }
}

// ---------------------------------------------------------------------------
// WeightMatrices
// ---------------------------------------------------------------------------

/// Cost weights: output tracking `Q`, control effort `R`, and the optional
/// robust-design regularizers `lambda_g` / `lambda_y`.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightMatrices {
    pub q: DMatrix<f64>,
    pub r: DMatrix<f64>,
    pub lambda_g: Option<DMatrix<f64>>,
    pub lambda_y: Option<DMatrix<f64>>,
}

impl WeightMatrices {
    #[must_use]
    pub const fn new(q: DMatrix<f64>, r: DMatrix<f64>) -> Self {
        Self {
            q,
            r,
            lambda_g: None,
            lambda_y: None,
        }
    }

    /// Attach the robust-design regularizers.
    #[must_use]
    pub fn with_regularization(mut self, lambda_g: DMatrix<f64>, lambda_y: DMatrix<f64>) -> Self {
        self.lambda_g = Some(lambda_g);
        self.lambda_y = Some(lambda_y);
        self
    }

    /// Build diagonal `Q`/`R` from per-component weights tiled over the
    /// prediction horizon.
    ///
    /// `q_weights` has one entry per output component, `r_weights` one per
    /// input component.
    pub fn diagonal(
        dims: &ProblemDimensions,
        q_weights: &[f64],
        r_weights: &[f64],
    ) -> Result<Self, ShapeError> {
        if q_weights.len() != dims.y_dim() {
            return Err(ShapeError {
                name: "q_weights",
                expected_rows: dims.y_dim(),
                expected_cols: 1,
                got_rows: q_weights.len(),
                got_cols: 1,
            });
        }
        if r_weights.len() != dims.u_dim() {
            return Err(ShapeError {
                name: "r_weights",
                expected_rows: dims.u_dim(),
                expected_cols: 1,
                got_rows: r_weights.len(),
                got_cols: 1,
            });
        }
        let q_diag =
            DVector::from_fn(dims.future_output_rows(), |i, _| q_weights[i % q_weights.len()]);
        let r_diag =
            DVector::from_fn(dims.future_input_rows(), |i, _| r_weights[i % r_weights.len()]);
        Ok(Self::new(
            DMatrix::from_diagonal(&q_diag),
            DMatrix::from_diagonal(&r_diag),
        ))
    }
}

// ---------------------------------------------------------------------------
// ReferenceSignals
// ---------------------------------------------------------------------------

/// Set-points tiled over the prediction horizon.
///
/// `uref` exists only when an input set-point was supplied; the `uus`
/// control loss requires it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSignals {
    us: Option<DVector<f64>>,
    ys: DVector<f64>,
    uref: Option<DVector<f64>>,
    yref: DVector<f64>,
}

impl ReferenceSignals {
    #[must_use]
    pub fn new(us: Option<DVector<f64>>, ys: DVector<f64>, np: usize) -> Self {
        let uref = us.as_ref().map(|u| tile(u, np));
        let yref = tile(&ys, np);
        Self { us, ys, uref, yref }
    }

    #[must_use]
    pub const fn us(&self) -> Option<&DVector<f64>> {
        self.us.as_ref()
    }

    #[must_use]
    pub const fn ys(&self) -> &DVector<f64> {
        &self.ys
    }

    #[must_use]
    pub const fn uref(&self) -> Option<&DVector<f64>> {
        self.uref.as_ref()
    }

    #[must_use]
    pub const fn yref(&self) -> &DVector<f64> {
        &self.yref
    }
}

fn tile(v: &DVector<f64>, reps: usize) -> DVector<f64> {
    DVector::from_fn(v.len() * reps, |i, _| v[i % v.len()])
}

// ---------------------------------------------------------------------------
// ConstraintSpec
// ---------------------------------------------------------------------------

/// Which trajectory variable an inequality constraint applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstrainedVariable {
    Input,
    Output,
}

impl ConstrainedVariable {
    /// Parse the conventional short names `u` / `y`.
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name {
            "u" => Ok(Self::Input),
            "y" => Ok(Self::Output),
            other => Err(ConfigError::UnknownVariable(other.to_string())),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Input => "u",
            Self::Output => "y",
        }
    }
}

/// Per-step bounds on selected components of one trajectory variable,
/// replicated over the whole prediction horizon.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintEntry {
    pub variable: ConstrainedVariable,
    /// Component indices within one time step (0-based).
    pub indices: Vec<usize>,
    /// Lower bound per listed component.
    pub lower: Vec<f64>,
    /// Upper bound per listed component.
    pub upper: Vec<f64>,
}

/// Inequality constraint specification; empty means unconstrained.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintSpec {
    entries: Vec<ConstraintEntry>,
}

impl ConstraintSpec {
    #[must_use]
    pub const fn none() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add bounds for selected components of `variable`.
    #[must_use]
    pub fn bound(
        mut self,
        variable: ConstrainedVariable,
        indices: Vec<usize>,
        lower: Vec<f64>,
        upper: Vec<f64>,
    ) -> Self {
        self.entries.push(ConstraintEntry {
            variable,
            indices,
            lower,
            upper,
        });
        self
    }

    #[must_use]
    pub fn entries(&self) -> &[ConstraintEntry] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// SolverOptions
// ---------------------------------------------------------------------------

const fn default_max_iter() -> u32 {
    200
}
const fn default_tol() -> f64 {
    1e-8
}

/// Backend solver options, passed through without interpretation.
///
/// Defaults match the backend's own defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverOptions {
    /// Maximum solver iterations.
    #[serde(default = "default_max_iter")]
    pub max_iter: u32,

    /// Absolute duality-gap tolerance.
    #[serde(default = "default_tol")]
    pub tol_gap_abs: f64,

    /// Relative duality-gap tolerance.
    #[serde(default = "default_tol")]
    pub tol_gap_rel: f64,

    /// Feasibility tolerance.
    #[serde(default = "default_tol")]
    pub tol_feas: f64,

    /// Print solver progress.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iter: default_max_iter(),
            tol_gap_abs: default_tol(),
            tol_gap_rel: default_tol(),
            tol_feas: default_tol(),
            verbose: false,
        }
    }
}
