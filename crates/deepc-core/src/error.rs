use thiserror::Error;

/// Top-level error type for the DeePC toolkit.
#[derive(Debug, Error)]
pub enum DeepcError {
    #[error("Dimension error: {0}")]
    Dimension(#[from] DimensionError),

    #[error("Shape error: {0}")]
    Shape(#[from] ShapeError),

    #[error("Formulation error: {0}")]
    Formulation(#[from] FormulationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Structural size errors detected when deriving the problem dimensions.
///
/// Copy + static messages for cheap propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DimensionError {
    #[error("{name} must be positive")]
    ZeroDimension { name: &'static str },

    #[error("Hankel window length must be positive")]
    EmptyWindow,

    #[error("Hankel window length {window} exceeds data length {data_len}")]
    WindowExceedsData { window: usize, data_len: usize },

    #[error(
        "Decision dimension T - Tini - Np + 1 = {g_dim} must be positive (T={t}, Tini={tini}, Np={np})"
    )]
    EmptyDecisionSpace {
        g_dim: i64,
        t: usize,
        tini: usize,
        np: usize,
    },
}

/// A matrix or vector whose shape disagrees with the dimension table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Shape mismatch for {name}: expected {expected_rows}x{expected_cols}, got {got_rows}x{got_cols}")]
pub struct ShapeError {
    pub name: &'static str,
    pub expected_rows: usize,
    pub expected_cols: usize,
    pub got_rows: usize,
    pub got_cols: usize,
}

/// Errors raised while assembling the optimization problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FormulationError {
    #[error("Input set-point 'us' is required for the 'uus' control loss")]
    SetpointRequired,

    #[error("lambda_g and lambda_y are required for the robust design")]
    RobustWeightsRequired,

    #[error("Not enough degrees of freedom for the {mode} design: g_dim = {got} must exceed {required}")]
    InsufficientDof {
        mode: &'static str,
        required: usize,
        got: usize,
    },

    #[error("Solver not built: call formulate() before step()")]
    SolverNotBuilt,

    #[error("Failed to pseudo-invert the stacked history matrix: {0}")]
    HistoryInversion(&'static str),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Unknown constrained variable '{0}', expected 'u' or 'y'")]
    UnknownVariable(String),

    #[error("Constraint index {index} out of range for '{variable}' (dimension {dim})")]
    IndexOutOfRange {
        variable: &'static str,
        index: usize,
        dim: usize,
    },

    #[error(
        "Constraint bounds for '{variable}' do not match its index list: {indices} indices, {lower} lower, {upper} upper"
    )]
    BoundCountMismatch {
        variable: &'static str,
        indices: usize,
        lower: usize,
        upper: usize,
    },

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
