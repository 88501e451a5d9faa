//! Result types for the per-step solve.

use nalgebra::DVector;

/// Result of one control-step solve.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSolution {
    /// Optimal future inputs over the horizon (`Np * u_dim`).
    pub u_opt: DVector<f64>,
    /// Optimal combination vector (`g_dim`).
    pub g_opt: DVector<f64>,
    /// Whether the backend reported convergence.
    pub converged: bool,
    /// Solve time in microseconds.
    pub solve_time_us: u64,
}

impl StepSolution {
    /// The first control action to apply (`u_dim` entries).
    #[must_use]
    pub fn first_input(&self, u_dim: usize) -> DVector<f64> {
        self.u_opt.rows(0, u_dim).into_owned()
    }
}
