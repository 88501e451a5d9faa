//! Build-once / solve-many facade over the QP backend.
//!
//! Building compiles the assembled problem and precomputes the minimum-norm
//! history map; both costs are paid once per formulation. Each step then
//! computes the initial guess, invokes the backend with the current history,
//! and extracts the future input trajectory.

use std::time::Instant;

use nalgebra::{DMatrix, DVector};

use deepc_core::dims::{DataMatrices, ProblemDimensions, RANK_EPS};
use deepc_core::error::{DeepcError, FormulationError};
use deepc_core::types::SolverOptions;

use crate::backend::QpBackend;
use crate::objective::AssembledProblem;
use crate::types::StepSolution;

/// Reusable per-formulation solver state.
pub struct SolverFacade<B: QpBackend> {
    backend: B,
    handle: B::Handle,
    dims: ProblemDimensions,
    /// `Uf`, for recovering the future inputs from the solved `g`.
    future_inputs: DMatrix<f64>,
    /// Pseudo-inverse of `[Up; Yp]`; maps a history pair to the minimum-norm
    /// `g` that exactly reproduces it. Used as the solve initial guess even
    /// in the robust design, where output matching is only penalized.
    history_pinv: DMatrix<f64>,
}

impl<B: QpBackend> SolverFacade<B> {
    /// Compile the assembled problem into a reusable solver.
    pub fn build(
        backend: B,
        problem: &AssembledProblem,
        data: &DataMatrices,
        options: &SolverOptions,
    ) -> Result<Self, DeepcError> {
        let handle = backend.build(problem, options)?;
        let dims = problem.dims;

        let rows = dims.past_input_rows() + dims.past_output_rows();
        let mut stacked = DMatrix::zeros(rows, dims.g_dim());
        stacked
            .rows_mut(0, dims.past_input_rows())
            .copy_from(data.up());
        stacked
            .rows_mut(dims.past_input_rows(), dims.past_output_rows())
            .copy_from(data.yp());
        let history_pinv = stacked
            .pseudo_inverse(RANK_EPS)
            .map_err(FormulationError::HistoryInversion)?;

        Ok(Self {
            backend,
            handle,
            dims,
            future_inputs: data.uf().clone(),
            history_pinv,
        })
    }

    /// Solve one control step for the given rolling history.
    ///
    /// Returns the optimal future inputs `u_opt = Uf · g_opt`, the raw
    /// decision vector, the backend's convergence flag, and the wall-clock
    /// solve time.
    pub fn solve_step(
        &mut self,
        uini: &DVector<f64>,
        yini: &DVector<f64>,
    ) -> Result<StepSolution, DeepcError> {
        self.dims.validate_history(uini, yini)?;

        let mut history = DVector::zeros(uini.len() + yini.len());
        history.rows_mut(0, uini.len()).copy_from(uini);
        history.rows_mut(uini.len(), yini.len()).copy_from(yini);
        let initial_guess = &self.history_pinv * &history;

        let start = Instant::now();
        let outcome = self
            .backend
            .solve(&mut self.handle, &initial_guess, uini, yini);
        let elapsed = start.elapsed();

        let u_opt = &self.future_inputs * &outcome.g;
        Ok(StepSolution {
            u_opt,
            g_opt: outcome.g,
            converged: outcome.converged,
            solve_time_us: u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
        })
    }

    #[must_use]
    pub const fn dims(&self) -> &ProblemDimensions {
        &self.dims
    }
}
