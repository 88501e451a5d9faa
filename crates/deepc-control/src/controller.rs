//! Controller orchestration: construction, one-time formulation, per-step
//! solves.
//!
//! The controller owns the immutable problem description (dimensions, data
//! matrices, weights, references, constraints) and at most one compiled
//! solver. `formulate` is the explicit, expensive step; `step` is the cheap
//! repeated one, driven by rolling history buffers owned by the surrounding
//! control loop.

use log::debug;
use nalgebra::DVector;

use deepc_core::config::DeepcConfig;
use deepc_core::dims::{DataMatrices, ExcitationReport, ProblemDimensions};
use deepc_core::error::{DeepcError, FormulationError};
use deepc_core::types::{
    ConstraintSpec, ControlLoss, DesignMode, ReferenceSignals, SolverOptions, TrajectoryData,
    WeightMatrices,
};

use crate::backend::{ClarabelBackend, QpBackend};
use crate::facade::SolverFacade;
use crate::objective::formulate;
use crate::types::StepSolution;

/// Data-enabled predictive controller.
pub struct DeepcController<B: QpBackend = ClarabelBackend> {
    backend: B,
    dims: ProblemDimensions,
    data: DataMatrices,
    weights: WeightMatrices,
    references: ReferenceSignals,
    constraints: ConstraintSpec,
    design: Option<(DesignMode, ControlLoss)>,
    facade: Option<SolverFacade<B>>,
}

impl<B: QpBackend> std::fmt::Debug for DeepcController<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeepcController").finish_non_exhaustive()
    }
}

impl DeepcController<ClarabelBackend> {
    /// Build a controller from the validated problem description, using the
    /// default Clarabel backend.
    pub fn new(
        dims: ProblemDimensions,
        trajectory: &TrajectoryData,
        weights: WeightMatrices,
        references: ReferenceSignals,
        constraints: ConstraintSpec,
    ) -> Result<Self, DeepcError> {
        Self::with_backend(
            ClarabelBackend,
            dims,
            trajectory,
            weights,
            references,
            constraints,
        )
    }

    /// Build a controller from a TOML configuration and offline data.
    ///
    /// Only the problem description is consumed here; the config's design
    /// and solver sections are applied by [`Self::formulate_from_config`].
    pub fn from_config(
        config: &DeepcConfig,
        trajectory: &TrajectoryData,
    ) -> Result<Self, DeepcError> {
        let dims = config.dimensions()?;
        let weights = config.weight_matrices(&dims);
        let references = config.references(&dims);
        let constraints = config.constraint_spec()?;
        Self::new(dims, trajectory, weights, references, constraints)
    }
}

impl<B: QpBackend + Clone> DeepcController<B> {
    /// Build a controller around a specific backend.
    ///
    /// Every structural matrix is shape-checked here; persistent-excitation
    /// deficiencies are logged but not fatal.
    pub fn with_backend(
        backend: B,
        dims: ProblemDimensions,
        trajectory: &TrajectoryData,
        weights: WeightMatrices,
        references: ReferenceSignals,
        constraints: ConstraintSpec,
    ) -> Result<Self, DeepcError> {
        let data = DataMatrices::new(&dims, trajectory)?;
        dims.validate_weights(&weights)?;
        dims.validate_references(&references)?;
        Ok(Self {
            backend,
            dims,
            data,
            weights,
            references,
            constraints,
            design: None,
            facade: None,
        })
    }

    /// Assemble the optimization problem and compile the solver.
    ///
    /// Expensive; meant to be called once per (mode, loss) selection.
    /// Calling it again replaces the compiled solver.
    pub fn formulate(
        &mut self,
        mode: DesignMode,
        loss: ControlLoss,
        options: &SolverOptions,
    ) -> Result<(), DeepcError> {
        debug!(
            "formulating {} design with '{}' control loss",
            mode.name(),
            loss.name()
        );
        let problem = formulate(
            mode,
            loss,
            &self.dims,
            &self.data,
            &self.weights,
            &self.references,
            &self.constraints,
        )?;
        let facade = SolverFacade::build(self.backend.clone(), &problem, &self.data, options)?;
        self.design = Some((mode, loss));
        self.facade = Some(facade);
        Ok(())
    }

    /// Formulate using the design and solver sections of a configuration.
    pub fn formulate_from_config(&mut self, config: &DeepcConfig) -> Result<(), DeepcError> {
        self.formulate(config.design.mode, config.design.uloss, &config.solver)
    }

    /// Solve one control step for the current rolling history.
    ///
    /// # Errors
    ///
    /// Fails with [`FormulationError::SolverNotBuilt`] before `formulate`,
    /// or with a shape error when the history lengths are wrong. Backend
    /// non-convergence is not an error; see [`StepSolution::converged`].
    pub fn step(
        &mut self,
        uini: &DVector<f64>,
        yini: &DVector<f64>,
    ) -> Result<StepSolution, DeepcError> {
        let facade = self
            .facade
            .as_mut()
            .ok_or(FormulationError::SolverNotBuilt)?;
        facade.solve_step(uini, yini)
    }

    #[must_use]
    pub const fn dims(&self) -> &ProblemDimensions {
        &self.dims
    }

    #[must_use]
    pub const fn data(&self) -> &DataMatrices {
        &self.data
    }

    #[must_use]
    pub const fn excitation(&self) -> &ExcitationReport {
        self.data.excitation()
    }

    /// The formulated design, if any.
    #[must_use]
    pub const fn design(&self) -> Option<(DesignMode, ControlLoss)> {
        self.design
    }
}
