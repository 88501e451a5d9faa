//! Data-enabled predictive control: formulation and per-step solve pipeline.
//!
//! Instead of identifying a model, DeePC selects future trajectories directly
//! from the span of block-Hankel data matrices built from one offline
//! experiment. A latent combination vector `g` is optimized so the implied
//! trajectory continues the recent input/output history:
//!
//! ```text
//! standard:  min ‖Yf·g − yref‖²_Q + ‖uloss‖²_R
//!            s.t. Up·g = uini,  Yp·g = yini,  lb ≤ Hc·g ≤ ub
//!
//! robust:    min ‖Yf·g − yref‖²_Q + ‖uloss‖²_R
//!                + ‖Yp·g − yini‖²_λy + ‖g‖²_λg
//!            s.t. Up·g = uini,  lb ≤ Hc·g ≤ ub
//!
//! uloss = ‖u‖² | ‖u − us‖² | ‖Δu‖²
//! ```
//!
//! # Architecture
//!
//! 1. **Constraint assembly** — inequality rows selected from the future
//!    Hankel blocks, bounds tiled over the horizon ([`constraints`])
//! 2. **Objective assembly** — one parameterized QP per design mode × control
//!    loss; `(uini, yini)` enter the linear term and the equality right-hand
//!    side affinely, so the quadratic structure is built exactly once
//!    ([`objective`])
//! 3. **Backend facade** — compiles the assembled problem for Clarabel (pure
//!    Rust interior-point solver) once, then re-solves cheaply per control
//!    step ([`backend`], [`facade`])
//! 4. **Controller** — owns the data matrices and the facade, exposes
//!    `formulate` / `step` ([`controller`])

pub mod backend;
pub mod constraints;
pub mod controller;
pub mod facade;
pub mod objective;
pub mod types;

pub use backend::{ClarabelBackend, QpBackend, SolveOutcome};
pub use constraints::{build_inequalities, InequalityBlock};
pub use controller::DeepcController;
pub use facade::SolverFacade;
pub use objective::{formulate, AssembledProblem, EqualityBlock, EqualityRhs, LinearTerm};
pub use types::StepSolution;
