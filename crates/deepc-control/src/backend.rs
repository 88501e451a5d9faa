//! Opaque optimization backend behind a narrow interface.
//!
//! The formulation layer produces an [`AssembledProblem`]; a [`QpBackend`]
//! compiles it once into a reusable handle and re-solves it with fresh
//! history parameters every control step. Swapping the backend touches
//! nothing in the formulation logic.
//!
//! The default backend is Clarabel (pure Rust interior-point solver). The
//! problem maps onto its conic form as
//!
//! ```text
//! min 1/2 gᵀ P g + qᵀ g   s.t.  A g + s = b,  s ∈ K
//! ```
//!
//! with the equality rows in a `ZeroCone` and the two-sided inequalities
//! `lb ≤ Hc g ≤ ub` encoded as `[Hc; −Hc] g ≤ [ub; −lb]` in a
//! `NonnegativeCone`. `P`, `A`, the cones, and the settings are fixed per
//! formulation; only `q` and `b` change between solves.

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettings, DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus,
    SupportedConeT::{self, NonnegativeConeT, ZeroConeT},
};
use nalgebra::{DMatrix, DVector};

use deepc_core::error::DeepcError;
use deepc_core::types::SolverOptions;

use crate::objective::{AssembledProblem, EqualityRhs, LinearTerm};

/// Raw backend result: the decision vector and a convergence flag.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome {
    pub g: DVector<f64>,
    pub converged: bool,
}

/// Narrow interface to the numerical optimization engine.
///
/// `build` is expected to be expensive (it compiles the problem structure)
/// and is amortized over many `solve` calls. `initial_guess` is advisory:
/// backends without warm starting are free to ignore it. Non-convergence is
/// not an error; it is reported through [`SolveOutcome::converged`] and left
/// to the caller to interpret.
pub trait QpBackend {
    type Handle;

    fn build(
        &self,
        problem: &AssembledProblem,
        options: &SolverOptions,
    ) -> Result<Self::Handle, DeepcError>;

    fn solve(
        &self,
        handle: &mut Self::Handle,
        initial_guess: &DVector<f64>,
        uini: &DVector<f64>,
        yini: &DVector<f64>,
    ) -> SolveOutcome;
}

/// Clarabel-backed QP solver.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClarabelBackend;

/// Compiled problem structure reused across solves.
pub struct ClarabelHandle {
    p_csc: CscMatrix<f64>,
    a_csc: CscMatrix<f64>,
    cones: Vec<SupportedConeT<f64>>,
    settings: DefaultSettings<f64>,
    linear: LinearTerm,
    eq_rhs: EqualityRhs,
    n_eq: usize,
    ineq_lower: DVector<f64>,
    ineq_upper: DVector<f64>,
    g_dim: usize,
}

impl QpBackend for ClarabelBackend {
    type Handle = ClarabelHandle;

    fn build(
        &self,
        problem: &AssembledProblem,
        options: &SolverOptions,
    ) -> Result<Self::Handle, DeepcError> {
        let g_dim = problem.dims.g_dim();
        let n_eq = problem.equality.len();
        let n_ineq = problem.inequality.len();

        // Equalities first, then both one-sided halves of each inequality.
        let mut a = DMatrix::zeros(n_eq + 2 * n_ineq, g_dim);
        a.rows_mut(0, n_eq).copy_from(&problem.equality.matrix);
        a.rows_mut(n_eq, n_ineq).copy_from(&problem.inequality.matrix);
        a.rows_mut(n_eq + n_ineq, n_ineq)
            .copy_from(&(-&problem.inequality.matrix));

        let mut cones = Vec::new();
        if n_eq > 0 {
            cones.push(ZeroConeT(n_eq));
        }
        if n_ineq > 0 {
            cones.push(NonnegativeConeT(2 * n_ineq));
        }

        let settings = DefaultSettingsBuilder::default()
            .max_iter(options.max_iter)
            .verbose(options.verbose)
            .tol_gap_abs(options.tol_gap_abs)
            .tol_gap_rel(options.tol_gap_rel)
            .tol_feas(options.tol_feas)
            .build()
            .expect("valid solver settings");

        Ok(ClarabelHandle {
            p_csc: dmatrix_to_csc_upper_tri(&problem.hessian),
            a_csc: dmatrix_to_csc(&a),
            cones,
            settings,
            linear: problem.linear.clone(),
            eq_rhs: problem.equality.rhs,
            n_eq,
            ineq_lower: problem.inequality.lower.clone(),
            ineq_upper: problem.inequality.upper.clone(),
            g_dim,
        })
    }

    fn solve(
        &self,
        handle: &mut Self::Handle,
        _initial_guess: &DVector<f64>,
        uini: &DVector<f64>,
        yini: &DVector<f64>,
    ) -> SolveOutcome {
        let q = handle.linear.evaluate(uini, yini);

        let n_ineq = handle.ineq_upper.len();
        let mut b = DVector::zeros(handle.n_eq + 2 * n_ineq);
        match handle.eq_rhs {
            EqualityRhs::FullHistory => {
                b.rows_mut(0, uini.len()).copy_from(uini);
                b.rows_mut(uini.len(), yini.len()).copy_from(yini);
            }
            EqualityRhs::InputHistory => {
                b.rows_mut(0, uini.len()).copy_from(uini);
            }
        }
        b.rows_mut(handle.n_eq, n_ineq).copy_from(&handle.ineq_upper);
        for i in 0..n_ineq {
            b[handle.n_eq + n_ineq + i] = -handle.ineq_lower[i];
        }

        let q_slice: Vec<f64> = q.iter().copied().collect();
        let b_slice: Vec<f64> = b.iter().copied().collect();

        let solver_result = DefaultSolver::new(
            &handle.p_csc,
            &q_slice,
            &handle.a_csc,
            &b_slice,
            &handle.cones,
            handle.settings.clone(),
        );

        match solver_result {
            Ok(mut solver) => {
                solver.solve();
                let sol = &solver.solution;

                let converged = matches!(
                    sol.status,
                    SolverStatus::Solved | SolverStatus::AlmostSolved
                );

                let mut g = DVector::zeros(handle.g_dim);
                if converged {
                    for i in 0..handle.g_dim {
                        g[i] = sol.x[i];
                    }
                }
                SolveOutcome { g, converged }
            }
            Err(_) => SolveOutcome {
                g: DVector::zeros(handle.g_dim),
                converged: false,
            },
        }
    }
}

/// Convert a nalgebra `DMatrix<f64>` to a Clarabel `CscMatrix<f64>` (full matrix).
fn dmatrix_to_csc(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = vec![0usize; ncols + 1];
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    for j in 0..ncols {
        for i in 0..nrows {
            let v = m[(i, j)];
            if v.abs() > 1e-15 {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr[j + 1] = rowval.len();
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}

/// Convert a symmetric nalgebra `DMatrix<f64>` to upper-triangular `CscMatrix<f64>`.
fn dmatrix_to_csc_upper_tri(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = vec![0usize; ncols + 1];
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    for j in 0..ncols {
        for i in 0..=j.min(nrows - 1) {
            let v = m[(i, j)];
            if v.abs() > 1e-15 {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr[j + 1] = rowval.len();
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}
