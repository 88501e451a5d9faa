//! Objective and equality-constraint assembly for the DeePC designs.
//!
//! Every design mode × control loss lands on the same quadratic shape
//!
//! ```text
//! min_g  1/2 gᵀ H g + f(uini, yini)ᵀ g
//! s.t.   A_eq g = b_eq(uini, yini)
//!        lb ≤ Hc g ≤ ub
//! ```
//!
//! where `H`, `A_eq`, and `Hc` depend only on the offline data and weights,
//! while the rolling history enters `f` and `b_eq` affinely. That split is
//! what lets the solver be compiled once and re-solved every control step
//! with fresh parameters.
//!
//! The `du` losses penalize consecutive control differences. The previous
//! input at the first horizon step is the most recent historical sample, so
//! the rate map is `du = (I − S)·Uf·g − E·uini` with `S` the block
//! down-shift and `E` selecting the last `u_dim` entries of `uini`. The
//! conventional 1/2 factor is folded into `H`/`f` for these variants, which
//! leaves the minimizer unchanged.

use nalgebra::{DMatrix, DVector};

use deepc_core::dims::{DataMatrices, ProblemDimensions};
use deepc_core::error::{DeepcError, FormulationError};
use deepc_core::types::{
    ConstraintSpec, ControlLoss, DesignMode, ReferenceSignals, WeightMatrices,
};

use crate::constraints::{build_inequalities, InequalityBlock};

// ---------------------------------------------------------------------------
// Assembled problem pieces
// ---------------------------------------------------------------------------

/// Affine-in-parameters linear cost term:
/// `f(uini, yini) = constant + input_gain · uini + output_gain · yini`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearTerm {
    pub constant: DVector<f64>,
    /// `g_dim × (u_dim * Tini)`; zero outside the `du` losses.
    pub input_gain: DMatrix<f64>,
    /// `g_dim × (y_dim * Tini)`; zero outside the robust design.
    pub output_gain: DMatrix<f64>,
}

impl LinearTerm {
    /// Evaluate the linear term for the current history.
    #[must_use]
    pub fn evaluate(&self, uini: &DVector<f64>, yini: &DVector<f64>) -> DVector<f64> {
        &self.constant + &self.input_gain * uini + &self.output_gain * yini
    }
}

/// Which history vectors the equality right-hand side matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqualityRhs {
    /// `[Up; Yp] g = [uini; yini]` (standard design).
    FullHistory,
    /// `Up g = uini` (robust design; output mismatch is priced instead).
    InputHistory,
}

/// History-matching equality rows.
#[derive(Debug, Clone, PartialEq)]
pub struct EqualityBlock {
    pub matrix: DMatrix<f64>,
    pub rhs: EqualityRhs,
}

impl EqualityBlock {
    /// Number of equality rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.matrix.nrows()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matrix.nrows() == 0
    }

    /// Build the right-hand side for the current history.
    #[must_use]
    pub fn rhs_vector(&self, uini: &DVector<f64>, yini: &DVector<f64>) -> DVector<f64> {
        match self.rhs {
            EqualityRhs::FullHistory => {
                let mut b = DVector::zeros(uini.len() + yini.len());
                b.rows_mut(0, uini.len()).copy_from(uini);
                b.rows_mut(uini.len(), yini.len()).copy_from(yini);
                b
            }
            EqualityRhs::InputHistory => uini.clone(),
        }
    }
}

/// One fully assembled, parameterized optimization problem.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledProblem {
    pub dims: ProblemDimensions,
    pub mode: DesignMode,
    pub loss: ControlLoss,
    pub hessian: DMatrix<f64>,
    pub linear: LinearTerm,
    pub equality: EqualityBlock,
    pub inequality: InequalityBlock,
}

// ---------------------------------------------------------------------------
// Formulation
// ---------------------------------------------------------------------------

/// Assemble the objective and constraint stack for one design mode and
/// control loss.
///
/// # Errors
///
/// Fails fast on the structural preconditions: enough degrees of freedom for
/// the chosen mode, an input set-point for the `uus` loss, and both
/// regularizers for the robust design.
pub fn formulate(
    mode: DesignMode,
    loss: ControlLoss,
    dims: &ProblemDimensions,
    data: &DataMatrices,
    weights: &WeightMatrices,
    references: &ReferenceSignals,
    spec: &ConstraintSpec,
) -> Result<AssembledProblem, DeepcError> {
    // The equality rows must leave free directions in g.
    let dof_floor = match mode {
        DesignMode::Standard => (dims.u_dim() + dims.y_dim()) * dims.tini(),
        DesignMode::Robust => dims.u_dim() * dims.tini(),
    };
    if dims.g_dim() <= dof_floor {
        return Err(FormulationError::InsufficientDof {
            mode: mode.name(),
            required: dof_floor,
            got: dims.g_dim(),
        }
        .into());
    }

    let uref = match loss {
        ControlLoss::Uus => Some(
            references
                .uref()
                .ok_or(FormulationError::SetpointRequired)?,
        ),
        ControlLoss::U | ControlLoss::Du => None,
    };

    let regularizers = match mode {
        DesignMode::Robust => {
            let lambda_g = weights
                .lambda_g
                .as_ref()
                .ok_or(FormulationError::RobustWeightsRequired)?;
            let lambda_y = weights
                .lambda_y
                .as_ref()
                .ok_or(FormulationError::RobustWeightsRequired)?;
            Some((lambda_g, lambda_y))
        }
        DesignMode::Standard => None,
    };

    let inequality = build_inequalities(spec, dims, data)?;

    let q = &weights.q;
    let r = &weights.r;
    let uf = data.uf();
    let yf = data.yf();
    let up = data.up();
    let yp = data.yp();
    let yref = references.yref();

    let zero_input_gain = || DMatrix::zeros(dims.g_dim(), dims.past_input_rows());
    let zero_output_gain = || DMatrix::zeros(dims.g_dim(), dims.past_output_rows());

    let (hessian, linear) = match loss {
        ControlLoss::U | ControlLoss::Uus => {
            let mut hessian = yf.transpose() * q * yf + uf.transpose() * r * uf;
            let mut constant = -(yf.transpose() * q * yref);
            if let Some(uref) = uref {
                constant -= uf.transpose() * r * uref;
            }
            let mut output_gain = zero_output_gain();
            if let Some((lambda_g, lambda_y)) = regularizers {
                hessian += yp.transpose() * lambda_y * yp + lambda_g;
                output_gain = -(yp.transpose() * lambda_y);
            }
            (
                hessian,
                LinearTerm {
                    constant,
                    input_gain: zero_input_gain(),
                    output_gain,
                },
            )
        }
        ControlLoss::Du => {
            let (rate_map, history_selector) = control_rate_maps(uf, dims);
            let mut hessian =
                (yf.transpose() * q * yf + rate_map.transpose() * r * &rate_map) * 2.0;
            let constant = (yf.transpose() * q * yref) * -2.0;
            let input_gain = (rate_map.transpose() * r * history_selector) * -2.0;
            let mut output_gain = zero_output_gain();
            if let Some((lambda_g, lambda_y)) = regularizers {
                hessian += (yp.transpose() * lambda_y * yp + lambda_g) * 2.0;
                output_gain = (yp.transpose() * lambda_y) * -2.0;
            }
            (
                hessian,
                LinearTerm {
                    constant,
                    input_gain,
                    output_gain,
                },
            )
        }
    };

    let equality = match mode {
        DesignMode::Standard => {
            let rows = dims.past_input_rows() + dims.past_output_rows();
            let mut matrix = DMatrix::zeros(rows, dims.g_dim());
            matrix.rows_mut(0, dims.past_input_rows()).copy_from(up);
            matrix
                .rows_mut(dims.past_input_rows(), dims.past_output_rows())
                .copy_from(yp);
            EqualityBlock {
                matrix,
                rhs: EqualityRhs::FullHistory,
            }
        }
        DesignMode::Robust => EqualityBlock {
            matrix: up.clone(),
            rhs: EqualityRhs::InputHistory,
        },
    };

    Ok(AssembledProblem {
        dims: *dims,
        mode,
        loss,
        hessian,
        linear,
        equality,
        inequality,
    })
}

/// Build the control-rate map `D = (I − S) · Uf` and the history selector
/// `E` with `du = D·g − E·uini`.
///
/// `S` shifts the stacked future inputs down by one step; `E` places the
/// last historical input sample at the first step.
fn control_rate_maps(
    uf: &DMatrix<f64>,
    dims: &ProblemDimensions,
) -> (DMatrix<f64>, DMatrix<f64>) {
    let u_dim = dims.u_dim();
    let n = dims.future_input_rows();

    let mut difference = DMatrix::identity(n, n);
    for i in u_dim..n {
        difference[(i, i - u_dim)] = -1.0;
    }
    let rate_map = difference * uf;

    let mut history_selector = DMatrix::zeros(n, dims.past_input_rows());
    let last_block = u_dim * (dims.tini() - 1);
    for j in 0..u_dim {
        history_selector[(j, last_block + j)] = 1.0;
    }

    (rate_map, history_selector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use deepc_core::types::TrajectoryData;

    fn pseudo(x: f64) -> f64 {
        2.0 * ((x * 12.9898).sin() * 43758.5453).fract() - 1.0
    }

    /// Scalar integrator trajectory with hash-style excitation.
    fn fixture(t: usize, tini: usize, np: usize) -> (ProblemDimensions, DataMatrices) {
        let dims = ProblemDimensions::new(1, 1, t, tini, np).unwrap();
        let ud = DMatrix::from_fn(t, 1, |i, _| pseudo(i as f64));
        let mut yd = DMatrix::zeros(t, 1);
        for i in 1..t {
            yd[(i, 0)] = yd[(i - 1, 0)] + ud[(i - 1, 0)];
        }
        let data = TrajectoryData::new(ud, yd).unwrap();
        let matrices = DataMatrices::new(&dims, &data).unwrap();
        (dims, matrices)
    }

    fn uniform_weights(dims: &ProblemDimensions, q: f64, r: f64) -> WeightMatrices {
        WeightMatrices::new(
            DMatrix::identity(dims.future_output_rows(), dims.future_output_rows()) * q,
            DMatrix::identity(dims.future_input_rows(), dims.future_input_rows()) * r,
        )
    }

    fn regularized(dims: &ProblemDimensions, q: f64, r: f64) -> WeightMatrices {
        uniform_weights(dims, q, r).with_regularization(
            DMatrix::identity(dims.g_dim(), dims.g_dim()) * 0.01,
            DMatrix::identity(dims.past_output_rows(), dims.past_output_rows()) * 100.0,
        )
    }

    #[test]
    fn standard_u_matches_closed_form() {
        let (dims, data) = fixture(10, 2, 2);
        let weights = uniform_weights(&dims, 2.0, 0.5);
        let references = ReferenceSignals::new(None, DVector::from_row_slice(&[1.5]), dims.np());

        let problem = formulate(
            DesignMode::Standard,
            ControlLoss::U,
            &dims,
            &data,
            &weights,
            &references,
            &ConstraintSpec::none(),
        )
        .unwrap();

        // Independent elementwise arithmetic: H = Yfᵀ Q Yf + Ufᵀ R Uf.
        let g = dims.g_dim();
        let m = dims.future_output_rows();
        for i in 0..g {
            for j in 0..g {
                let mut expected = 0.0;
                for k in 0..m {
                    expected += data.yf()[(k, i)] * 2.0 * data.yf()[(k, j)];
                    expected += data.uf()[(k, i)] * 0.5 * data.uf()[(k, j)];
                }
                assert_relative_eq!(problem.hessian[(i, j)], expected, epsilon = 1e-10);
            }
            // f = -Yfᵀ Q yref with yref = 1.5 tiled.
            let mut expected_f = 0.0;
            for k in 0..m {
                expected_f -= data.yf()[(k, i)] * 2.0 * 1.5;
            }
            assert_relative_eq!(problem.linear.constant[i], expected_f, epsilon = 1e-10);
        }

        // The history does not enter the linear term in this variant.
        assert_relative_eq!(problem.linear.input_gain.norm(), 0.0);
        assert_relative_eq!(problem.linear.output_gain.norm(), 0.0);

        // Equalities stack Up over Yp and match the full history.
        assert_eq!(problem.equality.rhs, EqualityRhs::FullHistory);
        assert_eq!(
            problem.equality.len(),
            dims.past_input_rows() + dims.past_output_rows()
        );
    }

    #[test]
    fn uus_subtracts_input_reference() {
        let (dims, data) = fixture(10, 2, 2);
        let weights = uniform_weights(&dims, 2.0, 0.5);
        let without = ReferenceSignals::new(None, DVector::zeros(1), dims.np());
        let with = ReferenceSignals::new(
            Some(DVector::from_row_slice(&[0.4])),
            DVector::zeros(1),
            dims.np(),
        );

        let err = formulate(
            DesignMode::Standard,
            ControlLoss::Uus,
            &dims,
            &data,
            &weights,
            &without,
            &ConstraintSpec::none(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DeepcError::Formulation(FormulationError::SetpointRequired)
        ));

        let problem = formulate(
            DesignMode::Standard,
            ControlLoss::Uus,
            &dims,
            &data,
            &weights,
            &with,
            &ConstraintSpec::none(),
        )
        .unwrap();

        // With ys = 0 the linear term reduces to -Ufᵀ R uref.
        for i in 0..dims.g_dim() {
            let mut expected = 0.0;
            for k in 0..dims.future_input_rows() {
                expected -= data.uf()[(k, i)] * 0.5 * 0.4;
            }
            assert_relative_eq!(problem.linear.constant[i], expected, epsilon = 1e-10);
        }
    }

    #[test]
    fn robust_requires_both_regularizers() {
        let (dims, data) = fixture(10, 2, 2);
        let references = ReferenceSignals::new(None, DVector::zeros(1), dims.np());

        let err = formulate(
            DesignMode::Robust,
            ControlLoss::U,
            &dims,
            &data,
            &uniform_weights(&dims, 1.0, 1.0),
            &references,
            &ConstraintSpec::none(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DeepcError::Formulation(FormulationError::RobustWeightsRequired)
        ));

        formulate(
            DesignMode::Robust,
            ControlLoss::U,
            &dims,
            &data,
            &regularized(&dims, 1.0, 1.0),
            &references,
            &ConstraintSpec::none(),
        )
        .unwrap();
    }

    #[test]
    fn robust_u_adds_regularizers_and_output_gain() {
        let (dims, data) = fixture(10, 2, 2);
        let weights = regularized(&dims, 2.0, 0.5);
        let references = ReferenceSignals::new(None, DVector::zeros(1), dims.np());

        let standard = formulate(
            DesignMode::Standard,
            ControlLoss::U,
            &dims,
            &data,
            &weights,
            &references,
            &ConstraintSpec::none(),
        )
        .unwrap();
        let robust = formulate(
            DesignMode::Robust,
            ControlLoss::U,
            &dims,
            &data,
            &weights,
            &references,
            &ConstraintSpec::none(),
        )
        .unwrap();

        // H_robust = H_standard + Ypᵀ λy Yp + λg.
        let g = dims.g_dim();
        for i in 0..g {
            for j in 0..g {
                let mut extra = if i == j { 0.01 } else { 0.0 };
                for k in 0..dims.past_output_rows() {
                    extra += data.yp()[(k, i)] * 100.0 * data.yp()[(k, j)];
                }
                assert_relative_eq!(
                    robust.hessian[(i, j)],
                    standard.hessian[(i, j)] + extra,
                    epsilon = 1e-9
                );
            }
        }

        // f gains the -Ypᵀ λy yini dependence.
        for i in 0..g {
            for k in 0..dims.past_output_rows() {
                assert_relative_eq!(
                    robust.linear.output_gain[(i, k)],
                    -data.yp()[(k, i)] * 100.0,
                    epsilon = 1e-10
                );
            }
        }

        // Only the input history stays a hard equality.
        assert_eq!(robust.equality.rhs, EqualityRhs::InputHistory);
        assert_eq!(robust.equality.len(), dims.past_input_rows());
    }

    #[test]
    fn rate_map_reconstructs_control_differences() {
        let (dims, data) = fixture(12, 3, 4);
        let (rate_map, history_selector) = control_rate_maps(data.uf(), &dims);

        let g = DVector::from_fn(dims.g_dim(), |i, _| pseudo(100.0 + i as f64));
        let uini = DVector::from_fn(dims.past_input_rows(), |i, _| pseudo(200.0 + i as f64));

        let u_cur = data.uf() * &g;
        let du = &rate_map * &g - &history_selector * &uini;

        // First step differences against the last historical sample.
        assert_relative_eq!(du[0], u_cur[0] - uini[uini.len() - 1], epsilon = 1e-12);
        // Later steps difference consecutive future inputs.
        for i in 1..dims.future_input_rows() {
            assert_relative_eq!(du[i], u_cur[i] - u_cur[i - 1], epsilon = 1e-12);
        }
    }

    #[test]
    fn du_objective_matches_expanded_quadratic() {
        let (dims, data) = fixture(12, 2, 3);
        let weights = uniform_weights(&dims, 3.0, 0.7);
        let references = ReferenceSignals::new(None, DVector::from_row_slice(&[0.5]), dims.np());

        let problem = formulate(
            DesignMode::Standard,
            ControlLoss::Du,
            &dims,
            &data,
            &weights,
            &references,
            &ConstraintSpec::none(),
        )
        .unwrap();

        // 1/2 gᵀHg + f(p)ᵀg must reproduce the direct loss up to a
        // g-independent offset: evaluate both at two points and compare
        // differences.
        let uini = DVector::from_fn(dims.past_input_rows(), |i, _| pseudo(50.0 + i as f64));
        let yini = DVector::zeros(dims.past_output_rows());
        let direct = |g: &DVector<f64>| {
            let u_cur = data.uf() * g;
            let mut u_prev = DVector::zeros(u_cur.len());
            u_prev[0] = uini[uini.len() - 1];
            for i in 1..u_cur.len() {
                u_prev[i] = u_cur[i - 1];
            }
            let du = &u_cur - &u_prev;
            let y_loss = data.yf() * g - references.yref();
            (y_loss.transpose() * &weights.q * &y_loss + du.transpose() * &weights.r * &du)[(0, 0)]
        };
        let quadratic = |g: &DVector<f64>| {
            let f = problem.linear.evaluate(&uini, &yini);
            (0.5 * g.transpose() * &problem.hessian * g + f.transpose() * g)[(0, 0)]
        };

        let g0 = DVector::zeros(dims.g_dim());
        let g1 = DVector::from_fn(dims.g_dim(), |i, _| pseudo(300.0 + i as f64));
        let g2 = DVector::from_fn(dims.g_dim(), |i, _| pseudo(400.0 + i as f64));

        assert_relative_eq!(
            direct(&g1) - direct(&g0),
            quadratic(&g1) - quadratic(&g0),
            epsilon = 1e-8,
            max_relative = 1e-8
        );
        assert_relative_eq!(
            direct(&g2) - direct(&g0),
            quadratic(&g2) - quadratic(&g0),
            epsilon = 1e-8,
            max_relative = 1e-8
        );
    }

    #[test]
    fn equality_rhs_follows_the_mode() {
        let (dims, data) = fixture(10, 2, 2);
        let references = ReferenceSignals::new(None, DVector::zeros(1), dims.np());
        let uini = DVector::from_row_slice(&[0.1, 0.2]);
        let yini = DVector::from_row_slice(&[0.3, 0.4]);

        let standard = formulate(
            DesignMode::Standard,
            ControlLoss::U,
            &dims,
            &data,
            &uniform_weights(&dims, 1.0, 1.0),
            &references,
            &ConstraintSpec::none(),
        )
        .unwrap();
        let b = standard.equality.rhs_vector(&uini, &yini);
        assert_eq!(b.len(), 4);
        assert_relative_eq!(b[1], 0.2);
        assert_relative_eq!(b[2], 0.3);

        let robust = formulate(
            DesignMode::Robust,
            ControlLoss::U,
            &dims,
            &data,
            &regularized(&dims, 1.0, 1.0),
            &references,
            &ConstraintSpec::none(),
        )
        .unwrap();
        let b = robust.equality.rhs_vector(&uini, &yini);
        assert_relative_eq!(b, uini);
    }

    #[test]
    fn dof_floor_differs_between_modes() {
        // T = 10, Tini = 3, Np = 2 -> g_dim = 6 <= (1 + 1) * 3.
        let (dims, data) = fixture(10, 3, 2);
        let weights = regularized(&dims, 1.0, 1.0);
        let references = ReferenceSignals::new(None, DVector::zeros(1), dims.np());

        let err = formulate(
            DesignMode::Standard,
            ControlLoss::U,
            &dims,
            &data,
            &weights,
            &references,
            &ConstraintSpec::none(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DeepcError::Formulation(FormulationError::InsufficientDof {
                mode: "standard",
                required: 6,
                got: 6
            })
        ));

        // Same dimensions clear the robust floor: 6 > 1 * 3.
        formulate(
            DesignMode::Robust,
            ControlLoss::U,
            &dims,
            &data,
            &weights,
            &references,
            &ConstraintSpec::none(),
        )
        .unwrap();
    }

    #[test]
    fn inequalities_are_carried_into_the_problem() {
        let (dims, data) = fixture(10, 2, 2);
        let weights = uniform_weights(&dims, 1.0, 1.0);
        let references = ReferenceSignals::new(None, DVector::zeros(1), dims.np());
        let spec = ConstraintSpec::none().bound(
            deepc_core::types::ConstrainedVariable::Input,
            vec![0],
            vec![-1.0],
            vec![1.0],
        );

        let problem = formulate(
            DesignMode::Standard,
            ControlLoss::U,
            &dims,
            &data,
            &weights,
            &references,
            &spec,
        )
        .unwrap();
        assert_eq!(problem.inequality.len(), dims.np());
    }
}
