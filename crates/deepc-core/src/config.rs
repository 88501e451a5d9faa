//! TOML-loadable controller configuration.
//!
//! The config captures everything needed to describe one DeePC problem:
//! dimensions, set-points, diagonal cost weights, optional inequality
//! constraints, design selection, and pass-through solver options.
//!
//! ```toml
//! [dims]
//! u_dim = 1
//! y_dim = 1
//! t = 40
//! tini = 4
//! np = 8
//!
//! [setpoint]
//! us = [0.0]
//! ys = [0.0]
//!
//! [weights]
//! q = [50.0]
//! r = [0.1]
//! lambda_g = 0.001
//! lambda_y = 10000.0
//!
//! [constraints.u]
//! indices = [0]
//! lower = [-1.0]
//! upper = [1.0]
//!
//! [design]
//! mode = "robust"
//! uloss = "u"
//!
//! [solver]
//! max_iter = 200
//! ```

use std::collections::HashMap;
use std::path::Path;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::dims::ProblemDimensions;
use crate::error::{ConfigError, DimensionError};
use crate::types::{
    ConstrainedVariable, ConstraintSpec, ControlLoss, DesignMode, ReferenceSignals, SolverOptions,
    WeightMatrices,
};

/// Dimension section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimsSection {
    pub u_dim: usize,
    pub y_dim: usize,
    pub t: usize,
    pub tini: usize,
    pub np: usize,
}

/// Set-point section. `us` is optional; leaving it out disables the `uus`
/// control loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetpointSection {
    #[serde(default)]
    pub us: Option<Vec<f64>>,
    pub ys: Vec<f64>,
}

/// Diagonal cost weights, one entry per component, tiled over the horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightsSection {
    pub q: Vec<f64>,
    pub r: Vec<f64>,
    /// Scalar multiple of the identity on the decision vector (robust mode).
    #[serde(default)]
    pub lambda_g: Option<f64>,
    /// Scalar multiple of the identity on the output-history slack (robust mode).
    #[serde(default)]
    pub lambda_y: Option<f64>,
}

/// Bounds for selected components of one constrained variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundsSection {
    pub indices: Vec<usize>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

/// Design selection section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignSection {
    pub mode: DesignMode,
    pub uloss: ControlLoss,
}

/// Complete controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeepcConfig {
    pub dims: DimsSection,
    pub setpoint: SetpointSection,
    pub weights: WeightsSection,
    /// Keyed by variable name; only `u` and `y` are recognized.
    #[serde(default)]
    pub constraints: HashMap<String, BoundsSection>,
    pub design: DesignSection,
    #[serde(default)]
    pub solver: SolverOptions,
}

impl DeepcConfig {
    /// Parse and validate a TOML string.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.weights.q.len() != self.dims.y_dim {
            return Err(ConfigError::InvalidValue {
                field: "weights.q".into(),
                message: format!(
                    "expected {} per-output weights, got {}",
                    self.dims.y_dim,
                    self.weights.q.len()
                ),
            });
        }
        if self.weights.r.len() != self.dims.u_dim {
            return Err(ConfigError::InvalidValue {
                field: "weights.r".into(),
                message: format!(
                    "expected {} per-input weights, got {}",
                    self.dims.u_dim,
                    self.weights.r.len()
                ),
            });
        }
        if self.setpoint.ys.len() != self.dims.y_dim {
            return Err(ConfigError::InvalidValue {
                field: "setpoint.ys".into(),
                message: format!(
                    "expected {} components, got {}",
                    self.dims.y_dim,
                    self.setpoint.ys.len()
                ),
            });
        }
        if let Some(us) = &self.setpoint.us {
            if us.len() != self.dims.u_dim {
                return Err(ConfigError::InvalidValue {
                    field: "setpoint.us".into(),
                    message: format!(
                        "expected {} components, got {}",
                        self.dims.u_dim,
                        us.len()
                    ),
                });
            }
        }
        // The constraint table is string-keyed; unknown names die here.
        for (name, bounds) in &self.constraints {
            let variable = ConstrainedVariable::parse(name)?;
            let dim = match variable {
                ConstrainedVariable::Input => self.dims.u_dim,
                ConstrainedVariable::Output => self.dims.y_dim,
            };
            if bounds.lower.len() != bounds.indices.len()
                || bounds.upper.len() != bounds.indices.len()
            {
                return Err(ConfigError::BoundCountMismatch {
                    variable: variable.name(),
                    indices: bounds.indices.len(),
                    lower: bounds.lower.len(),
                    upper: bounds.upper.len(),
                });
            }
            for &index in &bounds.indices {
                if index >= dim {
                    return Err(ConfigError::IndexOutOfRange {
                        variable: variable.name(),
                        index,
                        dim,
                    });
                }
            }
        }
        Ok(())
    }

    /// Derive the validated problem dimensions.
    pub fn dimensions(&self) -> Result<ProblemDimensions, DimensionError> {
        ProblemDimensions::new(
            self.dims.u_dim,
            self.dims.y_dim,
            self.dims.t,
            self.dims.tini,
            self.dims.np,
        )
    }

    /// Expand the diagonal weights into full matrices.
    ///
    /// Assumes `validate()` has passed, so the weight vector lengths agree
    /// with the dimensions.
    #[must_use]
    pub fn weight_matrices(&self, dims: &ProblemDimensions) -> WeightMatrices {
        let q_diag = DVector::from_fn(dims.future_output_rows(), |i, _| {
            self.weights.q[i % self.weights.q.len()]
        });
        let r_diag = DVector::from_fn(dims.future_input_rows(), |i, _| {
            self.weights.r[i % self.weights.r.len()]
        });
        let mut weights = WeightMatrices::new(
            DMatrix::from_diagonal(&q_diag),
            DMatrix::from_diagonal(&r_diag),
        );
        if let (Some(lg), Some(ly)) = (self.weights.lambda_g, self.weights.lambda_y) {
            weights = weights.with_regularization(
                DMatrix::identity(dims.g_dim(), dims.g_dim()) * lg,
                DMatrix::identity(dims.past_output_rows(), dims.past_output_rows()) * ly,
            );
        }
        weights
    }

    /// Tile the set-points over the prediction horizon.
    #[must_use]
    pub fn references(&self, dims: &ProblemDimensions) -> ReferenceSignals {
        let us = self
            .setpoint
            .us
            .as_ref()
            .map(|v| DVector::from_row_slice(v));
        let ys = DVector::from_row_slice(&self.setpoint.ys);
        ReferenceSignals::new(us, ys, dims.np())
    }

    /// Lower the string-keyed constraint table into the typed spec.
    pub fn constraint_spec(&self) -> Result<ConstraintSpec, ConfigError> {
        let mut spec = ConstraintSpec::none();
        // Deterministic order: inputs first, then outputs.
        let mut names: Vec<&String> = self.constraints.keys().collect();
        names.sort();
        for name in names {
            let bounds = &self.constraints[name];
            let variable = ConstrainedVariable::parse(name)?;
            spec = spec.bound(
                variable,
                bounds.indices.clone(),
                bounds.lower.clone(),
                bounds.upper.clone(),
            );
        }
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SAMPLE: &str = r#"
        [dims]
        u_dim = 1
        y_dim = 1
        t = 40
        tini = 4
        np = 8

        [setpoint]
        us = [0.0]
        ys = [0.0]

        [weights]
        q = [50.0]
        r = [0.1]
        lambda_g = 0.001
        lambda_y = 10000.0

        [constraints.u]
        indices = [0]
        lower = [-1.0]
        upper = [1.0]

        [design]
        mode = "robust"
        uloss = "u"

        [solver]
        max_iter = 150
    "#;

    #[test]
    fn parses_sample() {
        let config = DeepcConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.dims.t, 40);
        assert_eq!(config.design.mode, DesignMode::Robust);
        assert_eq!(config.design.uloss, ControlLoss::U);
        assert_eq!(config.solver.max_iter, 150);
        // Unspecified solver fields fall back to defaults.
        assert_relative_eq!(config.solver.tol_feas, 1e-8);
    }

    #[test]
    fn missing_solver_section_defaults() {
        let raw = SAMPLE.split("[solver]").next().unwrap();
        let config = DeepcConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.solver, SolverOptions::default());
    }

    #[test]
    fn unknown_constraint_variable_fails() {
        let raw = SAMPLE.replace("[constraints.u]", "[constraints.w]");
        let err = DeepcConfig::from_toml_str(&raw).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownVariable(name) if name == "w"));
    }

    #[test]
    fn constraint_index_out_of_range_fails() {
        let raw = SAMPLE.replace("indices = [0]", "indices = [1]");
        let err = DeepcConfig::from_toml_str(&raw).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::IndexOutOfRange {
                variable: "u",
                index: 1,
                dim: 1
            }
        ));
    }

    #[test]
    fn bound_count_mismatch_fails() {
        let raw = SAMPLE.replace("lower = [-1.0]", "lower = [-1.0, -2.0]");
        let err = DeepcConfig::from_toml_str(&raw).unwrap_err();
        assert!(matches!(err, ConfigError::BoundCountMismatch { .. }));
    }

    #[test]
    fn weight_length_mismatch_fails() {
        let raw = SAMPLE.replace("q = [50.0]", "q = [50.0, 1.0]");
        let err = DeepcConfig::from_toml_str(&raw).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field, .. } if field == "weights.q"));
    }

    #[test]
    fn lowering_produces_validated_values() {
        let config = DeepcConfig::from_toml_str(SAMPLE).unwrap();
        let dims = config.dimensions().unwrap();
        assert_eq!(dims.g_dim(), 40 - 4 - 8 + 1);

        let weights = config.weight_matrices(&dims);
        dims.validate_weights(&weights).unwrap();
        assert_relative_eq!(weights.q[(0, 0)], 50.0);
        assert_relative_eq!(weights.lambda_y.as_ref().unwrap()[(0, 0)], 1e4);

        let references = config.references(&dims);
        dims.validate_references(&references).unwrap();
        assert!(references.uref().is_some());

        let spec = config.constraint_spec().unwrap();
        assert_eq!(spec.entries().len(), 1);
        assert_eq!(spec.entries()[0].variable, ConstrainedVariable::Input);
    }

    #[test]
    fn toml_roundtrip() {
        let config = DeepcConfig::from_toml_str(SAMPLE).unwrap();
        let raw = toml::to_string(&config).unwrap();
        let back = DeepcConfig::from_toml_str(&raw).unwrap();
        assert_eq!(config, back);
    }
}
