//! Capture-problem definition: raw data, the text format, and the wiring of
//! objective, linear constraints, and boundedness condition.
//!
//! Problem files are plain `key = value ;` lines with vectors written as
//! `[ a b c ]`:
//!
//! ```text
//! g = 9.81;
//! lambda_min = 0.1;
//! lambda_max = 2.0;
//! Delta = [ 0.02 0.04 0.06 ];
//! omega_i_min = 2.0;
//! omega_i_max = 3.5;
//! z_bar = 0.8;
//! zd_bar = 0.1;
//! z_f = 0.75;
//! ```

use std::collections::HashMap;
use std::path::Path;

use nalgebra::DVector;

use capstan_qp::{LeastSquareObjective, LinearConstraints};

use crate::boundedness::BoundednessConstraint;
use crate::error::CaptureError;

/// Raw capture-problem data, as read from a problem file.
#[derive(Debug, Clone)]
pub struct RawProblem {
    /// Gravity (m/s^2).
    pub g: f64,
    /// Lower bound on the leg stiffness multiplier.
    pub lambda_min: f64,
    /// Upper bound on the leg stiffness multiplier.
    pub lambda_max: f64,
    /// Timestep vector of the discretization.
    pub delta: DVector<f64>,
    /// Window on the initial pendulum frequency (rad/s).
    pub init_omega_min: f64,
    pub init_omega_max: f64,
    /// Initial generalized height and its derivative.
    pub init_zbar: f64,
    pub init_zbar_deriv: f64,
    /// Height the trajectory must reach at the end.
    pub target_height: f64,
    /// Reference phase profile, when the file carries one.
    pub phi: Option<DVector<f64>>,
}

impl RawProblem {
    /// Parse the `key = value ;` problem format.
    pub fn from_str(text: &str) -> Result<Self, CaptureError> {
        let mut table: HashMap<&str, &str> = HashMap::new();
        for (idx, line) in text.lines().enumerate() {
            let Some(eq) = line.find('=') else {
                continue;
            };
            if eq == 0 {
                continue;
            }
            let key = line[..eq].trim();
            let Some(semi) = line[eq + 1..].find(';') else {
                return Err(CaptureError::Parse {
                    line: idx + 1,
                    message: format!("missing ';' after `{key}`"),
                });
            };
            let value = line[eq + 1..eq + 1 + semi].trim();
            table.insert(key, value);
        }

        let raw = Self {
            g: parse_scalar(&table, "g")?,
            lambda_min: parse_scalar(&table, "lambda_min")?,
            lambda_max: parse_scalar(&table, "lambda_max")?,
            delta: parse_vector(&table, "Delta")?,
            init_omega_min: parse_scalar(&table, "omega_i_min")?,
            init_omega_max: parse_scalar(&table, "omega_i_max")?,
            init_zbar: parse_scalar(&table, "z_bar")?,
            init_zbar_deriv: parse_scalar(&table, "zd_bar")?,
            target_height: parse_scalar(&table, "z_f")?,
            phi: match table.get("Phi") {
                Some(_) => Some(parse_vector(&table, "Phi")?),
                None => None,
            },
        };
        raw.validate()?;
        Ok(raw)
    }

    /// Read and parse a problem file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CaptureError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_str(&text)
    }

    fn validate(&self) -> Result<(), CaptureError> {
        if !(self.g > 0.0) {
            return Err(invalid("g", "must be strictly positive"));
        }
        if self.lambda_min > self.lambda_max {
            return Err(invalid("lambda_min", "must not exceed lambda_max"));
        }
        if !(self.init_omega_min >= 0.0) || self.init_omega_min > self.init_omega_max {
            return Err(invalid("omega_i_min", "needs 0 <= omega_i_min <= omega_i_max"));
        }
        if !(self.target_height > 0.0) {
            return Err(invalid("z_f", "must be strictly positive"));
        }
        if let Some(phi) = &self.phi {
            if phi.len() != self.delta.len() {
                return Err(invalid("Phi", "must match the length of Delta"));
            }
        }
        Ok(())
    }
}

fn invalid(key: &str, message: &str) -> CaptureError {
    CaptureError::InvalidValue {
        key: key.into(),
        message: message.into(),
    }
}

fn parse_scalar(table: &HashMap<&str, &str>, key: &str) -> Result<f64, CaptureError> {
    let raw = table
        .get(key)
        .ok_or_else(|| CaptureError::MissingKey(key.into()))?;
    raw.parse::<f64>().map_err(|e| CaptureError::InvalidValue {
        key: key.into(),
        message: e.to_string(),
    })
}

fn parse_vector(table: &HashMap<&str, &str>, key: &str) -> Result<DVector<f64>, CaptureError> {
    let raw = table
        .get(key)
        .ok_or_else(|| CaptureError::MissingKey(key.into()))?;
    let inner = raw
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| CaptureError::InvalidValue {
            key: key.into(),
            message: "expected `[ a b c ]`".into(),
        })?;
    let mut values = Vec::new();
    for token in inner.split_whitespace() {
        values.push(token.parse::<f64>().map_err(|e| CaptureError::InvalidValue {
            key: key.into(),
            message: e.to_string(),
        })?);
    }
    Ok(DVector::from_vec(values))
}

/// A fully wired capture problem.
///
/// The box bounds are `lambda_min delta <= x <= lambda_max delta` with the
/// first step pinned to `delta_0 g / z_f` by the target height, and the sum
/// window is `[omega_i_min^2, omega_i_max^2]`. Setters keep the dependent
/// bounds in sync with the raw data.
#[derive(Debug, Clone)]
pub struct Problem {
    raw: RawProblem,
    objective: LeastSquareObjective,
    constraints: LinearConstraints,
    boundedness: BoundednessConstraint,
}

impl Problem {
    pub fn new(raw: RawProblem) -> Result<Self, CaptureError> {
        raw.validate()?;
        let delta = raw.delta.clone();
        let objective = LeastSquareObjective::new(delta.clone())?;
        let mut constraints = LinearConstraints::new(
            raw.lambda_min * &delta,
            raw.lambda_max * &delta,
            raw.init_omega_min * raw.init_omega_min,
            raw.init_omega_max * raw.init_omega_max,
        )?;
        let pinned = delta[0] * raw.g / raw.target_height;
        constraints.change_bounds_at(0, pinned, pinned)?;
        let boundedness =
            BoundednessConstraint::new(delta, raw.init_zbar / raw.g, raw.init_zbar_deriv / raw.g)?;
        Ok(Self {
            raw,
            objective,
            constraints,
            boundedness,
        })
    }

    pub fn size(&self) -> usize {
        self.raw.delta.len()
    }

    pub fn raw(&self) -> &RawProblem {
        &self.raw
    }

    pub fn objective(&self) -> &LeastSquareObjective {
        &self.objective
    }

    pub fn objective_mut(&mut self) -> &mut LeastSquareObjective {
        &mut self.objective
    }

    pub fn constraints(&self) -> &LinearConstraints {
        &self.constraints
    }

    pub fn constraints_mut(&mut self) -> &mut LinearConstraints {
        &mut self.constraints
    }

    pub fn boundedness(&self) -> &BoundednessConstraint {
        &self.boundedness
    }

    pub fn set_target_height(&mut self, target_height: f64) -> Result<(), CaptureError> {
        if !(target_height > 0.0) {
            return Err(invalid("z_f", "must be strictly positive"));
        }
        self.raw.target_height = target_height;
        self.update_pinned_bound()
    }

    pub fn set_init_zbar(&mut self, init_zbar: f64) {
        self.raw.init_zbar = init_zbar;
        self.boundedness.set_alpha(init_zbar / self.raw.g);
    }

    pub fn set_init_zbar_deriv(&mut self, init_zbar_deriv: f64) {
        self.raw.init_zbar_deriv = init_zbar_deriv;
        self.boundedness.set_b(init_zbar_deriv / self.raw.g);
    }

    pub fn set_lambdas(&mut self, lambda_min: f64, lambda_max: f64) -> Result<(), CaptureError> {
        if lambda_min > lambda_max {
            return Err(invalid("lambda_min", "must not exceed lambda_max"));
        }
        self.raw.lambda_min = lambda_min;
        self.raw.lambda_max = lambda_max;
        self.update_zonotope_bounds()
    }

    pub fn set_init_omega(
        &mut self,
        init_omega_min: f64,
        init_omega_max: f64,
    ) -> Result<(), CaptureError> {
        if !(init_omega_min >= 0.0) || init_omega_min > init_omega_max {
            return Err(invalid("omega_i_min", "needs 0 <= omega_i_min <= omega_i_max"));
        }
        self.raw.init_omega_min = init_omega_min;
        self.raw.init_omega_max = init_omega_max;
        let n = self.size();
        self.constraints.change_bounds_at(
            n,
            init_omega_min * init_omega_min,
            init_omega_max * init_omega_max,
        )?;
        Ok(())
    }

    /// Rebuild the per-active-set QR table of the objective (shift 1, the
    /// position of the Jacobian inside the stacked solve matrix).
    pub fn precompute(&mut self) -> Result<(), CaptureError> {
        self.objective.precompute(1)?;
        Ok(())
    }

    fn update_pinned_bound(&mut self) -> Result<(), CaptureError> {
        let pinned = self.raw.delta[0] * self.raw.g / self.raw.target_height;
        self.constraints.change_bounds_at(0, pinned, pinned)?;
        Ok(())
    }

    fn update_zonotope_bounds(&mut self) -> Result<(), CaptureError> {
        self.constraints.change_bounds(
            &(self.raw.lambda_min * &self.raw.delta),
            &(self.raw.lambda_max * &self.raw.delta),
        )?;
        self.update_pinned_bound()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
