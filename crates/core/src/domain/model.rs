use anyhow::ensure;
use serde::{Deserialize, Serialize};

/// Wire form of a fitted response curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub alpha: f64,
    pub beta: f64,
    pub kappa: f64,
    pub max_yield: f64,
    pub r_squared: f64,
}

/// A validated saturating response curve for one channel.
///
/// `output(spend) = max_yield * spend^beta / (kappa^beta + spend^beta)`, evaluated on
/// adstocked spend when `alpha > 0`. Instances are immutable; a refit produces a new one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ModelParams", into = "ModelParams")]
pub struct FittedModel {
    alpha: f64,
    beta: f64,
    kappa: f64,
    max_yield: f64,
    r_squared: f64,
}

impl FittedModel {
    pub fn new(alpha: f64, beta: f64, kappa: f64, max_yield: f64, r_squared: f64) -> anyhow::Result<Self> {
        ensure!(
            alpha.is_finite() && (0.0..1.0).contains(&alpha),
            "alpha must be in [0, 1) (got {alpha})"
        );
        ensure!(beta.is_finite() && beta > 0.0, "beta must be > 0 (got {beta})");
        ensure!(kappa.is_finite() && kappa > 0.0, "kappa must be > 0 (got {kappa})");
        ensure!(
            max_yield.is_finite() && max_yield > 0.0,
            "max_yield must be > 0 (got {max_yield})"
        );
        ensure!(
            r_squared.is_finite() && (0.0..=1.0).contains(&r_squared),
            "r_squared must be in [0, 1] (got {r_squared})"
        );

        Ok(Self {
            alpha,
            beta,
            kappa,
            max_yield,
            r_squared,
        })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn kappa(&self) -> f64 {
        self.kappa
    }

    pub fn max_yield(&self) -> f64 {
        self.max_yield
    }

    pub fn r_squared(&self) -> f64 {
        self.r_squared
    }

    pub fn params(&self) -> ModelParams {
        ModelParams::from(*self)
    }

    pub fn evaluate(&self, spend: f64) -> f64 {
        crate::curve::evaluate(self, spend)
    }
}

impl TryFrom<ModelParams> for FittedModel {
    type Error = anyhow::Error;

    fn try_from(p: ModelParams) -> Result<Self, Self::Error> {
        Self::new(p.alpha, p.beta, p.kappa, p.max_yield, p.r_squared)
    }
}

impl From<FittedModel> for ModelParams {
    fn from(m: FittedModel) -> Self {
        Self {
            alpha: m.alpha,
            beta: m.beta,
            kappa: m.kappa,
            max_yield: m.max_yield,
            r_squared: m.r_squared,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_through_validation() {
        let ok: FittedModel = serde_json::from_value(json!({
            "alpha": 0.2, "beta": 1.1, "kappa": 150.0, "max_yield": 1200.0, "r_squared": 0.9
        }))
        .unwrap();
        assert_eq!(ok.kappa(), 150.0);

        let bad = serde_json::from_value::<FittedModel>(json!({
            "alpha": 0.2, "beta": 0.0, "kappa": 150.0, "max_yield": 1200.0, "r_squared": 0.9
        }));
        assert!(bad.is_err());
    }

    #[test]
    fn rejects_r_squared_out_of_range() {
        assert!(FittedModel::new(0.0, 1.0, 100.0, 1000.0, 1.2).is_err());
        assert!(FittedModel::new(0.0, 1.0, 100.0, 1000.0, -0.1).is_err());
        assert!(FittedModel::new(1.0, 1.0, 100.0, 1000.0, 0.5).is_err());
    }

    #[test]
    fn serializes_as_flat_params() {
        let m = FittedModel::new(0.0, 1.0, 100.0, 1000.0, 0.95).unwrap();
        let v = serde_json::to_value(m).unwrap();
        assert_eq!(v["max_yield"], json!(1000.0));
        assert_eq!(v["r_squared"], json!(0.95));
    }
}
