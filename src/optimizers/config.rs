//! Serializable description of an update method.

use super::{
    AdaGradMethod, AdamMethod, DecayMethod, GradientClipping, LearningRateMethod, MomentumMethod,
    NesterovMomentumMethod, ParamsRegularization, RAdamMethod, UpdateMethod, UpdateSettings,
};
use crate::error::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum UpdateMethodKind {
    LearningRate {
        learning_rate: f64,
        #[serde(default)]
        decay: Option<DecayMethod>,
    },
    AdaGrad {
        learning_rate: f64,
        epsilon: f64,
    },
    Adam {
        learning_rate: f64,
        beta1: f64,
        beta2: f64,
        epsilon: f64,
    },
    RAdam {
        learning_rate: f64,
        beta1: f64,
        beta2: f64,
        epsilon: f64,
    },
    Momentum {
        learning_rate: f64,
        momentum: f64,
    },
    NesterovMomentum {
        learning_rate: f64,
        momentum: f64,
    },
}

/// Update method configuration, loadable from JSON:
///
/// ```json
/// { "method": "Adam", "learning_rate": 0.001, "beta1": 0.9, "beta2": 0.999,
///   "epsilon": 1e-8, "gradient_clipping": { "Value": { "clip": 5.0 } } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateMethodConfig {
    #[serde(flatten)]
    pub kind: UpdateMethodKind,
    #[serde(default)]
    pub regularization: Option<ParamsRegularization>,
    #[serde(default)]
    pub gradient_clipping: Option<GradientClipping>,
}

impl UpdateMethodConfig {
    pub fn new(kind: UpdateMethodKind) -> Self {
        Self {
            kind,
            regularization: None,
            gradient_clipping: None,
        }
    }

    pub fn with_regularization(mut self, regularization: ParamsRegularization) -> Self {
        self.regularization = Some(regularization);
        self
    }

    pub fn with_gradient_clipping(mut self, clipping: GradientClipping) -> Self {
        self.gradient_clipping = Some(clipping);
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Builds the update method, validating its hyperparameters.
    pub fn build(&self) -> Result<Box<dyn UpdateMethod>> {
        let settings = UpdateSettings {
            regularization: self.regularization,
            gradient_clipping: self.gradient_clipping,
        };
        let method: Box<dyn UpdateMethod> = match self.kind {
            UpdateMethodKind::LearningRate { learning_rate, decay } => {
                let mut m = LearningRateMethod::new(learning_rate)?.with_settings(settings)?;
                if let Some(decay) = decay {
                    m = m.with_decay(decay)?;
                }
                Box::new(m)
            }
            UpdateMethodKind::AdaGrad { learning_rate, epsilon } => {
                Box::new(AdaGradMethod::new(learning_rate, epsilon)?.with_settings(settings)?)
            }
            UpdateMethodKind::Adam { learning_rate, beta1, beta2, epsilon } => Box::new(
                AdamMethod::new(learning_rate, beta1, beta2, epsilon)?.with_settings(settings)?,
            ),
            UpdateMethodKind::RAdam { learning_rate, beta1, beta2, epsilon } => Box::new(
                RAdamMethod::new(learning_rate, beta1, beta2, epsilon)?.with_settings(settings)?,
            ),
            UpdateMethodKind::Momentum { learning_rate, momentum } => {
                Box::new(MomentumMethod::new(learning_rate, momentum)?.with_settings(settings)?)
            }
            UpdateMethodKind::NesterovMomentum { learning_rate, momentum } => Box::new(
                NesterovMomentumMethod::new(learning_rate, momentum)?.with_settings(settings)?,
            ),
        };
        Ok(method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DnnError;

    #[test]
    fn test_from_json_builds_method() {
        let json = r#"{
            "method": "Adam",
            "learning_rate": 0.001,
            "beta1": 0.9,
            "beta2": 0.999,
            "epsilon": 1e-8,
            "gradient_clipping": { "Value": { "clip": 5.0 } }
        }"#;
        let config = UpdateMethodConfig::from_json(json).unwrap();
        assert_eq!(config.gradient_clipping, Some(GradientClipping::Value { clip: 5.0 }));
        let method = config.build().unwrap();
        assert_eq!(method.name(), "Adam");
        assert_eq!(method.settings().gradient_clipping, config.gradient_clipping);
    }

    #[test]
    fn test_json_round_trip_with_decay() {
        let config = UpdateMethodConfig::new(UpdateMethodKind::LearningRate {
            learning_rate: 0.1,
            decay: Some(DecayMethod::Exponential { rate: 0.01, min: 0.001 }),
        })
        .with_regularization(ParamsRegularization::L2 { lambda: 1e-4 });
        let json = config.to_json().unwrap();
        assert_eq!(UpdateMethodConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let config = UpdateMethodConfig::new(UpdateMethodKind::Momentum {
            learning_rate: 0.1,
            momentum: 1.5,
        });
        assert!(matches!(
            config.build(),
            Err(DnnError::InvalidHyperParameter { name: "momentum", .. })
        ));
        assert!(matches!(
            UpdateMethodConfig::from_json("{\"method\": \"Unknown\"}"),
            Err(DnnError::Json(_))
        ));
    }
}
