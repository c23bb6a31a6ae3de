use crate::prelude::*;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    pub optimizer_type: OptimizerType,
}

impl OptimizerConfig {
    pub fn sgd(lr: f64) -> Self {
        Self { optimizer_type: OptimizerType::SGD(lr) }
    }

    pub fn learning_rate(&self) -> Option<f64> {
        match self.optimizer_type {
            OptimizerType::SGD(lr) => Some(lr),
            OptimizerType::None => None,
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self { optimizer_type: OptimizerType::None }
    }
}

/// Plain gradient descent only: the experiments compare learning rules, so the
/// step itself carries no momentum or per-parameter scaling.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum OptimizerType {
    SGD(f64),
    None,
}

pub trait Optimization {
    fn optimize(&mut self, dw: Array2<f64>, db: Array2<f64>, optimizer: &OptimizerConfig);
}

pub fn apply_optimization(
    weights: &mut Array2<f64>,
    bias: &mut Array2<f64>,
    dw: Array2<f64>,
    db: Array2<f64>,
    config: &OptimizerConfig,
) {
    match &config.optimizer_type {
        OptimizerType::SGD(lr) => {
            weights.scaled_add(-*lr, &dw);
            bias.scaled_add(-*lr, &db);
        }
        OptimizerType::None => (),
    }
}
