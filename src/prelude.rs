pub use serde::{Serialize, Deserialize};

pub use ndarray::*;
pub use ndarray_rand::RandomExt;
pub use ndarray_rand::rand_distr::{Normal, Uniform};
pub use rand::rngs::StdRng;
pub use rand::SeedableRng;

pub use crate::models::Sequential;
pub use crate::error::*;

// Internal re-exports
pub use crate::core::{
    Activation,
    Dense,
    DirectFeedback,
    Init,
    LayerTrait,
    Loss,
    apply_optimization,
    OptimizerType,
    OptimizerConfig,
    Normalization,
};
pub use crate::data::{Dataset, DatasetKind, RawDataset, Split, one_hot};
pub use crate::train::{EpochReport, LearningRule, ReportStyle, TrainConfig, Trainer};
