// src/core.rs
pub mod activations;
pub mod feedback;
pub mod layers;
pub mod losses;
pub mod normalization;
pub mod optimizers;
pub mod output;

// Re-export commonly used items
pub use activations::Activation;
pub use feedback::DirectFeedback;
pub use layers::{Dense, Init, LayerTrait};
pub use losses::Loss;
pub use normalization::Normalization;
pub use optimizers::{Optimization, OptimizerConfig, OptimizerType, apply_optimization};
