extern crate plotters;

pub mod core;
pub mod data;
pub mod error;
pub mod intnn;
pub mod models;
pub mod prelude;
pub mod quant;
pub mod train;
pub mod utils;

// Re-export types
pub use crate::core::{Activation, Dense, DirectFeedback, LayerTrait, Loss};
pub use models::Sequential;

pub mod plot {
    pub mod plot_activations;
    pub mod plot_history;
}
