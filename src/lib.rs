//! Conditional branch direction predictors.
//!
//! Every backend implements [`Predictor`]; [`PredictorSelector`] picks one
//! at configuration time and is what a simulator drives.

pub mod config;
pub mod counter;
pub mod error;
pub mod history;
pub mod perceptron;
pub mod predictor;
pub mod selector;
pub mod tage;
pub mod tournament;

pub use config::{PredictorConfig, PredictorKind};
pub use error::ConfigError;
pub use predictor::Predictor;
pub use selector::{Backend, PredictorSelector};
