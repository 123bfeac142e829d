//! Real-time arrival prediction providers.

pub mod bustime;

pub use bustime::{LivePrediction, PredictionClient, PredictionOutcome};
