pub mod client;

pub use client::{CreateExperimentRequest, ExperimentService, ExperimentStatus, HttpExperimentService};
