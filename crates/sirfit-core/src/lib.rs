//! Core types for sirfit: run configuration, aligned case series and the
//! compartment models the fitter integrates.
//!
//! The typical flow is
//! `TimeSeries` x3 -> [`align::align`] -> [`AlignedSeries`] -> [`CompartmentModel`].

pub mod align;
pub mod config;
pub mod error;
pub mod models;
pub mod types;

pub use align::{align, smooth_monotone, AlignedSeries};
pub use config::{
    Bounds, ExecutionMode, HospitalConfig, IntegrationScheme, IntegratorConfig, ModelConfig,
    NelderMeadConfig, OptimizationConfig, ParameterBounds, ParticleSwarmConfig,
};
pub use error::{FitError, Result};
pub use models::{CompartmentModel, ModelKind, Observable};
pub use types::{CompartmentState, Parameter, TimeSeries};
