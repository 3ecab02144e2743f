// src/pipeline/mod.rs

//! Job pipelines: the data-driven stage lists and the executor that
//! interprets them.
//!
//! - [`stage`] defines stages, their input resolvers and declared outputs.
//! - [`catalog`] holds the fixed stage list of every job kind.
//! - [`executor`] runs a pipeline for one job and writes its status.
//! - [`outputs`] locates stage outputs (declared pattern, then fallback
//!   search by file name).
//! - [`publish`] copies results out of staging and builds the result
//!   payload.
//! - [`mixing`] builds the ffmpeg arguments for mix/extract/remux stages.

pub mod catalog;
pub mod executor;
pub mod mixing;
pub mod outputs;
pub mod publish;
pub mod stage;

pub use catalog::pipeline_for;
pub use executor::PipelineExecutor;
pub use outputs::locate_output;
pub use publish::publish_result;
pub use stage::{
    InputResolver, OutputSpec, Pipeline, ResultSpec, Stage, StageAction, StageContext,
    StageOutputs,
};
