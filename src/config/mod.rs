// src/config/mod.rs

//! Configuration loading and validation for jobpipe.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate and parse it into a [`ConfigFile`] (`validate.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{load_and_validate, load_effective, load_from_path};
pub use model::{
    ConfigFile, DispatcherSection, PathsSection, ProgressSection, RawConfigFile, RawStoreSection,
    RawToolConfig, RawToolsSection, SeparatorConfig, SourcesSection, StoreConfig, ToolConfig,
    ToolSet,
};
