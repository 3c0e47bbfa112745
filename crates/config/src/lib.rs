//! Configuration loading, validation and env substitution.
//!
//! Config files: `cadence.toml`, `cadence.yaml`, `cadence.yml` or `cadence.json`
//! Searched in `./` then `~/.config/cadence/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{config_dir, discover_and_load, find_config_file, load_config},
    schema::{CadenceConfig, JobConfig, MetricsConfig, RunnerSection},
    validate::{Diagnostic, Severity, ValidationResult, validate, validate_file},
};
