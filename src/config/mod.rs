// src/config/mod.rs

//! Configuration loading and validation for devsync.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Discover and merge `devsync.toml` files (`loader.rs`).
//! - Parse destination addresses (`destination.rs`).
//! - Resolve CLI targets and check startup preconditions (`validate.rs`).

pub mod destination;
pub mod loader;
pub mod model;
pub mod validate;

pub use destination::{Destination, has_destination_optics};
pub use loader::{candidate_dirs, load_from_path, read_project_config};
pub use model::{CONFIG_FILE_NAME, ConfigFile, DevsyncSection, ProjectConfig};
pub use validate::{Setup, Targets, resolve_targets, validate_setup};
