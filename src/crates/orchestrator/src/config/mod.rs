//! Engine configuration and YAML loading

pub mod engine;
pub mod loader;

pub use engine::{EngineConfig, OutputRetrySettings, MAX_BACKOFF_SECS};
pub use loader::{load_graph_file, load_yaml_config, load_yaml_file};
