pub mod config;

pub use config::{ConfigError, TolerancePolicy, repo_root_from_env};
