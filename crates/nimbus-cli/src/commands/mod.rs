//! Subcommand implementations.

pub mod chat;
pub mod config_cmd;
pub mod models;
pub mod serve;

use std::path::PathBuf;

use nimbus_types::config::NimbusConfig;

/// Load config from an explicit path or the default location.
pub fn load_config(path: Option<&str>) -> anyhow::Result<NimbusConfig> {
    let path = match path {
        Some(p) => PathBuf::from(p),
        None => NimbusConfig::default_path(),
    };
    Ok(NimbusConfig::load(&path)?)
}
