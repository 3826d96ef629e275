//! Scenario file loading.

use crate::config::Config;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use std::fs::File;
use std::path::Path;

/// Load and validate a scenario from a YAML file.
pub fn load_config(config_path: &Path) -> Result<Config> {
    let file = File::open(config_path)
        .wrap_err_with(|| format!("Unable to read configuration file: {:?}", config_path))?;

    let config: Config = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse YAML configuration from: {:?}", config_path))?;

    config
        .validate()
        .wrap_err_with(|| format!("Invalid scenario in {:?}", config_path))?;

    Ok(config)
}
