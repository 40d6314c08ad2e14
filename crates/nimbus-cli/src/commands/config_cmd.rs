//! `nimbus config` -- inspect the resolved configuration.

use nimbus_types::config::NimbusConfig;

pub fn show(config_path: Option<&str>) -> anyhow::Result<()> {
    let mut config = super::load_config(config_path)?;
    // Never print secrets.
    config.providers.openai.api_key = config.providers.openai.api_key.map(|_| "***".into());
    config.server.auth_secret = config.server.auth_secret.map(|_| "***".into());

    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub fn path() {
    println!("{}", NimbusConfig::default_path().display());
}
