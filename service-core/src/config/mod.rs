use crate::error::AppError;
use config::{Config as Cfg, Environment, File};
use serde::Deserialize;

/// Settings every service shares.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl Config {
    /// `.env`, then an optional `configuration.*` file, then `APP__*`
    /// variables. A bare `PORT` wins over all of them.
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let mut loaded: Config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?
            .try_deserialize()?;

        if let Some(port) = port_override(std::env::var("PORT").ok().as_deref())? {
            loaded.port = port;
        }

        Ok(loaded)
    }
}

fn port_override(raw: Option<&str>) -> Result<Option<u16>, AppError> {
    match raw.map(str::trim).filter(|p| !p.is_empty()) {
        None => Ok(None),
        Some(port) => port.parse().map(Some).map_err(|_| {
            AppError::ConfigError(anyhow::anyhow!("PORT must be a TCP port, got '{}'", port))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_override_parses_or_rejects() {
        assert_eq!(port_override(None).unwrap(), None);
        assert_eq!(port_override(Some("  ")).unwrap(), None);
        assert_eq!(port_override(Some("3001")).unwrap(), Some(3001));
        assert!(port_override(Some("http")).is_err());
        assert!(port_override(Some("70000")).is_err());
    }
}
