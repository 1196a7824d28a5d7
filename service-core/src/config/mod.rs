use crate::error::AppError;
use config::{builder::DefaultState, Config as Cfg, ConfigBuilder, File};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};

/// Listener settings, read from an optional `configuration.*` file and
/// `APP__*` variables such as `APP__PORT=9000`.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Charge requests to the first `x-forwarded-for` hop instead of the
    /// socket peer. Only enable behind a proxy that overwrites the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            trust_forwarded_for: false,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        Self::from_builder(
            Cfg::builder()
                .add_source(File::with_name("configuration").required(false))
                .add_source(config::Environment::with_prefix("APP").separator("__")),
        )
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, AppError> {
        let config: Self = builder.build()?.try_deserialize()?;
        config.bind_addr()?;
        Ok(config)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, AppError> {
        let ip: IpAddr = self.host.parse().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("APP__HOST {:?}: {}", self.host, e))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_do_not_trust_proxies() {
        let config = Config::from_builder(Cfg::builder()).unwrap();
        assert_eq!(config.port, 8080);
        assert!(!config.trust_forwarded_for);
        assert_eq!(
            config.bind_addr().unwrap(),
            "0.0.0.0:8080".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_overrides_are_applied() {
        let builder = Cfg::builder()
            .set_override("host", "127.0.0.1")
            .unwrap()
            .set_override("port", 9000)
            .unwrap()
            .set_override("trust_forwarded_for", true)
            .unwrap();
        let config = Config::from_builder(builder).unwrap();
        assert!(config.trust_forwarded_for);
        assert_eq!(
            config.bind_addr().unwrap(),
            "127.0.0.1:9000".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_unparseable_host_is_rejected() {
        let builder = Cfg::builder().set_override("host", "not-an-ip").unwrap();
        assert!(Config::from_builder(builder).is_err());
    }
}
