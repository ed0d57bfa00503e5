//! Settings read from the environment at startup.

use std::{env, net::SocketAddr, path::PathBuf, time::Duration};

use crate::entity::SessionPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {name}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Scalekit environment URL, e.g. `https://acme.scalekit.dev`.
    pub environment_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Callback address registered with the provider.
    pub redirect_uri: String,
    /// Public base URL of this application.
    pub host: String,
    pub listen_addr: SocketAddr,
    pub web_build_dir: PathBuf,
    pub session_policy: SessionPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let defaults = SessionPolicy::default();
        let ttl = parse(&lookup, "SESSION_TTL_SECS")?
            .map(|secs: u64| (secs > 0).then(|| Duration::from_secs(secs)))
            .unwrap_or(defaults.ttl);
        let capacity = parse(&lookup, "SESSION_CAPACITY")?
            .map(|max: usize| (max > 0).then_some(max))
            .unwrap_or(defaults.capacity);

        Ok(Self {
            environment_url: required("SCALEKIT_ENV_URL")?,
            client_id: required("SCALEKIT_CLIENT_ID")?,
            client_secret: required("SCALEKIT_CLIENT_SECRET")?,
            redirect_uri: required("AUTH_REDIRECT_URI")?,
            host: required("HOST")?,
            listen_addr: parse(&lookup, "LISTEN_ADDR")?
                .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080))),
            web_build_dir: lookup("WEB_BUILD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("web/build")),
            session_policy: SessionPolicy { ttl, capacity },
        })
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
