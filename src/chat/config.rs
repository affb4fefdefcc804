/// Endpoint configuration for the client and server binaries.
///
/// Positional command-line arguments first, then environment overrides:
///
/// - `PARLOR_HOST`: host the client connects to (default: localhost)
/// - `PARLOR_BIND_IP`: address the server listens on (default: 0.0.0.0)
use std::net::{IpAddr, Ipv4Addr};

use tracing::warn;

/// Port used when none (or a bad one) is given.
pub const DEFAULT_PORT: u16 = 5555;

/// Host a client connects to unless `PARLOR_HOST` says otherwise.
pub const DEFAULT_HOST: &str = "localhost";

/// Parse a port in the range 1–65535.
pub fn parse_port(input: &str) -> Option<u16> {
    input.trim().parse::<u16>().ok().filter(|port| *port != 0)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("No login ID. Terminating client.")]
    MissingLoginId,
}

/// Client endpoint and identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub login_id: String,
    pub host: String,
    pub port: u16,
}

impl ClientConfig {
    /// Build from `<loginID> [port]` (program name already stripped).
    pub fn from_args<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let login_id = args
            .next()
            .map(|id| id.trim().to_owned())
            .filter(|id| !id.is_empty())
            .ok_or(ConfigError::MissingLoginId)?;

        let port = match args.next() {
            Some(raw) => parse_port(&raw).unwrap_or_else(|| {
                warn!(port = %raw, "wrong input, using default port {DEFAULT_PORT}");
                DEFAULT_PORT
            }),
            None => {
                warn!("no port given, using default port {DEFAULT_PORT}");
                DEFAULT_PORT
            }
        };

        Ok(Self {
            login_id,
            host: DEFAULT_HOST.to_owned(),
            port,
        })
    }

    /// Apply `PARLOR_HOST`, if set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(host) = std::env::var("PARLOR_HOST")
            .ok()
            .filter(|s| !s.trim().is_empty())
        {
            self.host = host.trim().to_owned();
        }
        self
    }
}

/// Server listen address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_ip: IpAddr,
    pub port: u16,
}

impl ServerConfig {
    /// Build from `[port]` (program name already stripped).
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let port = args
            .into_iter()
            .next()
            .and_then(|raw| parse_port(&raw))
            .unwrap_or_else(|| {
                warn!("didn't specify port or wrong input, using default port {DEFAULT_PORT}");
                DEFAULT_PORT
            });

        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port,
        }
    }

    /// Apply `PARLOR_BIND_IP`, if set and parseable.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(raw) = std::env::var("PARLOR_BIND_IP") {
            match raw.trim().parse() {
                Ok(ip) => self.bind_ip = ip,
                Err(_) => warn!(value = %raw, "ignoring unparseable PARLOR_BIND_IP"),
            }
        }
        self
    }
}
