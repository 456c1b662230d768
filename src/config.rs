use std::env;
use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use tracing::warn;

use crate::allocator::AllocationLimits;

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub engine: EngineConfig,
    pub seed: SeedConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    ///
    /// Invalid values are reported through `tracing` and replaced by defaults,
    /// so the subscriber should be installed first.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            engine: EngineConfig::from_env(),
            seed: SeedConfig::from_env(),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const HOST_VAR: &'static str = "PACK_CALC_API_HOST";
    const PORT_VAR: &'static str = "PACK_CALC_API_PORT";
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 8080;

    fn from_env() -> Self {
        let host_value =
            env_string(Self::HOST_VAR).unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, display_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                warn!(
                    var = Self::HOST_VAR,
                    value = %host_value,
                    error = %err,
                    "could not parse host, using {}",
                    Self::DEFAULT_HOST
                );
                (
                    IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                    Self::DEFAULT_HOST.to_string(),
                )
            }
        };

        let port = load_with_warning(
            Self::PORT_VAR,
            Self::DEFAULT_PORT,
            |value| *value != 0,
            "must not be 0",
        );

        Self {
            bind_ip,
            display_host,
            port,
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging and hints.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Indicates whether binding to all interfaces.
    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }
}

/// Request limits of the allocation engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    limits: AllocationLimits,
}

impl EngineConfig {
    const MAX_ITEMS_VAR: &'static str = "PACK_CALC_MAX_ITEMS";
    const MAX_CONTAINERS_VAR: &'static str = "PACK_CALC_MAX_CONTAINERS";
    const MAX_TOTAL_UNITS_VAR: &'static str = "PACK_CALC_MAX_TOTAL_UNITS";

    fn from_env() -> Self {
        let max_items = load_with_warning(
            Self::MAX_ITEMS_VAR,
            AllocationLimits::DEFAULT_MAX_ITEMS,
            |value| *value > 0,
            "must be greater than 0",
        );
        let max_containers = load_with_warning(
            Self::MAX_CONTAINERS_VAR,
            AllocationLimits::DEFAULT_MAX_CONTAINERS,
            |value| *value > 0,
            "must be greater than 0",
        );
        let max_total_units = load_with_warning(
            Self::MAX_TOTAL_UNITS_VAR,
            AllocationLimits::DEFAULT_MAX_TOTAL_UNITS,
            |value| *value > 0,
            "must be greater than 0",
        );

        let limits = AllocationLimits::builder()
            .max_items(max_items)
            .max_containers(max_containers)
            .max_total_units(max_total_units)
            .build();

        Self { limits }
    }

    pub fn limits(&self) -> AllocationLimits {
        self.limits
    }
}

/// Demo data switch.
#[derive(Clone, Debug, Default)]
pub struct SeedConfig {
    demo: bool,
}

impl SeedConfig {
    const SEED_DEMO_VAR: &'static str = "PACK_CALC_SEED_DEMO";

    fn from_env() -> Self {
        let demo = env_string(Self::SEED_DEMO_VAR)
            .and_then(|raw| parse_bool(&raw, Self::SEED_DEMO_VAR))
            .unwrap_or(false);
        Self { demo }
    }

    /// Whether the catalog should start with demo records.
    pub fn demo(&self) -> bool {
        self.demo
    }
}

pub(crate) fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!(var = name, error = %err, "could not read variable, using default value");
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            warn!(
                var = var_name,
                value = other,
                "could not interpret value as boolean, using default value"
            );
            None
        }
    }
}

fn load_with_warning<T>(
    var_name: &str,
    default: T,
    validator: impl Fn(&T) -> bool,
    invalid_hint: &str,
) -> T
where
    T: FromStr + Display + Copy,
    T::Err: Display,
{
    let Some(raw) = env_string(var_name) else {
        return default;
    };
    match raw.parse::<T>() {
        Ok(value) if validator(&value) => value,
        Ok(_) => {
            warn!(
                var = var_name,
                value = %raw,
                "invalid value: {}, using {}",
                invalid_hint,
                default
            );
            default
        }
        Err(err) => {
            warn!(
                var = var_name,
                value = %raw,
                error = %err,
                "could not parse value, using {}",
                default
            );
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_true_values() {
        for raw in ["1", "true", "yes", "y", "on", "TRUE", "Yes", " on ", "  1  "] {
            assert_eq!(parse_bool(raw, "TEST_VAR"), Some(true), "{raw:?}");
        }
    }

    #[test]
    fn test_parse_bool_false_values() {
        for raw in ["0", "false", "no", "n", "off", "FALSE", "No", " off ", "  0  "] {
            assert_eq!(parse_bool(raw, "TEST_VAR"), Some(false), "{raw:?}");
        }
    }

    #[test]
    fn test_parse_bool_invalid_values() {
        assert_eq!(parse_bool("invalid", "TEST_VAR"), None);
        assert_eq!(parse_bool("2", "TEST_VAR"), None);
        assert_eq!(parse_bool("", "TEST_VAR"), None);
    }

    #[test]
    fn test_unset_variables_fall_back_to_defaults() {
        let value = load_with_warning(
            "PACK_CALC_TEST_SURELY_UNSET_VARIABLE",
            42u64,
            |value| *value > 0,
            "must be greater than 0",
        );
        assert_eq!(value, 42);
        assert_eq!(env_string("PACK_CALC_TEST_SURELY_UNSET_VARIABLE"), None);
    }

    #[test]
    fn test_engine_defaults_match_limits() {
        // none of the engine variables are set in the test environment
        let config = EngineConfig::from_env();
        assert_eq!(config.limits(), AllocationLimits::default());
    }
}
