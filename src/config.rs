use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::layout::LayoutConfig;
use crate::skyline::{OversizePolicy, PitPolicy, SkylineConfig};

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            engine: EngineConfig::from_env(),
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
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 8080;
    const HOST_VAR: &'static str = "SKYLINE_LAYOUT_API_HOST";
    const PORT_VAR: &'static str = "SKYLINE_LAYOUT_API_PORT";

    fn from_env() -> Self {
        let host_value = env_string(Self::HOST_VAR).unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, effective_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                eprintln!(
                    "⚠️ Could not parse {} ('{}'): {}. Using {}.",
                    Self::HOST_VAR,
                    host_value,
                    err,
                    Self::DEFAULT_HOST
                );
                (
                    IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                    Self::DEFAULT_HOST.to_string(),
                )
            }
        };

        let port = match env_string(Self::PORT_VAR) {
            Some(raw) => parse_port(&raw).unwrap_or(Self::DEFAULT_PORT),
            None => Self::DEFAULT_PORT,
        };

        Self {
            bind_ip,
            display_host: effective_host,
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

    /// Configured port.
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

    /// Checks whether the hostname matches the default value.
    pub fn uses_default_host(&self) -> bool {
        self.display_host == Self::DEFAULT_HOST
    }
}

/// Configuration for the skyline layout engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    layout: LayoutConfig,
}

impl EngineConfig {
    const MIN_GAP_WIDTH_VAR: &'static str = "SKYLINE_LAYOUT_MIN_GAP_WIDTH";
    const MIN_GAP_HEIGHT_VAR: &'static str = "SKYLINE_LAYOUT_MIN_GAP_HEIGHT";
    const MIN_PIT_RATIO_VAR: &'static str = "SKYLINE_LAYOUT_MIN_PIT_RATIO";
    const MAX_WIDTH_RATIO_VAR: &'static str = "SKYLINE_LAYOUT_MAX_WIDTH_RATIO";
    const PIT_POLICY_VAR: &'static str = "SKYLINE_LAYOUT_PIT_POLICY";
    const REJECT_OVERSIZE_VAR: &'static str = "SKYLINE_LAYOUT_REJECT_OVERSIZE";

    fn from_env() -> Self {
        let min_gap_width = load_f64_with_warning(
            Self::MIN_GAP_WIDTH_VAR,
            SkylineConfig::DEFAULT_MIN_GAP_WIDTH,
            |value| value > 0.0,
            "must be greater than 0",
            "Warning: Adjusted gap width changes which slivers get plugged",
        );

        let min_gap_height = load_f64_with_warning(
            Self::MIN_GAP_HEIGHT_VAR,
            SkylineConfig::DEFAULT_MIN_GAP_HEIGHT,
            |value| value > 0.0,
            "must be greater than 0",
            "Warning: Adjusted gap height changes how aggressively heights are merged",
        );

        let min_pit_ratio = load_f64_with_warning(
            Self::MIN_PIT_RATIO_VAR,
            SkylineConfig::DEFAULT_MIN_PIT_RATIO,
            |value| (0.0..=1.0).contains(&value),
            "must be between 0 and 1",
            "Warning: Adjusted pit ratio may fill usable space or leave deep pits open",
        );

        let max_width_ratio = load_f64_with_warning(
            Self::MAX_WIDTH_RATIO_VAR,
            LayoutConfig::DEFAULT_MAX_WIDTH_RATIO,
            |value| (LayoutConfig::MIN_WIDTH_RATIO..=1.0).contains(&value),
            "must be between 0.01 and 1",
            "Warning: Tiles are narrowed to a fraction of the container width",
        );

        let pit_policy = env_string(Self::PIT_POLICY_VAR)
            .and_then(|raw| parse_pit_policy(&raw, Self::PIT_POLICY_VAR))
            .unwrap_or_default();

        let oversize_policy = match env_string(Self::REJECT_OVERSIZE_VAR)
            .and_then(|raw| parse_bool(&raw, Self::REJECT_OVERSIZE_VAR))
        {
            Some(true) => OversizePolicy::Reject,
            Some(false) | None => OversizePolicy::Clamp,
        };

        let skyline = SkylineConfig::builder()
            .min_gap_width(min_gap_width)
            .min_gap_height(min_gap_height)
            .min_pit_ratio(min_pit_ratio)
            .pit_policy(pit_policy)
            .oversize_policy(oversize_policy)
            .build();

        let layout = LayoutConfig::builder()
            .skyline(skyline)
            .max_width_ratio(max_width_ratio)
            .build();

        Self { layout }
    }

    /// Returns the configured LayoutConfig.
    pub fn layout_config(&self) -> LayoutConfig {
        self.layout
    }
}

fn env_string(name: &str) -> Option<String> {
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
            eprintln!(
                "⚠️ Access to {} failed: {}. Using default value.",
                name, err
            );
            None
        }
    }
}

fn parse_port(raw: &str) -> Option<u16> {
    match raw.parse::<u16>() {
        Ok(0) => {
            eprintln!(
                "⚠️ {} must not be 0. Using {}.",
                ApiConfig::PORT_VAR,
                ApiConfig::DEFAULT_PORT
            );
            None
        }
        Ok(value) => Some(value),
        Err(err) => {
            eprintln!(
                "⚠️ Could not parse {} ('{}'): {}. Using {}.",
                ApiConfig::PORT_VAR,
                raw,
                err,
                ApiConfig::DEFAULT_PORT
            );
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            eprintln!(
                "⚠️ Could not interpret {} ('{}') as boolean value. Using default value.",
                var_name, other
            );
            None
        }
    }
}

fn parse_pit_policy(raw: &str, var_name: &str) -> Option<PitPolicy> {
    let policy = PitPolicy::from_code(raw);
    if policy.is_none() {
        eprintln!(
            "⚠️ Unknown pit policy in {} ('{}'), expected 'flanked' or 'peak'. Using default value.",
            var_name, raw
        );
    }
    policy
}

fn load_f64_with_warning(
    var_name: &str,
    default: f64,
    validator: impl Fn(f64) -> bool,
    invalid_hint: &str,
    warning: &str,
) -> f64 {
    match env_string(var_name) {
        Some(raw) => match raw.parse::<f64>() {
            Ok(value) => {
                if !validator(value) {
                    eprintln!(
                        "⚠️ {} contains invalid value '{}': {}. Using {}.",
                        var_name, raw, invalid_hint, default
                    );
                    default
                } else {
                    let tolerance = (default.abs().max(1.0)) * 1e-9;
                    if (value - default).abs() > tolerance {
                        println!("⚠️ {} ({} = {}).", warning, var_name, value);
                    }
                    value
                }
            }
            Err(err) => {
                eprintln!(
                    "⚠️ Could not parse {} ('{}') as number: {}. Using {}.",
                    var_name, raw, err, default
                );
                default
            }
        },
        None => default,
    }
}
