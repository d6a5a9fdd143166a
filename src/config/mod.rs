// src/config/mod.rs
//! Service configuration.
//!
//! Resolution order:
//! 1) `$PULSE_CONFIG_PATH` (TOML or JSON, by extension)
//! 2) `config/pulse.toml`
//! 3) `config/pulse.json`
//! 4) built-in defaults
//!
//! Env overrides applied on top: `PULSE_BASE_URL`, `PULSE_LIVE_SECS`, `PULSE_BIND_ADDR`.

pub mod pulse;

pub use pulse::{FeedOverride, PulseConfig};

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_CONFIG_PATH: &str = "PULSE_CONFIG_PATH";
pub const ENV_BASE_URL: &str = "PULSE_BASE_URL";
pub const ENV_LIVE_SECS: &str = "PULSE_LIVE_SECS";
pub const ENV_BIND_ADDR: &str = "PULSE_BIND_ADDR";

/// Load config from an explicit path. Supports TOML or JSON formats.
pub fn load_from(path: &Path) -> Result<PulseConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let cfg = parse(&content, ext.as_str())
        .with_context(|| format!("parsing config {}", path.display()))?;
    Ok(cfg.sanitized())
}

/// Load config using env var + fallbacks, then apply env overrides.
pub fn load_default() -> Result<PulseConfig> {
    let cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        load_from(&pb)?
    } else {
        let toml_p = PathBuf::from("config/pulse.toml");
        let json_p = PathBuf::from("config/pulse.json");
        if toml_p.exists() {
            load_from(&toml_p)?
        } else if json_p.exists() {
            load_from(&json_p)?
        } else {
            PulseConfig::default()
        }
    };
    Ok(apply_env(cfg))
}

fn parse(s: &str, hint_ext: &str) -> Result<PulseConfig> {
    match hint_ext {
        "json" => Ok(serde_json::from_str(s)?),
        "toml" => Ok(toml::from_str(s)?),
        // No usable extension: JSON first, TOML as fallback.
        _ => serde_json::from_str(s)
            .map_err(anyhow::Error::from)
            .or_else(|_| toml::from_str(s).map_err(anyhow::Error::from)),
    }
}

fn apply_env(mut cfg: PulseConfig) -> PulseConfig {
    if let Ok(url) = std::env::var(ENV_BASE_URL) {
        if !url.trim().is_empty() {
            cfg.base_url = url.trim().to_string();
        }
    }
    if let Some(secs) = std::env::var(ENV_LIVE_SECS)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
    {
        cfg.live_secs = (secs > 0).then_some(secs);
    }
    if let Ok(addr) = std::env::var(ENV_BIND_ADDR) {
        if !addr.trim().is_empty() {
            cfg.bind_addr = addr.trim().to_string();
        }
    }
    cfg
}
