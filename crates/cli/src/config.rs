//! Environment configuration for the `gate` binary.
//!
//! Read after `.env` loading:
//! - `GATE_REGISTRY`: contract store path (default: `.gate/contracts.rkyv`)
//! - `GATE_RECURSION_LIMIT`: maximum call depth (default: 1024)
//! - `GATE_CPU_TIME_LIMIT_SECS`: CPU budget per execution (default: 5)
//! - `GATE_MEMORY_LIMIT_BYTES`: memory ceiling (default: 32 MiB)

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use shadow::ResourceLimits;

pub const DEFAULT_REGISTRY: &str = ".gate/contracts.rkyv";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateConfig {
    pub registry_path: PathBuf,
    pub limits: ResourceLimits,
}

impl GateConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = ResourceLimits::default();
        let registry_path = lookup("GATE_REGISTRY")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_REGISTRY));

        let recursion_depth =
            parse_var(&lookup, "GATE_RECURSION_LIMIT")?.unwrap_or(defaults.recursion_depth);
        let cpu_time = parse_var::<u64>(&lookup, "GATE_CPU_TIME_LIMIT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.cpu_time);
        let memory_bytes =
            parse_var(&lookup, "GATE_MEMORY_LIMIT_BYTES")?.unwrap_or(defaults.memory_bytes);

        let limits = ResourceLimits {
            recursion_depth,
            cpu_time,
            memory_bytes,
        };
        limits.validate().context("invalid resource limits")?;

        Ok(Self {
            registry_path,
            limits,
        })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} must be a number, got {:?}", key, raw)),
    }
}
