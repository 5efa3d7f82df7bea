use crate::error::ConfigError;
use crate::schedule::{RawScheduleConfig, ScheduleConfig};
use crate::session::{RawSessionConfig, SessionConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub persistence_path: PathBuf,
    pub persistence_max_log_file_size: u64,
    pub cpu_affinity: Option<usize>,
    pub busy_spin_mode: bool,
    pub sessions: Vec<SessionConfig>,
    pub schedules: Vec<ScheduleConfig>,
}

#[derive(Debug, Deserialize)]
struct RawPersistence {
    path: Option<String>,
    #[serde(rename = "max-log-file-size")]
    max_log_file_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawEngineConfig {
    persistence: Option<RawPersistence>,
    #[serde(rename = "cpu-affinity")]
    cpu_affinity: Option<usize>,
    #[serde(rename = "busy-spin-mode")]
    busy_spin_mode: Option<bool>,
    sessions: Option<Vec<RawSessionConfig>>,
    schedules: Option<Vec<RawScheduleConfig>>,
}

/// Loads the Engine config (spec.md §6) from a TOML file: persistence
/// settings, optional CPU pinning, and the `sessions[]` list — each
/// entry possibly expanding into several sessions via host-range
/// shorthand.
pub fn load_engine_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading '{}': {e}", path.display())))?;
    load_engine_config_from_str(&toml_str)
}

pub fn load_engine_config_from_str(toml_str: &str) -> Result<EngineConfig, ConfigError> {
    let raw: RawEngineConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let persistence = raw
        .persistence
        .ok_or_else(|| ConfigError::MissingField("persistence".into()))?;
    let persistence_path = persistence
        .path
        .ok_or_else(|| ConfigError::MissingField("persistence.path".into()))?
        .into();
    let persistence_max_log_file_size = persistence.max_log_file_size.unwrap_or(64 * 1024 * 1024);

    let raw_sessions = raw.sessions.unwrap_or_default();
    let mut sessions = Vec::with_capacity(raw_sessions.len());
    for raw_session in raw_sessions {
        sessions.extend(raw_session.expand()?);
    }

    let raw_schedules = raw.schedules.unwrap_or_default();
    let mut schedules = Vec::with_capacity(raw_schedules.len());
    for raw_schedule in raw_schedules {
        schedules.push(raw_schedule.validate()?);
    }

    Ok(EngineConfig {
        persistence_path,
        persistence_max_log_file_size,
        cpu_affinity: raw.cpu_affinity,
        busy_spin_mode: raw.busy_spin_mode.unwrap_or(false),
        sessions,
        schedules,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_expands_host_range_sessions() {
        let toml = r#"
            [persistence]
            path = "/var/lib/xlink"

            [[sessions]]
            session-id = "VENUE"
            host = "10.0.0.1-2"
            port = 9001
            initiator = false
        "#;
        let config = load_engine_config_from_str(toml).unwrap();
        assert_eq!(config.persistence_max_log_file_size, 64 * 1024 * 1024);
        assert_eq!(config.sessions.len(), 2);
        assert_eq!(config.sessions[0].session_id, "VENUE");
        assert_eq!(config.sessions[1].session_id, "VENUE-1");
    }

    #[test]
    fn missing_persistence_block_is_an_error() {
        let err = load_engine_config_from_str("[[sessions]]\nsession-id=\"X\"\nhost=\"1.2.3.4\"\nport=1");
        assert!(matches!(err, Err(ConfigError::MissingField(_))));
    }
}
