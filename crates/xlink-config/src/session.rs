use crate::discovery::expand_target;
use crate::error::ConfigError;
use serde::Deserialize;

/// One configured session (spec.md §6): either a single host:port or,
/// via `host-range` expansion, several acceptor-side sessions stamped
/// out of one config entry.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub session_id: String,
    pub host: String,
    pub port: u16,
    pub initiator: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub heartbeat_interval_secs: u64,
    pub reconnect_delay_secs: u64,
    /// `-1` (stored as `None`) means unbounded.
    pub max_reconnect_attempts: Option<u32>,
    pub persist_messages: bool,
    pub schedule: Option<String>,
    pub protocol_version: String,
}

#[derive(Debug, Deserialize)]
pub struct RawSessionConfig {
    #[serde(rename = "session-id")]
    session_id: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    initiator: Option<bool>,
    username: Option<String>,
    password: Option<String>,
    #[serde(rename = "heartbeat-interval")]
    heartbeat_interval: Option<u64>,
    #[serde(rename = "reconnect-delay")]
    reconnect_delay: Option<u64>,
    #[serde(rename = "max-reconnect-attempts")]
    max_reconnect_attempts: Option<i64>,
    #[serde(rename = "persist-messages")]
    persist_messages: Option<bool>,
    schedule: Option<String>,
    #[serde(rename = "protocol-version")]
    protocol_version: Option<String>,
}

impl RawSessionConfig {
    /// Validates a single `host:port` entry into exactly one
    /// [`SessionConfig`]. Use [`RawSessionConfig::expand`] when `host`
    /// may be a range shorthand producing several sessions.
    pub fn validate(self) -> Result<SessionConfig, ConfigError> {
        let session_id = self
            .session_id
            .ok_or_else(|| ConfigError::MissingField("session-id".into()))?;
        let host = self.host.ok_or_else(|| ConfigError::MissingField("host".into()))?;
        let port = self.port.ok_or_else(|| ConfigError::MissingField("port".into()))?;
        let max_reconnect_attempts = match self.max_reconnect_attempts.unwrap_or(-1) {
            -1 => None,
            n if n >= 0 => Some(n as u32),
            n => return Err(ConfigError::InvalidValue(format!("max-reconnect-attempts {n} is invalid"))),
        };
        Ok(SessionConfig {
            session_id,
            host,
            port,
            initiator: self.initiator.unwrap_or(true),
            username: self.username,
            password: self.password,
            heartbeat_interval_secs: self.heartbeat_interval.unwrap_or(30),
            reconnect_delay_secs: self.reconnect_delay.unwrap_or(5),
            max_reconnect_attempts,
            persist_messages: self.persist_messages.unwrap_or(true),
            schedule: self.schedule,
            protocol_version: self.protocol_version.unwrap_or_else(|| "FIX.4.4".to_owned()),
        })
    }

    /// Expands `host` as a host-range shorthand (spec.md §6 supplement),
    /// producing one `SessionConfig` per resolved endpoint with
    /// `session_id` suffixed `-N` for N > 0 so ids stay unique.
    pub fn expand(self) -> Result<Vec<SessionConfig>, ConfigError> {
        let host = self.host.clone().ok_or_else(|| ConfigError::MissingField("host".into()))?;
        let port = self.port.ok_or_else(|| ConfigError::MissingField("port".into()))?;
        let endpoints = expand_target(&format!("{host}:{port}"))
            .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
        let base_id = self
            .session_id
            .clone()
            .ok_or_else(|| ConfigError::MissingField("session-id".into()))?;

        endpoints
            .into_iter()
            .enumerate()
            .map(|(i, endpoint)| {
                let session_id = if i == 0 { base_id.clone() } else { format!("{base_id}-{i}") };
                RawSessionConfig {
                    session_id: Some(session_id),
                    host: Some(endpoint.ip),
                    port: Some(endpoint.port),
                    initiator: self.initiator,
                    username: self.username.clone(),
                    password: self.password.clone(),
                    heartbeat_interval: self.heartbeat_interval,
                    reconnect_delay: self.reconnect_delay,
                    max_reconnect_attempts: self.max_reconnect_attempts,
                    persist_messages: self.persist_messages,
                    schedule: self.schedule.clone(),
                    protocol_version: self.protocol_version.clone(),
                }
                .validate()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_host_validates_with_defaults() {
        let raw = RawSessionConfig {
            session_id: Some("CLIENT->SERVER".into()),
            host: Some("10.0.0.5".into()),
            port: Some(9001),
            initiator: None,
            username: None,
            password: None,
            heartbeat_interval: None,
            reconnect_delay: None,
            max_reconnect_attempts: None,
            persist_messages: None,
            schedule: None,
            protocol_version: None,
        };
        let config = raw.validate().unwrap();
        assert_eq!(config.heartbeat_interval_secs, 30);
        assert_eq!(config.max_reconnect_attempts, None);
        assert!(config.initiator);
    }

    #[test]
    fn host_range_expands_into_multiple_sessions_with_suffixed_ids() {
        let raw = RawSessionConfig {
            session_id: Some("VENUE".into()),
            host: Some("10.0.0.1-3".into()),
            port: Some(9001),
            initiator: Some(false),
            username: None,
            password: None,
            heartbeat_interval: None,
            reconnect_delay: None,
            max_reconnect_attempts: Some(-1),
            persist_messages: None,
            schedule: None,
            protocol_version: None,
        };
        let sessions = raw.expand().unwrap();
        assert_eq!(sessions.len(), 3);
        assert_eq!(sessions[0].session_id, "VENUE");
        assert_eq!(sessions[1].session_id, "VENUE-1");
        assert_eq!(sessions[2].host, "10.0.0.3");
    }
}
