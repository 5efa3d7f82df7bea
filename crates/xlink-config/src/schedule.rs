use crate::error::ConfigError;
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct ScheduleWindowConfig {
    pub start: String,
    pub end: String,
    pub weekdays: Vec<String>,
    pub overnight: bool,
}

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub name: String,
    pub timezone: String,
    pub windows: Vec<ScheduleWindowConfig>,
    pub reset_fixed_time: Option<String>,
    pub reset_tolerance_minutes: u32,
    pub warning_minutes_before_reset: u32,
}

#[derive(Debug, Deserialize)]
pub struct RawScheduleWindow {
    start: Option<String>,
    end: Option<String>,
    weekdays: Option<Vec<String>>,
    overnight: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct RawResetSchedule {
    #[serde(rename = "fixed-time")]
    fixed_time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawScheduleConfig {
    name: Option<String>,
    timezone: Option<String>,
    windows: Option<Vec<RawScheduleWindow>>,
    #[serde(rename = "reset-schedule")]
    reset_schedule: Option<RawResetSchedule>,
    #[serde(rename = "reset-tolerance-minutes")]
    reset_tolerance_minutes: Option<u32>,
    #[serde(rename = "warning-minutes-before-reset")]
    warning_minutes_before_reset: Option<u32>,
}

impl RawScheduleConfig {
    pub fn validate(self) -> Result<ScheduleConfig, ConfigError> {
        let name = self.name.ok_or_else(|| ConfigError::MissingField("schedule.name".into()))?;
        let timezone = self
            .timezone
            .ok_or_else(|| ConfigError::MissingField("schedule.timezone".into()))?;
        let raw_windows = self.windows.unwrap_or_default();
        let mut windows = Vec::with_capacity(raw_windows.len());
        for (i, w) in raw_windows.into_iter().enumerate() {
            let start = w
                .start
                .ok_or_else(|| ConfigError::MissingField(format!("schedule.windows[{i}].start")))?;
            let end = w
                .end
                .ok_or_else(|| ConfigError::MissingField(format!("schedule.windows[{i}].end")))?;
            windows.push(ScheduleWindowConfig {
                start,
                end,
                weekdays: w.weekdays.unwrap_or_default(),
                overnight: w.overnight.unwrap_or(false),
            });
        }
        Ok(ScheduleConfig {
            name,
            timezone,
            windows,
            reset_fixed_time: self.reset_schedule.and_then(|r| r.fixed_time),
            reset_tolerance_minutes: self.reset_tolerance_minutes.unwrap_or(1),
            warning_minutes_before_reset: self.warning_minutes_before_reset.unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_defaults_reset_tolerance_to_one_minute() {
        let raw = RawScheduleConfig {
            name: Some("NYSE".into()),
            timezone: Some("America/New_York".into()),
            windows: Some(vec![RawScheduleWindow {
                start: Some("09:30".into()),
                end: Some("18:00".into()),
                weekdays: Some(vec!["Mon".into()]),
                overnight: None,
            }]),
            reset_schedule: None,
            reset_tolerance_minutes: None,
            warning_minutes_before_reset: None,
        };
        let config = raw.validate().unwrap();
        assert_eq!(config.reset_tolerance_minutes, 1);
        assert!(!config.windows[0].overnight);
    }
}
