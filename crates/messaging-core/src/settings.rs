//! Environment-backed runtime settings for the messaging core.

use std::env;

use thiserror::Error;

const DEFAULT_MAX_FILE_TRANSFER_SIZE: u64 = 10 * 1024 * 1024;
const DEFAULT_DISPLAYED_REPORT_ENABLED: bool = true;
const DEFAULT_DELIVERY_REPORT_ENABLED: bool = true;

/// Settings consumed by the scheduler and the file-info dequeue path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagingSettings {
    /// Maximum outbound file transfer size in bytes; `0` disables the cap.
    pub max_file_transfer_size: u64,
    /// Request displayed reports when dequeuing file-info to the peer.
    pub displayed_report_enabled: bool,
    /// Request delivery reports when dequeuing file-info to the peer.
    pub delivery_report_enabled: bool,
}

/// Settings parse failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl MessagingSettings {
    /// Parse settings from environment variables.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, SettingsError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let max_file_transfer_size = parse_optional_u64(
            "MESSAGING_MAX_FILE_TRANSFER_SIZE",
            DEFAULT_MAX_FILE_TRANSFER_SIZE,
            &mut lookup,
        )?;
        let displayed_report_enabled = parse_optional_bool(
            "MESSAGING_DISPLAYED_REPORT_ENABLED",
            DEFAULT_DISPLAYED_REPORT_ENABLED,
            &mut lookup,
        )?;
        let delivery_report_enabled = parse_optional_bool(
            "MESSAGING_DELIVERY_REPORT_ENABLED",
            DEFAULT_DELIVERY_REPORT_ENABLED,
            &mut lookup,
        )?;

        Ok(Self {
            max_file_transfer_size,
            displayed_report_enabled,
            delivery_report_enabled,
        })
    }

    /// Whether an outbound file exceeds the configured size cap.
    pub fn is_file_size_exceeded(&self, file_size: u64) -> bool {
        self.max_file_transfer_size > 0 && file_size > self.max_file_transfer_size
    }
}

impl Default for MessagingSettings {
    fn default() -> Self {
        Self {
            max_file_transfer_size: DEFAULT_MAX_FILE_TRANSFER_SIZE,
            displayed_report_enabled: DEFAULT_DISPLAYED_REPORT_ENABLED,
            delivery_report_enabled: DEFAULT_DELIVERY_REPORT_ENABLED,
        }
    }
}

fn parse_optional_u64<F>(
    key: &'static str,
    default: u64,
    lookup: &mut F,
) -> Result<u64, SettingsError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty()) else {
        return Ok(default);
    };
    value.parse::<u64>().map_err(|err| SettingsError::InvalidValue {
        key,
        value,
        reason: err.to_string(),
    })
}

fn parse_optional_bool<F>(
    key: &'static str,
    default: bool,
    lookup: &mut F,
) -> Result<bool, SettingsError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = lookup(key).map(|v| v.trim().to_ascii_lowercase()).filter(|v| !v.is_empty())
    else {
        return Ok(default);
    };
    match value.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SettingsError::InvalidValue {
            key,
            value,
            reason: "expected a boolean".to_owned(),
        }),
    }
}
