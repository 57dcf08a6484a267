use std::str::FromStr;

use crate::error::ParseEnumError;

/// Workflow status of a security alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertStatus {
    Open,
    Acknowledged,
    Closed,
}

impl AlertStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertStatus::Open => "open",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Closed => "closed",
        }
    }
}

impl FromStr for AlertStatus {
    type Err = ParseEnumError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "open" => Ok(AlertStatus::Open),
            "acknowledged" => Ok(AlertStatus::Acknowledged),
            "closed" => Ok(AlertStatus::Closed),
            _ => Err(ParseEnumError::new(
                "alert status",
                raw,
                &["open", "acknowledged", "closed"],
            )),
        }
    }
}

/// Document fields the free-text alert search matches against.
pub const ALERT_SEARCH_FIELDS: [&str; 9] = [
    "kibana.alert.rule.name",
    "kibana.alert.reason",
    "signal.rule.name",
    "message",
    "host.name",
    "user.name",
    "kibana.alert.rule.description",
    "kibana.alert.uuid",
    "_id",
];
