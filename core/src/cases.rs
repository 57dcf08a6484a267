use std::str::FromStr;

use serde_json::{Value, json};

use crate::error::ParseEnumError;

/// Application a case belongs to. Security tools default to the security solution.
pub const DEFAULT_CASE_OWNER: &str = "securitySolution";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl CaseSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            CaseSeverity::Low => "low",
            CaseSeverity::Medium => "medium",
            CaseSeverity::High => "high",
            CaseSeverity::Critical => "critical",
        }
    }
}

impl FromStr for CaseSeverity {
    type Err = ParseEnumError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "low" => Ok(CaseSeverity::Low),
            "medium" => Ok(CaseSeverity::Medium),
            "high" => Ok(CaseSeverity::High),
            "critical" => Ok(CaseSeverity::Critical),
            _ => Err(ParseEnumError::new(
                "case severity",
                raw,
                &["low", "medium", "high", "critical"],
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseStatus {
    Open,
    InProgress,
    Closed,
}

impl CaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CaseStatus::Open => "open",
            CaseStatus::InProgress => "in-progress",
            CaseStatus::Closed => "closed",
        }
    }
}

impl FromStr for CaseStatus {
    type Err = ParseEnumError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "open" => Ok(CaseStatus::Open),
            "in-progress" => Ok(CaseStatus::InProgress),
            "closed" => Ok(CaseStatus::Closed),
            _ => Err(ParseEnumError::new(
                "case status",
                raw,
                &["open", "in-progress", "closed"],
            )),
        }
    }
}

/// Operator joining the terms of a free-text case search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOperator {
    Or,
    And,
}

impl SearchOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchOperator::Or => "OR",
            SearchOperator::And => "AND",
        }
    }
}

impl FromStr for SearchOperator {
    type Err = ParseEnumError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_uppercase().as_str() {
            "OR" => Ok(SearchOperator::Or),
            "AND" => Ok(SearchOperator::And),
            _ => Err(ParseEnumError::new("search operator", raw, &["OR", "AND"])),
        }
    }
}

/// Body of a case comment: free text, or alerts attached as evidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseComment {
    User {
        comment: String,
    },
    Alert {
        alert_ids: Vec<String>,
        index: String,
        rule: Option<(String, Option<String>)>,
    },
}

impl CaseComment {
    pub fn kind(&self) -> &'static str {
        match self {
            CaseComment::User { .. } => "user",
            CaseComment::Alert { .. } => "alert",
        }
    }

    pub fn to_body(&self, owner: &str) -> Value {
        match self {
            CaseComment::User { comment } => json!({
                "type": "user",
                "comment": comment,
                "owner": owner
            }),
            CaseComment::Alert {
                alert_ids,
                index,
                rule,
            } => {
                let mut body = json!({
                    "type": "alert",
                    "alertId": alert_ids,
                    "index": index,
                    "owner": owner
                });
                if let Some((rule_id, rule_name)) = rule {
                    let mut rule = json!({ "id": rule_id });
                    if let Some(name) = rule_name {
                        rule["name"] = Value::String(name.clone());
                    }
                    body["rule"] = rule;
                }
                body
            }
        }
    }
}
