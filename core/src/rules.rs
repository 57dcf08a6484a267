use std::fmt;
use std::str::FromStr;

use crate::error::ParseEnumError;

/// How a caller identifies a detection rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSelector {
    /// Human-facing `rule_id`.
    RuleId(String),
    /// Backend-assigned internal `id`.
    Id(String),
}

impl RuleSelector {
    /// Builds a selector from the optional `rule_id` / `id` pair tools accept.
    /// Exactly one of the two must be set.
    pub fn from_pair(rule_id: Option<String>, id: Option<String>) -> Option<Self> {
        match (rule_id, id) {
            (Some(rule_id), None) => Some(RuleSelector::RuleId(rule_id)),
            (None, Some(id)) => Some(RuleSelector::Id(id)),
            _ => None,
        }
    }

    pub fn query_param(&self) -> &'static str {
        match self {
            RuleSelector::RuleId(_) => "rule_id",
            RuleSelector::Id(_) => "id",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            RuleSelector::RuleId(value) | RuleSelector::Id(value) => value,
        }
    }

    pub fn query(&self) -> Vec<(String, String)> {
        vec![(self.query_param().to_string(), self.value().to_string())]
    }
}

impl fmt::Display for RuleSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.query_param(), self.value())
    }
}

/// Fields the rule search endpoint can sort by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    CreatedAtCamel,
    Enabled,
    LastExecutionDate,
    ExecutionGap,
    TotalIndexingDuration,
    TotalSearchDuration,
    ExecutionStatus,
    Name,
    RiskScore,
    RiskScoreCamel,
    Severity,
    UpdatedAt,
    UpdatedAtCamel,
}

impl SortField {
    const ALL: &'static [&'static str] = &[
        "created_at",
        "createdAt",
        "enabled",
        "execution_summary.last_execution.date",
        "execution_summary.last_execution.metrics.execution_gap_duration_s",
        "execution_summary.last_execution.metrics.total_indexing_duration_ms",
        "execution_summary.last_execution.metrics.total_search_duration_ms",
        "execution_summary.last_execution.status",
        "name",
        "risk_score",
        "riskScore",
        "severity",
        "updated_at",
        "updatedAt",
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SortField::CreatedAt => Self::ALL[0],
            SortField::CreatedAtCamel => Self::ALL[1],
            SortField::Enabled => Self::ALL[2],
            SortField::LastExecutionDate => Self::ALL[3],
            SortField::ExecutionGap => Self::ALL[4],
            SortField::TotalIndexingDuration => Self::ALL[5],
            SortField::TotalSearchDuration => Self::ALL[6],
            SortField::ExecutionStatus => Self::ALL[7],
            SortField::Name => Self::ALL[8],
            SortField::RiskScore => Self::ALL[9],
            SortField::RiskScoreCamel => Self::ALL[10],
            SortField::Severity => Self::ALL[11],
            SortField::UpdatedAt => Self::ALL[12],
            SortField::UpdatedAtCamel => Self::ALL[13],
        }
    }
}

impl FromStr for SortField {
    type Err = ParseEnumError;

    // Field names are case sensitive: the camelCase aliases are distinct values.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let field = match raw.trim() {
            "created_at" => SortField::CreatedAt,
            "createdAt" => SortField::CreatedAtCamel,
            "enabled" => SortField::Enabled,
            "execution_summary.last_execution.date" => SortField::LastExecutionDate,
            "execution_summary.last_execution.metrics.execution_gap_duration_s" => {
                SortField::ExecutionGap
            }
            "execution_summary.last_execution.metrics.total_indexing_duration_ms" => {
                SortField::TotalIndexingDuration
            }
            "execution_summary.last_execution.metrics.total_search_duration_ms" => {
                SortField::TotalSearchDuration
            }
            "execution_summary.last_execution.status" => SortField::ExecutionStatus,
            "name" => SortField::Name,
            "risk_score" => SortField::RiskScore,
            "riskScore" => SortField::RiskScoreCamel,
            "severity" => SortField::Severity,
            "updated_at" => SortField::UpdatedAt,
            "updatedAt" => SortField::UpdatedAtCamel,
            _ => return Err(ParseEnumError::new("sort field", raw, Self::ALL)),
        };
        Ok(field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl FromStr for SortOrder {
    type Err = ParseEnumError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(ParseEnumError::new("sort order", raw, &["asc", "desc"])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_requires_exactly_one_identifier() {
        assert_eq!(
            RuleSelector::from_pair(Some("r".into()), None),
            Some(RuleSelector::RuleId("r".into()))
        );
        assert_eq!(
            RuleSelector::from_pair(None, Some("i".into())),
            Some(RuleSelector::Id("i".into()))
        );
        assert_eq!(RuleSelector::from_pair(None, None), None);
        assert_eq!(RuleSelector::from_pair(Some("r".into()), Some("i".into())), None);
    }

    #[test]
    fn selector_maps_to_lookup_query() {
        let selector = RuleSelector::Id("abc".into());
        assert_eq!(selector.query(), vec![("id".to_string(), "abc".to_string())]);
        assert_eq!(selector.to_string(), "id 'abc'");
    }

    #[test]
    fn sort_field_round_trips_every_known_name() {
        for name in SortField::ALL {
            assert_eq!(name.parse::<SortField>().unwrap().as_str(), *name);
        }
        assert!("risk".parse::<SortField>().is_err());
    }
}
