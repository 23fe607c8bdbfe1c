use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Closed [start, end] timestamp pair. Pure value, equality by both
/// endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DependentCycle {
    Hour,
    Day,
    Week,
    Month,
}

/// Relative date-window selector evaluated against a reference instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum DependentDateValue {
    CurrentHour,
    Last1Hour,
    Last24Hours,
    Today,
    Last1Days,
    Last2Days,
    Last3Days,
    Last7Days,
    LastWeek,
    LastMonday,
    ThisMonth,
    LastMonth,
}

/// Reference to a prior run of another workflow (or a single task
/// within it) that gates execution of the current task.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependentItem {
    pub definition_code: i64,
    /// `None` targets the whole workflow run ("all tasks").
    pub dep_task_code: Option<i64>,
    pub cycle: DependentCycle,
    pub date_value: DependentDateValue,
}

impl DependentItem {
    /// Cache key for a fully-resolved item result.
    pub fn result_key(&self) -> DependentResultKey {
        DependentResultKey {
            definition_code: self.definition_code,
            dep_task_code: self.dep_task_code,
            cycle: self.cycle,
            date_value: self.date_value,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependentResultKey {
    pub definition_code: i64,
    pub dep_task_code: Option<i64>,
    pub cycle: DependentCycle,
    pub date_value: DependentDateValue,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum DependentRelation {
    And,
    Or,
}

/// Outcome of a dependency evaluation. WAITING is an ordinary
/// intermediate value, never an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum DependResult {
    Success,
    Failed,
    Waiting,
}

impl DependResult {
    /// Severity order used when folding window results: FAILED beats
    /// WAITING beats SUCCESS.
    pub fn worst(self, other: DependResult) -> DependResult {
        use DependResult::*;
        match (self, other) {
            (Failed, _) | (_, Failed) => Failed,
            (Waiting, _) | (_, Waiting) => Waiting,
            _ => Success,
        }
    }

    pub fn is_decided(&self) -> bool {
        !matches!(self, DependResult::Waiting)
    }
}

/// What to do once the combined dependency result is FAILED.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum DependentFailurePolicy {
    #[default]
    FailFast,
    WaitOnFailure,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_prefers_failure_over_waiting() {
        assert_eq!(
            DependResult::Waiting.worst(DependResult::Failed),
            DependResult::Failed
        );
        assert_eq!(
            DependResult::Success.worst(DependResult::Waiting),
            DependResult::Waiting
        );
        assert_eq!(
            DependResult::Success.worst(DependResult::Success),
            DependResult::Success
        );
    }

    #[test]
    fn date_value_parses_wire_names() {
        assert_eq!(
            "last2Days".parse::<DependentDateValue>().unwrap(),
            DependentDateValue::Last2Days
        );
        assert_eq!(DependentDateValue::LastMonday.to_string(), "lastMonday");
    }
}
