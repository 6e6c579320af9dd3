//! Status conditions and the expectations tests place on them

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Status of a Kubernetes-style condition
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

impl std::str::FromStr for ConditionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "true" => Ok(Self::True),
            "false" => Ok(Self::False),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("invalid condition status: {}", other)),
        }
    }
}

/// A condition as reported in the status of a custom resource
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusCondition {
    #[serde(rename = "type")]
    pub type_: String,

    #[serde(default)]
    pub status: ConditionStatus,

    #[serde(default)]
    pub reason: String,

    #[serde(default)]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl StatusCondition {
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: None,
        }
    }
}

/// Find the condition with the given type
pub fn find_condition<'a>(
    conditions: &'a [StatusCondition],
    condition_type: &str,
) -> Option<&'a StatusCondition> {
    conditions.iter().find(|c| c.type_ == condition_type)
}

/// Why the observed conditions did not satisfy the expectation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Mismatch {
    #[error("condition for type '{condition_type}' was not present")]
    TypeNotPresent { condition_type: String },

    #[error("actual status '{actual}' did not match expected status '{expected}'")]
    Status {
        actual: ConditionStatus,
        expected: ConditionStatus,
    },

    #[error("actual reason '{actual}' did not match expected reason '{expected}'")]
    Reason { actual: String, expected: String },

    #[error("actual message '{actual}' did not contain expected message '{expected}'")]
    Message { actual: String, expected: String },

    /// The resource could not be fetched, but the error was worth retrying
    #[error("resource not available yet: {0}")]
    Unavailable(String),

    /// Free-form mismatch for waits that are not about a single condition
    #[error("{0}")]
    Other(String),
}

/// The condition a test waits for.
///
/// Only `condition_type` is required. With no other field set, the mere presence of a
/// condition of that type satisfies the expectation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExpectedCondition {
    pub condition_type: String,
    pub status: Option<ConditionStatus>,
    pub reason: Option<String>,
    pub message: Option<String>,
}

impl ExpectedCondition {
    pub fn new(condition_type: impl Into<String>) -> Self {
        Self {
            condition_type: condition_type.into(),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: ConditionStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Reason must match exactly; an empty string leaves it unchecked
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into()).filter(|r: &String| !r.is_empty());
        self
    }

    /// Message must contain this text; an empty string leaves it unchecked
    pub fn with_message_containing(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into()).filter(|m: &String| !m.is_empty());
        self
    }

    /// Check status, then reason, then message; report the first mismatch
    pub fn evaluate(&self, conditions: &[StatusCondition]) -> Result<(), Mismatch> {
        let Some(condition) = find_condition(conditions, &self.condition_type) else {
            return Err(Mismatch::TypeNotPresent {
                condition_type: self.condition_type.clone(),
            });
        };

        if let Some(expected) = self.status
            && condition.status != expected
        {
            return Err(Mismatch::Status {
                actual: condition.status,
                expected,
            });
        }

        if let Some(expected) = &self.reason
            && &condition.reason != expected
        {
            return Err(Mismatch::Reason {
                actual: condition.reason.clone(),
                expected: expected.clone(),
            });
        }

        if let Some(expected) = &self.message
            && !condition.message.contains(expected.as_str())
        {
            return Err(Mismatch::Message {
                actual: condition.message.clone(),
                expected: expected.clone(),
            });
        }

        Ok(())
    }
}

impl fmt::Display for ExpectedCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.condition_type)?;
        if let Some(status) = self.status {
            write!(f, "={}", status)?;
        }
        if let Some(reason) = &self.reason {
            write!(f, ", with reason: {}", reason)?;
        }
        if let Some(message) = &self.message {
            write!(f, ", with message containing: '{}'", message)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn succeeded() -> StatusCondition {
        StatusCondition::new(
            "Succeeded",
            ConditionStatus::True,
            "Completed",
            "All clusters are compliant with all the managed policies",
        )
    }

    #[test]
    fn test_presence_only() {
        let expected = ExpectedCondition::new("Succeeded");
        assert_eq!(expected.evaluate(&[succeeded()]), Ok(()));

        let mut failed = succeeded();
        failed.status = ConditionStatus::False;
        assert_eq!(expected.evaluate(&[failed]), Ok(()));
    }

    #[test]
    fn test_missing_type() {
        let expected = ExpectedCondition::new("Progressing");
        assert_eq!(
            expected.evaluate(&[succeeded()]),
            Err(Mismatch::TypeNotPresent {
                condition_type: "Progressing".to_string()
            })
        );
        assert!(expected.evaluate(&[]).is_err());
    }

    #[test]
    fn test_status_checked_before_reason() {
        let expected = ExpectedCondition::new("Succeeded")
            .with_status(ConditionStatus::False)
            .with_reason("TimedOut");
        assert_eq!(
            expected.evaluate(&[succeeded()]),
            Err(Mismatch::Status {
                actual: ConditionStatus::True,
                expected: ConditionStatus::False
            })
        );
    }

    #[test]
    fn test_reason_checked_before_message() {
        let expected = ExpectedCondition::new("Succeeded")
            .with_reason("TimedOut")
            .with_message_containing("took too long");
        let err = expected.evaluate(&[succeeded()]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "actual reason 'Completed' did not match expected reason 'TimedOut'"
        );
    }

    #[test]
    fn test_message_is_substring_match() {
        let expected = ExpectedCondition::new("Succeeded").with_message_containing("compliant");
        assert_eq!(expected.evaluate(&[succeeded()]), Ok(()));

        let expected = ExpectedCondition::new("Succeeded").with_message_containing("took too long");
        assert!(matches!(
            expected.evaluate(&[succeeded()]),
            Err(Mismatch::Message { .. })
        ));
    }

    #[test]
    fn test_empty_strings_leave_fields_unchecked() {
        let expected = ExpectedCondition::new("Succeeded")
            .with_reason("")
            .with_message_containing("");
        assert_eq!(expected, ExpectedCondition::new("Succeeded"));
    }

    #[test]
    fn test_condition_deserializes_from_api_shape() {
        let json = r#"{"type":"Progressing","status":"False","reason":"Completed","message":"done","lastTransitionTime":"2024-01-01T00:00:00Z"}"#;
        let condition: StatusCondition = serde_json::from_str(json).unwrap();
        assert_eq!(condition.type_, "Progressing");
        assert_eq!(condition.status, ConditionStatus::False);
        assert_eq!(condition.last_transition_time.as_deref(), Some("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn test_display() {
        let expected = ExpectedCondition::new("Ready")
            .with_status(ConditionStatus::True)
            .with_reason("UpgradeCompleted");
        assert_eq!(expected.to_string(), "Ready=True, with reason: UpgradeCompleted");
    }
}
