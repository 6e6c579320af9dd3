//! Condition names and messages that changed between TALM releases

use crate::version::{VersionError, is_version_string_in_range};
use crate::wait::{ConditionStatus, ExpectedCondition};

/// First TALM release reporting the `Succeeded`/`Validated` conditions
pub const TALM_UPDATED_CONDITIONS_VERSION: &str = "4.12";

pub const READY_TYPE: &str = "Ready";
pub const SUCCEEDED_TYPE: &str = "Succeeded";
pub const VALIDATED_TYPE: &str = "Validated";
pub const PROGRESSING_TYPE: &str = "Progressing";

pub const CONDITION_REASON_COMPLETED: &str = "Completed";
pub const CONDITION_REASON_UPGRADE_COMPLETED: &str = "UpgradeCompleted";

pub const TALM_411_TIMEOUT_MESSAGE: &str =
    "The ClusterGroupUpgrade CR policies are taking too long to complete";
pub const TALM_412_TIMEOUT_MESSAGE: &str = "Policy remediation took too long";
pub const TALM_412_CANARY_TIMEOUT_MESSAGE: &str = "Policy remediation took too long on canary clusters";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConditionVocabulary {
    pub completed_type: &'static str,
    pub completed_reason: &'static str,
    pub timeout_type: &'static str,
    pub timeout_message: &'static str,
    pub canary_timeout_message: &'static str,
    pub validated_type: &'static str,
    missing_policies_prefix: &'static str,
}

const LEGACY: ConditionVocabulary = ConditionVocabulary {
    completed_type: READY_TYPE,
    completed_reason: CONDITION_REASON_UPGRADE_COMPLETED,
    timeout_type: READY_TYPE,
    timeout_message: TALM_411_TIMEOUT_MESSAGE,
    canary_timeout_message: TALM_411_TIMEOUT_MESSAGE,
    validated_type: READY_TYPE,
    missing_policies_prefix: "The ClusterGroupUpgrade CR has: missing managed policies",
};

const CURRENT: ConditionVocabulary = ConditionVocabulary {
    completed_type: SUCCEEDED_TYPE,
    completed_reason: CONDITION_REASON_COMPLETED,
    timeout_type: SUCCEEDED_TYPE,
    timeout_message: TALM_412_TIMEOUT_MESSAGE,
    canary_timeout_message: TALM_412_CANARY_TIMEOUT_MESSAGE,
    validated_type: VALIDATED_TYPE,
    missing_policies_prefix: "Missing managed policies",
};

/// Version ranges (inclusive, empty = open) and the vocabulary they use
const VOCABULARIES: &[(&str, &str, ConditionVocabulary)] = &[
    ("", "4.11", LEGACY),
    (TALM_UPDATED_CONDITIONS_VERSION, "", CURRENT),
];

impl ConditionVocabulary {
    /// Vocabulary spoken by the given TALM version; unknown versions get the newest one
    pub fn for_talm_version(version: &str) -> Result<&'static Self, VersionError> {
        for (minimum, maximum, vocabulary) in VOCABULARIES {
            if is_version_string_in_range(version, minimum, maximum)? {
                return Ok(vocabulary);
            }
        }
        Ok(&CURRENT)
    }

    pub fn is_legacy(&self) -> bool {
        self.completed_type == READY_TYPE
    }

    /// Upgrade finished and all clusters are compliant
    pub fn completed(&self) -> ExpectedCondition {
        ExpectedCondition::new(self.completed_type)
            .with_status(ConditionStatus::True)
            .with_reason(self.completed_reason)
    }

    /// Remediation hit the CGU timeout
    pub fn timed_out(&self) -> ExpectedCondition {
        ExpectedCondition::new(self.timeout_type).with_message_containing(self.timeout_message)
    }

    /// Remediation hit the CGU timeout while still on the canaries
    pub fn canary_timed_out(&self) -> ExpectedCondition {
        ExpectedCondition::new(self.timeout_type)
            .with_message_containing(self.canary_timeout_message)
    }

    /// Validation failed because managed policies do not exist
    pub fn missing_policies(&self, policies: &[String]) -> ExpectedCondition {
        ExpectedCondition::new(self.validated_type).with_message_containing(format!(
            "{}: [{}]",
            self.missing_policies_prefix,
            policies.join(" ")
        ))
    }
}
