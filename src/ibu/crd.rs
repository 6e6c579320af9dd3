//! ImageBasedUpgrade custom resource of the lifecycle agent

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::IbuError;
use crate::wait::{ConditionStatus, ExpectedCondition, HasConditions, StatusCondition};

/// Desired state of the single node image based upgrade
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "lca.openshift.io",
    version = "v1alpha1",
    kind = "ImageBasedUpgrade",
    plural = "imagebasedupgrades",
    shortname = "ibu",
    status = "ImageBasedUpgradeStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ImageBasedUpgradeSpec {
    #[serde(default)]
    pub stage: IbuStage,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_image_ref: Option<SeedImageRef>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct SeedImageRef {
    #[serde(default)]
    pub image: String,

    /// OCP version the seed was built from
    #[serde(default)]
    pub version: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageBasedUpgradeStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<StatusCondition>,
}

impl HasConditions for ImageBasedUpgrade {
    fn conditions(&self) -> &[StatusCondition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }
}

/// Stages an upgrade walks through: Idle, Prep, Upgrade and back to Idle, with Rollback
/// as the way back from a failed upgrade
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum IbuStage {
    #[default]
    Idle,
    Prep,
    Upgrade,
    Rollback,
}

impl IbuStage {
    const ALL: [Self; 4] = [Self::Idle, Self::Prep, Self::Upgrade, Self::Rollback];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Prep => "Prep",
            Self::Upgrade => "Upgrade",
            Self::Rollback => "Rollback",
        }
    }

    /// Condition the lifecycle agent sets once the stage is done
    pub fn completed_condition(&self) -> ExpectedCondition {
        let condition_type = match self {
            Self::Idle => "Idle",
            Self::Prep => "PrepCompleted",
            Self::Upgrade => "UpgradeCompleted",
            Self::Rollback => "RollbackCompleted",
        };
        ExpectedCondition::new(condition_type).with_status(ConditionStatus::True)
    }

    /// Whether the lifecycle agent accepts moving from `self` to `next`.
    ///
    /// Going back to Idle aborts a prep or finalizes an upgrade or rollback.
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Prep)
                | (Self::Prep, Self::Upgrade)
                | (Self::Prep, Self::Idle)
                | (Self::Upgrade, Self::Idle)
                | (Self::Upgrade, Self::Rollback)
                | (Self::Rollback, Self::Idle)
        ) || *self == next
    }
}

impl fmt::Display for IbuStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IbuStage {
    type Err = IbuError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| IbuError::UnknownStage(s.to_string()))
    }
}
