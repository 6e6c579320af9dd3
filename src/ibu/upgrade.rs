//! Driving the ImageBasedUpgrade through its stages

use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use serde_json::json;
use std::time::Duration;

use super::crd::{IbuStage, ImageBasedUpgrade, SeedImageRef};
use super::{IBU_CR_NAME, IbuError};
use crate::wait::{ClusterConditionSource, FetchError, WaitError, wait_for_condition};

pub const IBU_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Image based upgrade operations against one single node cluster
#[derive(Clone)]
pub struct Ibu {
    client: Client,
    name: String,
    poll_interval: Duration,
}

impl Ibu {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            name: IBU_CR_NAME.to_string(),
            poll_interval: IBU_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn api(&self) -> Api<ImageBasedUpgrade> {
        Api::all(self.client.clone())
    }

    pub async fn get(&self) -> Result<ImageBasedUpgrade, IbuError> {
        Ok(self.api().get(&self.name).await?)
    }

    /// Whether the lifecycle agent has created the upgrade object
    pub async fn exists(&self) -> Result<bool, IbuError> {
        match self.api().get(&self.name).await {
            Ok(_) => Ok(true),
            Err(e) if matches!(FetchError::from_kube(&e), FetchError::Missing(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn set_seed_image(&self, image: &str, version: &str) -> Result<(), IbuError> {
        let seed = SeedImageRef {
            image: image.to_string(),
            version: version.to_string(),
        };
        let patch = json!({ "spec": { "seedImageRef": seed } });
        self.api()
            .patch(&self.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        crate::log_info!("Seed image set to {} ({})", image, version);
        Ok(())
    }

    /// Move the upgrade to `stage`. Staying in the current stage is a no-op.
    pub async fn set_stage(&self, stage: IbuStage) -> Result<(), IbuError> {
        let current = self.get().await?.spec.stage;

        if current == stage {
            crate::log_info!("Image based upgrade is already in stage {}", stage);
            return Ok(());
        }
        if !current.can_transition_to(stage) {
            return Err(IbuError::InvalidTransition {
                from: current,
                to: stage,
            });
        }

        let patch = json!({ "spec": { "stage": stage } });
        self.api()
            .patch(&self.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        crate::log_info!("Image based upgrade moved from {} to {}", current, stage);
        Ok(())
    }

    /// Wait until the lifecycle agent reports `stage` as completed.
    ///
    /// The upgrade stage reboots the node, so the API going away meanwhile only delays
    /// the wait.
    pub async fn wait_for_stage(
        &self,
        stage: IbuStage,
        timeout: Duration,
    ) -> Result<(), WaitError> {
        let source = ClusterConditionSource::<ImageBasedUpgrade>::new(self.client.clone());
        wait_for_condition(
            &source,
            &self.name,
            "",
            &stage.completed_condition(),
            self.poll_interval,
            timeout,
        )
        .await
    }

    pub async fn set_stage_and_wait(
        &self,
        stage: IbuStage,
        timeout: Duration,
    ) -> Result<(), IbuError> {
        self.set_stage(stage).await?;
        self.wait_for_stage(stage, timeout).await?;
        Ok(())
    }
}
