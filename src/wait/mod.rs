//! Polling waits on custom resource status conditions

pub mod condition;
pub mod poll;
pub mod source;

use std::time::Duration;

pub use condition::{ConditionStatus, ExpectedCondition, Mismatch, StatusCondition, find_condition};
pub use poll::{PollOutcome, WaitError, poll_until, wait_until_exists};
pub use source::{
    ClusterConditionSource, ConditionSource, FetchError, HasConditions, KubeConditionSource,
    filter_missing_resource_error, is_missing_resource_error,
};

/// Poll `source` until the named object carries the expected condition.
///
/// Missing objects and transient API failures keep the wait going; any other fetch
/// error ends it. On timeout the error carries the last mismatch observed.
pub async fn wait_for_condition<S>(
    source: &S,
    name: &str,
    namespace: &str,
    expected: &ExpectedCondition,
    interval: Duration,
    timeout: Duration,
) -> Result<(), WaitError>
where
    S: ConditionSource + ?Sized,
{
    let resource = if namespace.is_empty() {
        format!("{} {}", source.kind(), name)
    } else {
        format!("{} {}/{}", source.kind(), namespace, name)
    };
    tracing::info!(%resource, condition = %expected, "waiting for condition");

    poll_until(&resource, interval, timeout, move || async move {
        match source.fetch_conditions(name, namespace).await {
            Ok(conditions) => match expected.evaluate(&conditions) {
                Ok(()) => PollOutcome::Satisfied,
                Err(mismatch) => PollOutcome::Pending(mismatch),
            },
            Err(err) => PollOutcome::from_fetch_error(err),
        }
    })
    .await
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Hands out scripted fetch results, repeating the last one forever
    pub struct ScriptedSource {
        script: Mutex<Vec<Result<Vec<StatusCondition>, FetchError>>>,
        pub calls: Mutex<u32>,
    }

    impl ScriptedSource {
        pub fn new(script: Vec<Result<Vec<StatusCondition>, FetchError>>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: Mutex::new(0),
            }
        }

        pub fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    impl ConditionSource for ScriptedSource {
        fn kind(&self) -> String {
            "clustergroupupgrade".to_string()
        }

        async fn fetch_conditions(
            &self,
            _name: &str,
            _namespace: &str,
        ) -> Result<Vec<StatusCondition>, FetchError> {
            *self.calls.lock().unwrap() += 1;
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedSource;
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(5);
    const TIMEOUT: Duration = Duration::from_secs(30);

    fn progressing(status: ConditionStatus, reason: &str) -> Vec<StatusCondition> {
        vec![StatusCondition::new("Progressing", status, reason, "")]
    }

    #[tokio::test(start_paused = true)]
    async fn test_satisfied_after_a_few_polls() {
        let source = ScriptedSource::new(vec![
            Err(FetchError::Missing("cgu \"x\" not found".to_string())),
            Ok(progressing(ConditionStatus::True, "InProgress")),
            Ok(progressing(ConditionStatus::False, "Completed")),
        ]);
        let expected = ExpectedCondition::new("Progressing")
            .with_status(ConditionStatus::False)
            .with_reason("Completed");

        let result = wait_for_condition(&source, "x", "ztp-install", &expected, INTERVAL, TIMEOUT).await;
        tokio_test::assert_ok!(result);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_last_status() {
        let source = ScriptedSource::new(vec![Ok(progressing(ConditionStatus::True, "InProgress"))]);
        let expected = ExpectedCondition::new("Progressing").with_status(ConditionStatus::False);

        let err = wait_for_condition(&source, "x", "ztp-install", &expected, INTERVAL, TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(
            err.last_mismatch(),
            Some(&Mismatch::Status {
                actual: ConditionStatus::True,
                expected: ConditionStatus::False
            })
        );
        assert_eq!(
            err.to_string(),
            "actual status 'True' did not match expected status 'False'"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_fetch_aborts() {
        let source = ScriptedSource::new(vec![Err(FetchError::Fatal("Unauthorized".to_string()))]);
        let expected = ExpectedCondition::new("Progressing");

        let result = wait_for_condition(&source, "x", "ztp-install", &expected, INTERVAL, TIMEOUT).await;
        assert!(matches!(result, Err(WaitError::Fetch { .. })));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_refused_keeps_waiting() {
        let source = ScriptedSource::new(vec![
            Err(FetchError::classify(
                "HyperError: error trying to connect: tcp connect error: Connection refused",
            )),
            Err(FetchError::Transient("ApiError: etcdserver: request timed out".to_string())),
            Ok(progressing(ConditionStatus::True, "InProgress")),
        ]);
        let expected = ExpectedCondition::new("Progressing").with_status(ConditionStatus::True);

        let result = wait_for_condition(&source, "x", "ztp-install", &expected, INTERVAL, TIMEOUT).await;
        tokio_test::assert_ok!(result);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_found_times_out_as_unavailable() {
        let source = ScriptedSource::new(vec![Err(FetchError::Missing("not found".to_string()))]);
        let expected = ExpectedCondition::new("Progressing");

        let result = wait_for_condition(&source, "x", "ztp-install", &expected, INTERVAL, TIMEOUT).await;
        assert!(matches!(
            result.unwrap_err().last_mismatch(),
            Some(Mismatch::Unavailable(_))
        ));
    }
}
