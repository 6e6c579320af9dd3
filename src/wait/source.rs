//! Where conditions come from

use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use std::fmt::{Debug, Display};
use std::future::Future;
use std::marker::PhantomData;
use thiserror::Error;

use super::condition::StatusCondition;

/// Fragments of API errors that mean "this object or its kind does not exist yet"
const MISSING_RESOURCE_FRAGMENTS: &[&str] = &[
    "server could not find the requested resource",
    "no matches for kind",
    "not found",
];

/// True when the error text says the resource is missing rather than broken
pub fn is_missing_resource_error(message: &str) -> bool {
    MISSING_RESOURCE_FRAGMENTS
        .iter()
        .any(|fragment| message.contains(fragment))
}

/// Swallow missing-resource errors, keep everything else
pub fn filter_missing_resource_error<E: Display>(err: Option<E>) -> Option<E> {
    err.filter(|e| !is_missing_resource_error(&e.to_string()))
}

/// Fragments of errors that say the API server could not be reached or asked us to
/// back off
const TRANSIENT_ERROR_FRAGMENTS: &[&str] = &[
    "connection refused",
    "connection reset",
    "broken pipe",
    "timed out",
    "HyperError",
    "ServiceError",
    "TooManyRequests",
    "ServiceUnavailable",
    "InternalError",
];

/// HTTP status codes of API errors worth retrying
const TRANSIENT_STATUS_CODES: &[u16] = &[429, 500, 502, 503, 504];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Object or kind not there (yet); keep waiting
    #[error("{0}")]
    Missing(String),

    /// API server unreachable, overloaded or failing; keep waiting
    #[error("{0}")]
    Transient(String),

    /// Anything else; stop waiting
    #[error("{0}")]
    Fatal(String),
}

impl FetchError {
    /// Classify from the error text alone
    pub fn classify(err: impl Display) -> Self {
        let message = err.to_string();
        if is_missing_resource_error(&message) {
            Self::Missing(message)
        } else if TRANSIENT_ERROR_FRAGMENTS
            .iter()
            .any(|fragment| message.contains(fragment))
        {
            Self::Transient(message)
        } else {
            Self::Fatal(message)
        }
    }

    /// Classify a client error. Status codes decide for API errors, connection level
    /// failures are always retried.
    pub fn from_kube(err: &kube::Error) -> Self {
        let message = err.to_string();
        match err {
            kube::Error::Api(response) if response.code == 404 => Self::Missing(message),
            kube::Error::Api(response) if TRANSIENT_STATUS_CODES.contains(&response.code) => {
                Self::Transient(message)
            }
            kube::Error::Api(_) => Self::Fatal(message),
            kube::Error::HyperError(_) | kube::Error::Service(_) => Self::Transient(message),
            _ => Self::classify(message),
        }
    }

    /// Whether polling should carry on after this error
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Fatal(_))
    }
}

/// Something that can report the current conditions of a named object
pub trait ConditionSource {
    /// Kind of the object, for messages
    fn kind(&self) -> String;

    fn fetch_conditions(
        &self,
        name: &str,
        namespace: &str,
    ) -> impl Future<Output = Result<Vec<StatusCondition>, FetchError>> + Send;
}

/// Custom resources exposing conditions in their status
pub trait HasConditions {
    fn conditions(&self) -> &[StatusCondition];
}

/// Reads conditions of a namespaced custom resource through the API server
pub struct KubeConditionSource<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeConditionSource<K> {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

impl<K> ConditionSource for KubeConditionSource<K>
where
    K: Resource<Scope = kube::core::NamespaceResourceScope, DynamicType = ()>
        + HasConditions
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static,
{
    fn kind(&self) -> String {
        K::kind(&()).to_lowercase()
    }

    async fn fetch_conditions(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Vec<StatusCondition>, FetchError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let object = api.get(name).await.map_err(|e| FetchError::from_kube(&e))?;
        Ok(object.conditions().to_vec())
    }
}

/// Reads conditions of a cluster scoped custom resource; the namespace is ignored
pub struct ClusterConditionSource<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> ClusterConditionSource<K> {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

impl<K> ConditionSource for ClusterConditionSource<K>
where
    K: Resource<Scope = kube::core::ClusterResourceScope, DynamicType = ()>
        + HasConditions
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static,
{
    fn kind(&self) -> String {
        K::kind(&()).to_lowercase()
    }

    async fn fetch_conditions(
        &self,
        name: &str,
        _namespace: &str,
    ) -> Result<Vec<StatusCondition>, FetchError> {
        let api: Api<K> = Api::all(self.client.clone());
        let object = api.get(name).await.map_err(|e| FetchError::from_kube(&e))?;
        Ok(object.conditions().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_resource_errors() {
        assert!(is_missing_resource_error(
            "the server could not find the requested resource (get clustergroupupgrades.ran.openshift.io)"
        ));
        assert!(is_missing_resource_error(
            "no matches for kind \"ClusterGroupUpgrade\" in version \"ran.openshift.io/v1alpha1\""
        ));
        assert!(is_missing_resource_error(
            "clustergroupupgrades.ran.openshift.io \"talm-cgu\" not found"
        ));
        assert!(!is_missing_resource_error("Unauthorized"));
    }

    #[test]
    fn test_filter_missing_resource_error() {
        assert_eq!(filter_missing_resource_error(Some("x not found")), None);
        assert_eq!(
            filter_missing_resource_error(Some("connection refused")),
            Some("connection refused")
        );
        assert_eq!(filter_missing_resource_error::<String>(None), None);
    }

    #[test]
    fn test_classify() {
        assert!(matches!(
            FetchError::classify("policies \"p\" not found"),
            FetchError::Missing(_)
        ));
        assert_eq!(
            FetchError::classify("forbidden: user cannot get"),
            FetchError::Fatal("forbidden: user cannot get".to_string())
        );
        assert!(matches!(
            FetchError::classify(
                "HyperError: error trying to connect: tcp connect error: Connection refused (os error 111): connection refused"
            ),
            FetchError::Transient(_)
        ));
    }

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: format!("request failed with {}", reason),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn test_from_kube_status_codes() {
        assert!(matches!(
            FetchError::from_kube(&api_error(404, "NotFound")),
            FetchError::Missing(_)
        ));
        for code in [429, 500, 502, 503, 504] {
            let err = FetchError::from_kube(&api_error(code, "ServiceUnavailable"));
            assert!(matches!(err, FetchError::Transient(_)), "code {}", code);
            assert!(err.is_retryable());
        }
        for code in [400, 401, 403] {
            let err = FetchError::from_kube(&api_error(code, "Forbidden"));
            assert!(matches!(err, FetchError::Fatal(_)), "code {}", code);
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn test_from_kube_service_error_is_transient() {
        let err = kube::Error::Service("connection reset by peer".into());
        assert!(matches!(FetchError::from_kube(&err), FetchError::Transient(_)));
    }
}
