//! Per-RPC credentials for gRPC clients backed by a credential helper.
//!
//! [`PerRpcCredentials`] fetches headers for the URI of a gRPC call and turns
//! them into request metadata. gRPC metadata holds a single value per key, so
//! headers with more than one value are rejected.
//!
//! ```no_run
//! use credential_helper::{CacheOptions, CachingCredentialHelper, Client, PerRpcCredentials};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let helper = CachingCredentialHelper::new(Client::new("my-helper")?, CacheOptions::default())?;
//! let credentials = PerRpcCredentials::new(helper);
//!
//! let mut request = tonic::Request::new(());
//! credentials
//!     .apply("grpcs://example.com", request.metadata_mut())
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::error::Error;
use crate::helper::CredentialHelper;
use crate::protocol::GetCredentialsRequest;
use std::collections::HashMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue, MetadataMap};

/// Errors produced while turning credentials into request metadata.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AdapterError {
    /// Credentials are fetched for exactly one URI per call.
    #[error("expected exactly one uri to get credentials for, got {0}")]
    UriCount(usize),

    /// A header carries more than one value.
    #[error("header {header:?} has more than one value")]
    MultipleValues {
        /// The header name.
        header: String,
    },

    /// A header name or value is not valid ASCII metadata.
    #[error("header {header:?} is not valid request metadata")]
    InvalidMetadata {
        /// The header name.
        header: String,
    },

    /// The credential helper failed.
    #[error("could not get credentials: {0}")]
    Fetch(#[source] Error),
}

impl From<AdapterError> for tonic::Status {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Fetch(_) => tonic::Status::unauthenticated(err.to_string()),
            _ => tonic::Status::internal(err.to_string()),
        }
    }
}

/// Adapts a [`CredentialHelper`] to gRPC per-call credentials.
#[derive(Debug, Clone)]
pub struct PerRpcCredentials<H> {
    helper: H,
}

impl<H: CredentialHelper> PerRpcCredentials<H> {
    /// Creates per-call credentials fetched from `helper`.
    pub fn new(helper: H) -> Self {
        Self { helper }
    }

    /// Returns the underlying credential helper.
    pub fn helper(&self) -> &H {
        &self.helper
    }

    /// Fetches the metadata to attach to a call to the single URI in `uris`.
    ///
    /// Headers without values are left out.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::UriCount`] unless exactly one URI is given,
    /// [`AdapterError::Fetch`] if the helper fails and
    /// [`AdapterError::MultipleValues`] for headers with more than one value.
    pub async fn get_request_metadata(
        &self,
        uris: &[&str],
    ) -> Result<HashMap<String, String>, AdapterError> {
        let [uri] = uris else {
            return Err(AdapterError::UriCount(uris.len()));
        };

        let response = self
            .helper
            .get_credentials(&GetCredentialsRequest::new(*uri), &[], &CancellationToken::new())
            .await
            .map_err(AdapterError::Fetch)?;

        let mut metadata = HashMap::with_capacity(response.headers.len());
        for (header, mut values) in response.headers {
            match values.len() {
                0 => {}
                1 => {
                    metadata.insert(header, values.remove(0));
                }
                _ => return Err(AdapterError::MultipleValues { header }),
            }
        }
        Ok(metadata)
    }

    /// Credentials are handed out over insecure channels as well.
    pub fn require_transport_security(&self) -> bool {
        false
    }

    /// Fetches credentials for `uri` and inserts them into `metadata`.
    ///
    /// # Errors
    ///
    /// Fails like [`get_request_metadata`](Self::get_request_metadata), or with
    /// [`AdapterError::InvalidMetadata`] for headers that cannot be sent as
    /// ASCII metadata.
    pub async fn apply(&self, uri: &str, metadata: &mut MetadataMap) -> Result<(), AdapterError> {
        for (header, value) in self.get_request_metadata(&[uri]).await? {
            let (Ok(key), Ok(value)) = (
                header.parse::<AsciiMetadataKey>(),
                value.parse::<AsciiMetadataValue>(),
            ) else {
                return Err(AdapterError::InvalidMetadata { header });
            };
            metadata.insert(key, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper::CredentialsFuture;
    use crate::protocol::GetCredentialsResponse;

    #[derive(Debug)]
    struct StaticHelper(GetCredentialsResponse);

    impl CredentialHelper for StaticHelper {
        fn get_credentials<'a>(
            &'a self,
            _request: &'a GetCredentialsRequest,
            _extra_parameters: &'a [String],
            _cancel: &'a CancellationToken,
        ) -> CredentialsFuture<'a> {
            Box::pin(async move { Ok(self.0.clone()) })
        }
    }

    fn credentials(headers: &[(&str, &[&str])]) -> PerRpcCredentials<StaticHelper> {
        PerRpcCredentials::new(StaticHelper(GetCredentialsResponse::with_headers(
            headers
                .iter()
                .map(|(name, values)| (*name, values.to_vec())),
        )))
    }

    #[tokio::test]
    async fn test_single_values_are_passed_through() {
        let credentials = credentials(&[("authorization", &["Bearer abc"]), ("x-empty", &[])]);

        let metadata = credentials
            .get_request_metadata(&["grpcs://example.com"])
            .await
            .unwrap();

        assert_eq!(
            metadata,
            HashMap::from([("authorization".to_string(), "Bearer abc".to_string())])
        );
    }

    #[tokio::test]
    async fn test_multiple_values_are_rejected() {
        let credentials = credentials(&[("a", &["1", "2"])]);

        let err = credentials
            .get_request_metadata(&["grpcs://example.com"])
            .await
            .unwrap_err();

        assert!(matches!(err, AdapterError::MultipleValues { ref header } if header == "a"));
        assert_eq!(tonic::Status::from(err).code(), tonic::Code::Internal);
    }

    macro_rules! uri_count_tests {
        ($($name:ident: $uris:expr,)*) => {
            $(
                #[tokio::test]
                async fn $name() {
                    let uris: &[&str] = $uris;
                    let err = credentials(&[])
                        .get_request_metadata(uris)
                        .await
                        .unwrap_err();
                    assert!(matches!(err, AdapterError::UriCount(n) if n == uris.len()));
                }
            )*
        };
    }

    uri_count_tests! {
        test_no_uri: &[],
        test_two_uris: &["grpcs://a.example.com", "grpcs://b.example.com"],
    }

    #[tokio::test]
    async fn test_fetch_failure_is_unauthenticated() {
        let credentials = PerRpcCredentials::new(crate::UnsupportedCredentialHelper);

        let err = credentials
            .get_request_metadata(&["grpcs://example.com"])
            .await
            .unwrap_err();

        assert!(matches!(err, AdapterError::Fetch(Error::Unsupported { .. })));
        assert_eq!(tonic::Status::from(err).code(), tonic::Code::Unauthenticated);
    }

    #[tokio::test]
    async fn test_apply_inserts_metadata() {
        let credentials = credentials(&[("Authorization", &["Bearer abc"])]);
        let mut metadata = MetadataMap::new();

        credentials
            .apply("grpcs://example.com", &mut metadata)
            .await
            .unwrap();

        assert_eq!(
            metadata.get("authorization").and_then(|v| v.to_str().ok()),
            Some("Bearer abc")
        );
    }

    #[tokio::test]
    async fn test_apply_rejects_invalid_metadata() {
        let credentials = credentials(&[("authorization", &["line\nbreak"])]);
        let mut metadata = MetadataMap::new();

        let err = credentials
            .apply("grpcs://example.com", &mut metadata)
            .await
            .unwrap_err();

        assert!(matches!(err, AdapterError::InvalidMetadata { .. }));
        assert!(metadata.is_empty());
    }

    #[test]
    fn test_require_transport_security() {
        assert!(!credentials(&[]).require_transport_security());
    }
}
