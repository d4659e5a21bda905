//! The credential helper capability.
//!
//! [`CredentialHelper`] is implemented by everything that can answer a
//! [`GetCredentialsRequest`]: the subprocess [`Client`](crate::Client), the
//! [`CachingCredentialHelper`](crate::CachingCredentialHelper) decorator, and
//! user code served through [`start_credential_helper`](crate::start_credential_helper).

use crate::error::Error;
use crate::protocol::{GetCredentialsRequest, GetCredentialsResponse};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Future returned by [`CredentialHelper::get_credentials`].
pub type CredentialsFuture<'a> =
    Pin<Box<dyn Future<Output = Result<GetCredentialsResponse, Error>> + Send + 'a>>;

/// A credential helper, or a connection to one.
///
/// Every protocol command has a default implementation that fails with
/// [`Error::Unsupported`], so an implementation only overrides the commands it
/// supports and keeps compiling when new commands are added.
///
/// # Example
///
/// ```
/// use credential_helper::{
///     CredentialHelper, CredentialsFuture, GetCredentialsRequest, GetCredentialsResponse,
/// };
/// use tokio_util::sync::CancellationToken;
///
/// #[derive(Debug)]
/// struct StaticToken(String);
///
/// impl CredentialHelper for StaticToken {
///     fn get_credentials<'a>(
///         &'a self,
///         _request: &'a GetCredentialsRequest,
///         _extra_parameters: &'a [String],
///         _cancel: &'a CancellationToken,
///     ) -> CredentialsFuture<'a> {
///         Box::pin(async move {
///             Ok(GetCredentialsResponse::with_headers([(
///                 "Authorization",
///                 vec![format!("Bearer {}", self.0)],
///             )]))
///         })
///     }
/// }
/// ```
pub trait CredentialHelper: Send + Sync {
    /// Fetches credentials for `request`.
    ///
    /// `extra_parameters` are passed to external helpers after the command
    /// name. Implementations should stop work and fail with
    /// [`Error::Cancelled`] once `cancel` is triggered.
    ///
    /// # Errors
    ///
    /// The default implementation always fails with [`Error::Unsupported`].
    fn get_credentials<'a>(
        &'a self,
        request: &'a GetCredentialsRequest,
        extra_parameters: &'a [String],
        cancel: &'a CancellationToken,
    ) -> CredentialsFuture<'a> {
        let _ = (request, extra_parameters, cancel);
        Box::pin(async { Err(Error::Unsupported { command: "get" }) })
    }
}

/// A credential helper that supports no command at all.
///
/// Useful as a placeholder, or to delegate to for commands a wrapper does not
/// handle itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedCredentialHelper;

impl CredentialHelper for UnsupportedCredentialHelper {}

impl<T: CredentialHelper + ?Sized> CredentialHelper for &T {
    fn get_credentials<'a>(
        &'a self,
        request: &'a GetCredentialsRequest,
        extra_parameters: &'a [String],
        cancel: &'a CancellationToken,
    ) -> CredentialsFuture<'a> {
        (**self).get_credentials(request, extra_parameters, cancel)
    }
}

impl<T: CredentialHelper + ?Sized> CredentialHelper for Box<T> {
    fn get_credentials<'a>(
        &'a self,
        request: &'a GetCredentialsRequest,
        extra_parameters: &'a [String],
        cancel: &'a CancellationToken,
    ) -> CredentialsFuture<'a> {
        (**self).get_credentials(request, extra_parameters, cancel)
    }
}

impl<T: CredentialHelper + ?Sized> CredentialHelper for Arc<T> {
    fn get_credentials<'a>(
        &'a self,
        request: &'a GetCredentialsRequest,
        extra_parameters: &'a [String],
        cancel: &'a CancellationToken,
    ) -> CredentialsFuture<'a> {
        (**self).get_credentials(request, extra_parameters, cancel)
    }
}
