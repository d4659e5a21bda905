//! Time-based caching of credential helper responses.
//!
//! [`CachingCredentialHelper`] decorates any [`CredentialHelper`](crate::CredentialHelper)
//! so that repeated requests for the same URI are answered from memory until
//! the configured TTL has passed:
//!
//! ```no_run
//! use credential_helper::{
//!     CacheOptions, CachingCredentialHelper, Client, CredentialHelper, GetCredentialsRequest,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), credential_helper::Error> {
//! let helper = CachingCredentialHelper::new(Client::new("my-helper")?, CacheOptions::default())?;
//! let request = GetCredentialsRequest::new("grpcs://example.com");
//!
//! // Only the first call runs `my-helper`.
//! for _ in 0..3 {
//!     helper.get_credentials(&request, &[], &CancellationToken::new()).await?;
//! }
//!
//! helper.close().await;
//! # Ok(())
//! # }
//! ```

mod caching;
mod options;

pub use caching::CachingCredentialHelper;
pub use options::{CacheOptions, DEFAULT_CACHE_DURATION};
