#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

//! This crate implements the
//! [Bazel credential helper protocol](https://github.com/EngFlow/credential-helper-spec).
//!
//! A credential helper is an executable that is run as `<helper> get`, reads a
//! JSON request naming a URI on its standard input and writes the HTTP headers
//! to use for that URI to its standard output.
//!
//! The crate covers both sides of the protocol:
//!
//! - [`Client`] invokes an external helper executable.
//! - [`start_credential_helper`] turns the current process into a helper.
//! - [`CachingCredentialHelper`] caches responses of any helper for a TTL.
//! - [`PerRpcCredentials`] attaches the headers to gRPC calls.
//!
//! All of them meet at the [`CredentialHelper`] trait.
//!
//! ## Invoking a helper
//!
//! ```no_run
//! use credential_helper::{
//!     CacheOptions, CachingCredentialHelper, Client, CredentialHelper, GetCredentialsRequest,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let helper = CachingCredentialHelper::new(
//!     Client::new("my-credential-helper")?,
//!     CacheOptions::default(),
//! )?;
//!
//! let response = helper
//!     .get_credentials(
//!         &GetCredentialsRequest::new("https://example.com/foo"),
//!         &[],
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//! println!("{:?}", response.headers);
//!
//! helper.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **`grpc`** (default): [`PerRpcCredentials`] for `tonic` clients
//! - **`logging`**: emit diagnostics through the `log` crate
//! - **`tracing`**: emit diagnostics through the `tracing` crate

mod observability;
mod prelude;

pub mod cache;
pub mod client;
pub mod error;
pub mod helper;
pub mod protocol;
pub mod server;

#[cfg(feature = "grpc")]
pub mod grpc;

// -----------------------
// Re-exports
// -----------------------

pub use crate::{
    cache::{CacheOptions, CachingCredentialHelper, DEFAULT_CACHE_DURATION},
    client::Client,
    error::Error,
    helper::{CredentialHelper, CredentialsFuture, UnsupportedCredentialHelper},
    protocol::{GetCredentialsRequest, GetCredentialsResponse, ProtocolError},
    server::{run, start_credential_helper},
};

#[cfg(feature = "grpc")]
pub use crate::grpc::{AdapterError, PerRpcCredentials};
