//! A credential helper that answers every request with a bearer token read
//! from the `EXAMPLE_TOKEN` environment variable.
//!
//! ```text
//! $ echo '{"uri":"https://example.com"}' | EXAMPLE_TOKEN=abc static_token_helper get
//! {"headers":{"Authorization":["Bearer abc"]},"expires":"..."}
//! ```

use credential_helper::{
    start_credential_helper, CredentialHelper, CredentialsFuture, Error, GetCredentialsRequest,
    GetCredentialsResponse,
};
use time::{Duration, OffsetDateTime};
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct StaticTokenHelper;

impl CredentialHelper for StaticTokenHelper {
    fn get_credentials<'a>(
        &'a self,
        _request: &'a GetCredentialsRequest,
        _extra_parameters: &'a [String],
        _cancel: &'a CancellationToken,
    ) -> CredentialsFuture<'a> {
        Box::pin(async {
            let token = std::env::var("EXAMPLE_TOKEN")
                .map_err(|e| Error::helper(format!("EXAMPLE_TOKEN: {e}")))?;

            Ok(
                GetCredentialsResponse::with_headers([(
                    "Authorization",
                    vec![format!("Bearer {token}")],
                )])
                .expires_at(OffsetDateTime::now_utc() + Duration::hours(1)),
            )
        })
    }
}

fn main() {
    start_credential_helper(StaticTokenHelper);
}
