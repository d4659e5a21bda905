//! Fetches credentials for a URI through an external credential helper.
//!
//! ```text
//! $ REAL_CREDENTIAL_HELPER=/path/to/helper get_credentials https://example.com
//! ```
//!
//! Build with `--features logging` and set `RUST_LOG=debug` to see every
//! helper invocation.

use credential_helper::{
    CacheOptions, CachingCredentialHelper, Client, CredentialHelper, GetCredentialsRequest,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let helper_path = std::env::var("REAL_CREDENTIAL_HELPER")
        .map_err(|_| "REAL_CREDENTIAL_HELPER must name a credential helper")?;
    let uri = std::env::args()
        .nth(1)
        .ok_or("usage: get_credentials <uri>")?;

    let helper = CachingCredentialHelper::new(
        Client::new(&helper_path)?,
        CacheOptions::with_ttl(time::Duration::minutes(5)),
    )?;
    let request = GetCredentialsRequest::new(uri);
    let cancel = CancellationToken::new();

    // The second call is served from the cache.
    for _ in 0..2 {
        let response = helper.get_credentials(&request, &[], &cancel).await?;
        for (name, values) in &response.headers {
            println!("{name}: {}", values.join(", "));
        }
        if let Some(expires) = response.expires {
            println!("expires: {expires}");
        }
    }

    helper.close().await;
    Ok(())
}
