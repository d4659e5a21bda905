use super::options::CacheOptions;
use crate::error::Error;
use crate::helper::{CredentialHelper, CredentialsFuture};
use crate::prelude::{debug, info, warn};
use crate::protocol::{GetCredentialsRequest, GetCredentialsResponse};
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Upper bound on the interval between two sweeps of expired entries.
const MAX_SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(24 * 60 * 60);

type Entries = HashMap<GetCredentialsRequest, (GetCredentialsResponse, Instant)>;

#[derive(Default)]
struct State {
    closed: bool,
    entries: Entries,
}

/// A [`CredentialHelper`] that caches successful responses of another helper.
///
/// Responses are cached per request for a fixed TTL, measured from the moment
/// the response was fetched; serving a cached response does not extend it.
/// Failures are never cached.
///
/// A background task removes expired entries. It is stopped by
/// [`close`](Self::close), or on a best-effort basis when the helper is
/// dropped.
///
/// # Example
///
/// ```no_run
/// use credential_helper::{CacheOptions, CachingCredentialHelper, Client};
///
/// # async fn example() -> Result<(), credential_helper::Error> {
/// let helper = CachingCredentialHelper::new(
///     Client::new("my-credential-helper")?,
///     CacheOptions::with_ttl(time::Duration::minutes(5)),
/// )?;
/// // ...
/// helper.close().await;
/// # Ok(())
/// # }
/// ```
pub struct CachingCredentialHelper<H> {
    delegate: H,
    ttl: time::Duration,
    max_age: std::time::Duration,
    state: Arc<Mutex<State>>,

    // Lifecycle / shutdown.
    cancel: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<H: CredentialHelper> CachingCredentialHelper<H> {
    /// Wraps `delegate` in a cache configured by `options`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTtl`] if the TTL is negative and
    /// [`Error::NoRuntime`] if called outside of a Tokio runtime.
    pub fn new(delegate: H, options: CacheOptions) -> Result<Self, Error> {
        let ttl = options
            .effective_ttl()
            .ok_or(Error::InvalidTtl(options.ttl))?;
        let max_age =
            std::time::Duration::try_from(ttl).map_err(|_| Error::InvalidTtl(options.ttl))?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;

        let state = Arc::new(Mutex::new(State::default()));
        let cancel = CancellationToken::new();
        let sweeper = runtime.spawn(run_sweeper(Arc::clone(&state), max_age, cancel.clone()));

        Ok(Self {
            delegate,
            ttl,
            max_age,
            state,
            cancel,
            sweeper: Mutex::new(Some(sweeper)),
        })
    }
}

impl<H> CachingCredentialHelper<H> {
    /// Returns the TTL of cached responses.
    pub fn ttl(&self) -> time::Duration {
        self.ttl
    }

    /// Returns the number of cached responses that have not expired.
    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state
            .entries
            .values()
            .filter(|(_, inserted_at)| inserted_at.elapsed() < self.max_age)
            .count()
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Drops all cached responses and stops the background task.
    ///
    /// Every later call to `get_credentials` fails with [`Error::Closed`].
    /// Calling `close` more than once has no further effect.
    pub async fn close(&self) {
        let sweeper = {
            let mut state = self.state.lock().await;
            if state.closed {
                return;
            }
            state.closed = true;
            state.entries.clear();
            self.cancel.cancel();
            self.sweeper.lock().await.take()
        };

        if let Some(handle) = sweeper {
            if let Err(e) = handle.await {
                warn!("Error joining cache sweeper task during close: error={e}");
            }
        }
        info!("Credential cache closed");
    }

    async fn fetch(
        &self,
        request: &GetCredentialsRequest,
        extra_parameters: &[String],
        cancel: &CancellationToken,
    ) -> Result<GetCredentialsResponse, Error>
    where
        H: CredentialHelper,
    {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(Error::Closed);
        }

        if let Some((response, inserted_at)) = state.entries.get(request) {
            if inserted_at.elapsed() < self.max_age {
                debug!("Credential cache hit: uri={}", request.uri);
                return Ok(response.clone());
            }
        }

        debug!("Credential cache miss: uri={}", request.uri);
        let response = self
            .delegate
            .get_credentials(request, extra_parameters, cancel)
            .await?;
        state
            .entries
            .insert(request.clone(), (response.clone(), Instant::now()));
        Ok(response)
    }
}

impl<H: CredentialHelper> CredentialHelper for CachingCredentialHelper<H> {
    fn get_credentials<'a>(
        &'a self,
        request: &'a GetCredentialsRequest,
        extra_parameters: &'a [String],
        cancel: &'a CancellationToken,
    ) -> CredentialsFuture<'a> {
        Box::pin(self.fetch(request, extra_parameters, cancel))
    }
}

impl<H: Debug> Debug for CachingCredentialHelper<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingCredentialHelper")
            .field("delegate", &self.delegate)
            .field("ttl", &self.ttl)
            .field("state", &"<Mutex<State>>")
            .field("cancel", &self.cancel)
            .field("sweeper", &"<Mutex<Option<JoinHandle<()>>>>")
            .finish()
    }
}

impl<H> Drop for CachingCredentialHelper<H> {
    fn drop(&mut self) {
        // Best-effort cancellation. Do not block in Drop.
        self.cancel.cancel();
    }
}

async fn run_sweeper(
    state: Arc<Mutex<State>>,
    max_age: std::time::Duration,
    cancel: CancellationToken,
) {
    let period = max_age.min(MAX_SWEEP_INTERVAL);
    let now = Instant::now();
    let start = now.checked_add(period).unwrap_or(now);
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let mut state = state.lock().await;
        let before = state.entries.len();
        state
            .entries
            .retain(|_, (_, inserted_at)| inserted_at.elapsed() < max_age);
        let evicted = before - state.entries.len();
        if evicted > 0 {
            debug!("Evicted expired credentials: count={evicted}");
        }
    }
}
