//! Token manager with single-flight refresh
//!
//! Manages the client-credentials token lifecycle:
//! - Token request on first use
//! - In-memory caching for the rest of the run (never persisted)
//! - Refresh once the remaining lifetime drops under the margin (default 5 min)
//! - At most one outstanding token request, whatever the caller concurrency
//!
//! ```text
//! Unauthenticated ──> Requesting ──> Valid ──(margin reached)──> Requesting
//!        ^                │
//!        └──── failed ────┘
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use super::TokenFetcher;
use crate::error::{AuthError, AuthResult};

/// Default refresh margin: five minutes.
pub const DEFAULT_REFRESH_MARGIN_SECS: i64 = 300;

/// Default bound on one token request.
pub const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

/// A bearer token and its absolute expiry. Replaced, never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenState {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl TokenState {
    /// True when less than `margin_secs` of validity remain.
    pub fn is_expiring(&self, margin_secs: i64) -> bool {
        Utc::now() + chrono::Duration::seconds(margin_secs) >= self.expires_at
    }
}

impl fmt::Debug for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenState")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Handle on the token issued by one request.
///
/// Two handles are the same token only if they come from the same request.
#[derive(Debug, Clone)]
pub struct AccessToken(Arc<TokenState>);

impl AccessToken {
    pub fn new(state: TokenState) -> Self {
        Self(Arc::new(state))
    }

    /// Value for the `Authorization: Bearer` header.
    pub fn secret(&self) -> &str {
        &self.0.access_token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.0.expires_at
    }

    pub fn is_expiring(&self, margin_secs: i64) -> bool {
        self.0.is_expiring(margin_secs)
    }

    fn same_as(&self, other: &AccessToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

type SharedFetch = Shared<BoxFuture<'static, AuthResult<AccessToken>>>;

#[derive(Clone)]
struct InFlight {
    id: u64,
    future: SharedFetch,
}

#[derive(Default)]
struct ManagerState {
    current: Option<AccessToken>,
    in_flight: Option<InFlight>,
}

/// Single authoritative source of the bearer token for a run.
pub struct TokenManager {
    fetcher: Arc<dyn TokenFetcher>,
    refresh_margin_secs: i64,
    timeout: Duration,
    state: Mutex<ManagerState>,
    next_flight: AtomicU64,
}

impl TokenManager {
    /// Create a manager with the default margin and timeout.
    pub fn new(fetcher: Arc<dyn TokenFetcher>) -> Self {
        Self {
            fetcher,
            refresh_margin_secs: DEFAULT_REFRESH_MARGIN_SECS,
            timeout: DEFAULT_TOKEN_TIMEOUT,
            state: Mutex::new(ManagerState::default()),
            next_flight: AtomicU64::new(0),
        }
    }

    pub fn with_refresh_margin(mut self, margin_secs: i64) -> Self {
        self.refresh_margin_secs = margin_secs;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn refresh_margin_secs(&self) -> i64 {
        self.refresh_margin_secs
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current token without triggering a request.
    pub fn current(&self) -> Option<AccessToken> {
        self.lock().current.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().current.is_some()
    }

    /// Get a token with at least the refresh margin of validity left.
    ///
    /// Concurrent callers arriving while a request is outstanding all wait
    /// for that request and observe its result, success or error.
    pub async fn get_token(&self) -> AuthResult<AccessToken> {
        let flight = {
            let mut state = self.lock();

            if let Some(token) = &state.current {
                if !token.is_expiring(self.refresh_margin_secs) {
                    return Ok(token.clone());
                }
                debug!(expires_at = %token.expires_at(), "Cached token inside refresh margin");
                state.current = None;
            }

            match &state.in_flight {
                Some(flight) => {
                    debug!(flight = flight.id, "Joining in-flight token request");
                    flight.clone()
                }
                None => {
                    let flight = InFlight {
                        id: self.next_flight.fetch_add(1, Ordering::Relaxed),
                        future: self.start_request(),
                    };
                    state.in_flight = Some(flight.clone());
                    flight
                }
            }
        };

        let result = flight.future.clone().await;

        let mut state = self.lock();
        if state.in_flight.as_ref().map(|f| f.id) == Some(flight.id) {
            state.in_flight = None;
            match &result {
                Ok(token) => {
                    info!(expires_at = %token.expires_at(), "Access token acquired");
                    state.current = Some(token.clone());
                }
                Err(e) => warn!(error = %e, "Token request failed"),
            }
        }

        result
    }

    /// Drop the cached token after the API refused it.
    ///
    /// Only clears the cache if `token` is still the cached one, so a token
    /// fetched in the meantime survives.
    pub fn invalidate(&self, token: &AccessToken) {
        let mut state = self.lock();
        if state.current.as_ref().is_some_and(|current| current.same_as(token)) {
            info!("Access token rejected by the API, re-authenticating on next use");
            state.current = None;
        }
    }

    fn start_request(&self) -> SharedFetch {
        let fetcher = Arc::clone(&self.fetcher);
        let margin = self.refresh_margin_secs;
        let timeout = self.timeout;
        async move { request_fresh_token(fetcher.as_ref(), margin, timeout).await }
            .boxed()
            .shared()
    }
}

/// One flight: request a token, and request once more if the first one is
/// already inside the margin.
async fn request_fresh_token(
    fetcher: &dyn TokenFetcher,
    margin_secs: i64,
    timeout: Duration,
) -> AuthResult<AccessToken> {
    let (token, expires_in) = request_token(fetcher, timeout).await?;
    if !token.is_expiring(margin_secs) {
        return Ok(token);
    }

    warn!(expires_in, margin_secs, "Issued token already inside refresh margin, requesting again");
    let (token, expires_in) = request_token(fetcher, timeout).await?;
    if token.is_expiring(margin_secs) {
        return Err(AuthError::TokenLifetimeTooShort {
            expires_in,
            margin: margin_secs,
        });
    }
    Ok(token)
}

async fn request_token(fetcher: &dyn TokenFetcher, timeout: Duration) -> AuthResult<(AccessToken, i64)> {
    let requested_at = Utc::now();
    debug!("Requesting access token");

    let response = tokio::time::timeout(timeout, fetcher.request_token())
        .await
        .map_err(|_| AuthError::Timeout(timeout.as_secs()))??;

    if response.access_token.trim().is_empty() {
        return Err(AuthError::MalformedResponse("empty access_token".to_string()));
    }
    if response.expires_in < 0 {
        return Err(AuthError::MalformedResponse(format!(
            "negative expires_in {}",
            response.expires_in
        )));
    }

    let state = TokenState {
        access_token: response.access_token,
        expires_at: requested_at + chrono::Duration::seconds(response.expires_in),
    };
    Ok((AccessToken::new(state), response.expires_in))
}
