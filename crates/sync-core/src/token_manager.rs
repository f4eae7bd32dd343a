//! §4.D Token Manager: the sole authority on "what's the current access
//! token?" for one source connection during a run.
//!
//! Grounded on the historical `TokenManager` (double-checked-locking
//! refresh behind an `asyncio.Lock`) and on the `SyncTokenStore`/per-
//! connection-object idiom in `holon::core::datasource` — a per-connection
//! struct with its own mutex, never a process-global singleton keyed by
//! connection id (§9).

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use sync_api::error::TokenError;

/// How a refreshed access token is obtained once the manager decides a
/// refresh is due (§4.D "Refresh paths").
#[async_trait]
pub trait RefreshStrategy: Send + Sync {
    async fn refresh(&self) -> Result<RefreshedToken, TokenError>;
}

pub struct RefreshedToken {
    pub access_token: String,
}

/// A refresh strategy that delegates to an external auth provider
/// (§4.D path 1), e.g. exchanging a managed-integration handle for fresh
/// credentials.
pub struct AuthProviderRefresh {
    pub refresh_fn: Arc<dyn Fn() -> futures::future::BoxFuture<'static, Result<RefreshedToken, TokenError>> + Send + Sync>,
}

#[async_trait]
impl RefreshStrategy for AuthProviderRefresh {
    async fn refresh(&self) -> Result<RefreshedToken, TokenError> {
        (self.refresh_fn)().await
    }
}

struct TokenState {
    current_token: String,
    last_refresh: Instant,
}

/// One-per-source-connection object (§4.D). Cloning shares the same inner
/// mutex-guarded state, so every worker holding a clone observes the same
/// refresh.
#[derive(Clone)]
pub struct TokenManager {
    state: Arc<Mutex<TokenState>>,
    refresh_interval: Duration,
    refreshable: bool,
    strategy: Option<Arc<dyn RefreshStrategy>>,
    connection_id: String,
}

impl TokenManager {
    /// A token that cannot be refreshed (directly-injected token or API
    /// key, §4.D "State").
    pub fn non_refreshable(connection_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(TokenState { current_token: token.into(), last_refresh: Instant::now() })),
            refresh_interval: Duration::from_secs(25 * 60),
            refreshable: false,
            strategy: None,
            connection_id: connection_id.into(),
        }
    }

    pub fn refreshable(
        connection_id: impl Into<String>,
        initial_token: impl Into<String>,
        refresh_interval: Duration,
        strategy: Arc<dyn RefreshStrategy>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(TokenState {
                current_token: initial_token.into(),
                last_refresh: Instant::now(),
            })),
            refresh_interval,
            refreshable: true,
            strategy: Some(strategy),
            connection_id: connection_id.into(),
        }
    }

    /// §4.D `get_valid_token`: proactive refresh on a timer, double-checked
    /// under the mutex to collapse concurrent refreshes into one network
    /// call (testable property 6, S6).
    #[instrument(skip(self), fields(connection_id = %self.connection_id))]
    pub async fn get_valid_token(&self) -> Result<String, TokenError> {
        if !self.refreshable {
            let guard = self.state.lock().await;
            return Ok(guard.current_token.clone());
        }

        {
            let guard = self.state.lock().await;
            if guard.last_refresh.elapsed() < self.refresh_interval {
                return Ok(guard.current_token.clone());
            }
        }

        let mut guard = self.state.lock().await;
        // Re-check: another caller may have refreshed while we waited for
        // the lock (the "double-checked" half of double-checked locking).
        if guard.last_refresh.elapsed() < self.refresh_interval {
            debug!("token already refreshed by a concurrent caller");
            return Ok(guard.current_token.clone());
        }

        info!("proactively refreshing access token");
        let refreshed = self.do_refresh().await?;
        guard.current_token = refreshed.access_token.clone();
        guard.last_refresh = Instant::now();
        Ok(refreshed.access_token)
    }

    /// §4.D `refresh_on_unauthorized`: force a refresh regardless of the
    /// timer. Called by a source after observing a 401.
    #[instrument(skip(self), fields(connection_id = %self.connection_id))]
    pub async fn refresh_on_unauthorized(&self) -> Result<String, TokenError> {
        if !self.refreshable {
            return Err(TokenError::NotRefreshable);
        }
        let mut guard = self.state.lock().await;
        warn!("forcing token refresh after 401");
        let refreshed = self.do_refresh().await?;
        guard.current_token = refreshed.access_token.clone();
        guard.last_refresh = Instant::now();
        Ok(refreshed.access_token)
    }

    async fn do_refresh(&self) -> Result<RefreshedToken, TokenError> {
        let strategy = self.strategy.as_ref().ok_or(TokenError::NotRefreshable)?;
        strategy.refresh().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRefresh {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RefreshStrategy for CountingRefresh {
        async fn refresh(&self) -> Result<RefreshedToken, TokenError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(RefreshedToken { access_token: "new-token".to_string() })
        }
    }

    #[tokio::test]
    async fn non_refreshable_token_never_calls_strategy() {
        let manager = TokenManager::non_refreshable("conn-1", "static-token");
        assert_eq!(manager.get_valid_token().await.unwrap(), "static-token");
        assert!(manager.refresh_on_unauthorized().await.is_err());
    }

    #[tokio::test]
    async fn concurrent_refresh_storm_calls_strategy_exactly_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let manager = TokenManager::refreshable(
            "conn-1",
            "stale-token",
            Duration::from_secs(0), // always due for refresh
            Arc::new(CountingRefresh { calls: calls.clone() }),
        );

        let mut handles = Vec::new();
        for _ in 0..20 {
            let m = manager.clone();
            handles.push(tokio::spawn(async move { m.get_valid_token().await.unwrap() }));
        }
        for h in handles {
            let token = h.await.unwrap();
            assert_eq!(token, "new-token");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_on_unauthorized_forces_refresh_even_within_interval() {
        let calls = Arc::new(AtomicUsize::new(0));
        let manager = TokenManager::refreshable(
            "conn-1",
            "fresh-token",
            Duration::from_secs(25 * 60),
            Arc::new(CountingRefresh { calls: calls.clone() }),
        );
        // Well within the refresh interval, so a proactive call would not refresh.
        assert_eq!(manager.get_valid_token().await.unwrap(), "fresh-token");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let token = manager.refresh_on_unauthorized().await.unwrap();
        assert_eq!(token, "new-token");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
