use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime};

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::errors::Error;
use crate::telemetry::refresh::{RefreshOutcome, RefreshTelemetry};
use crate::token::TokenStore;

use super::LoginRedirect;

/// What every waiter of a refresh receives once it settles.
pub type RefreshResult = Result<String, Arc<Error>>;

/// How long a failed refresh answers late 401s from the same batch.
const FAILURE_MEMORY: Duration = Duration::from_secs(30);

struct FailedRefresh {
    /// Access token the failed batch was sent with.
    stale: Option<String>,
    error: Arc<Error>,
    at: Instant,
}

impl FailedRefresh {
    fn answers(&self, stale: Option<&str>) -> bool {
        self.stale.as_deref() == stale && self.at.elapsed() < FAILURE_MEMORY
    }
}

#[derive(Default)]
struct GateState {
    refreshing: bool,
    waiters: Vec<oneshot::Sender<RefreshResult>>,
    last_failure: Option<FailedRefresh>,
}

enum Role {
    Leader,
    Waiter(oneshot::Receiver<RefreshResult>),
}

/// Owns the refresh-in-progress flag and the queue of requests parked behind it.
///
/// One instance is shared by every request of a client. At most one refresh
/// runs at a time; requests that hit a 401 while it runs wait for its result
/// instead of starting their own.
pub struct SessionManager {
    store: Arc<dyn TokenStore>,
    redirect: Arc<dyn LoginRedirect>,
    state: Mutex<GateState>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn TokenStore>, redirect: Arc<dyn LoginRedirect>) -> Self {
        Self {
            store,
            redirect,
            state: Mutex::new(GateState::default()),
        }
    }

    pub fn store(&self) -> Arc<dyn TokenStore> {
        Arc::clone(&self.store)
    }

    pub fn access_token(&self) -> Option<String> {
        self.store.access_token()
    }

    pub fn is_refreshing(&self) -> bool {
        self.lock().refreshing
    }

    /// Number of requests currently parked behind a refresh.
    pub fn pending(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Drops stored credentials without signalling navigation.
    pub fn end_session(&self) -> Result<(), Error> {
        self.store.clear()
    }

    /// Produces a usable access token for a request rejected with 401.
    ///
    /// `stale` is the token the rejected request carried. If the store already
    /// holds a different token, it is returned without a refresh. If the store
    /// is empty because a refresh for that same token just failed, that
    /// failure is returned. Otherwise the caller either runs `refresh` with
    /// the stored refresh token or, when a refresh is already running, waits
    /// for that one to settle.
    pub async fn renew<F, Fut>(&self, stale: Option<&str>, refresh: F) -> Result<String, Error>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<String, Error>>,
    {
        let role = {
            let mut state = self.lock();
            if state.refreshing {
                let (tx, rx) = oneshot::channel();
                state.waiters.push(tx);
                debug!(waiting = state.waiters.len(), "refresh.queued");
                Role::Waiter(rx)
            } else {
                match self.store.access_token() {
                    Some(current) if stale != Some(current.as_str()) => {
                        debug!("access token already rotated; replaying without refresh");
                        return Ok(current);
                    }
                    Some(_) => {}
                    None => {
                        if let Some(failed) = &state.last_failure
                            && failed.answers(stale)
                        {
                            debug!("refresh for this token already failed; not retrying");
                            return Err(Error::RefreshFailed(Arc::clone(&failed.error)));
                        }
                    }
                }
                state.refreshing = true;
                Role::Leader
            }
        };

        if let Role::Waiter(rx) = role {
            return match rx.await {
                Ok(Ok(token)) => Ok(token),
                Ok(Err(err)) => Err(Error::RefreshFailed(err)),
                Err(_) => Err(Error::Auth("token refresh was abandoned".into())),
            };
        }

        let mut flight = InFlight {
            gate: self,
            settled: false,
        };
        let telemetry = RefreshTelemetry::new("session.renew");

        let Some(refresh_token) = self.store.refresh_token() else {
            let err = Arc::new(Error::Auth(
                "no refresh token available; login required".into(),
            ));
            self.clear_store();
            let rejected = flight.settle(Err(Arc::clone(&err)), stale);
            telemetry.emit_failure(RefreshOutcome::MissingRefreshToken, &err, rejected);
            self.redirect.redirect_to_login();
            return Err(Error::Auth("no refresh token available; login required".into()));
        };

        telemetry.emit_start(SystemTime::now());
        let started = Instant::now();
        match refresh(refresh_token).await {
            Ok(access) => {
                if let Err(err) = self.store.set_access_token(&access) {
                    warn!(error = %err, "failed to persist refreshed access token");
                }
                let resumed = flight.settle(Ok(access.clone()), stale);
                telemetry.emit_success(started.elapsed(), resumed);
                Ok(access)
            }
            Err(err) => {
                let err = Arc::new(err);
                self.clear_store();
                let rejected = flight.settle(Err(Arc::clone(&err)), stale);
                telemetry.emit_failure(RefreshOutcome::Failed, &err, rejected);
                self.redirect.redirect_to_login();
                Err(Error::RefreshFailed(err))
            }
        }
    }

    fn clear_store(&self) {
        if let Err(err) = self.store.clear() {
            warn!(error = %err, "failed to clear token store");
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("SessionManager")
            .field("refreshing", &state.refreshing)
            .field("pending", &state.waiters.len())
            .finish()
    }
}

/// Held by the request that owns the running refresh. Resets the gate if the
/// refresh future is dropped before it settles.
struct InFlight<'a> {
    gate: &'a SessionManager,
    settled: bool,
}

impl InFlight<'_> {
    /// Flips the gate back to idle and hands `outcome` to every waiter in
    /// enqueue order. A failure is remembered against `stale` so late 401s
    /// from the same batch share it. Returns how many waiters were served.
    fn settle(&mut self, outcome: RefreshResult, stale: Option<&str>) -> usize {
        let waiters = {
            let mut state = self.gate.lock();
            state.refreshing = false;
            state.last_failure = match &outcome {
                Ok(_) => None,
                Err(error) => Some(FailedRefresh {
                    stale: stale.map(str::to_owned),
                    error: Arc::clone(error),
                    at: Instant::now(),
                }),
            };
            std::mem::take(&mut state.waiters)
        };
        self.settled = true;
        let served = waiters.len();
        for waiter in waiters {
            // receiver gone means that request was cancelled
            let _ = waiter.send(outcome.clone());
        }
        served
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let waiters = {
            let mut state = self.gate.lock();
            state.refreshing = false;
            std::mem::take(&mut state.waiters)
        };
        let err = Error::Auth("token refresh was abandoned".into());
        RefreshTelemetry::new("session.renew").emit_failure(
            RefreshOutcome::Abandoned,
            &err,
            waiters.len(),
        );
    }
}
