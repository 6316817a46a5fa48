//! Abort coordinator
//!
//! Process-wide registry mapping a session to its in-flight generation, so a
//! client can cancel its own running request. Constructed in `main` and
//! injected wherever needed; tests instantiate isolated registries.
//!
//! At most one in-flight request per session: registering a new request
//! cancels and replaces any prior one for the same session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

struct InFlightEntry {
    request_id: Uuid,
    token: CancellationToken,
}

/// Registry of in-flight generations, keyed by session id
///
/// All mutations take the registry lock, so register/abort/release are atomic
/// with respect to each other for the same session. The lock is never held
/// across an await point.
#[derive(Clone, Default)]
pub struct AbortRegistry {
    entries: Arc<Mutex<HashMap<String, InFlightEntry>>>,
}

impl AbortRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new in-flight request for a session
    ///
    /// Any existing entry for the session is cancelled and replaced. The
    /// returned guard releases the entry when dropped, on every exit path.
    pub fn register(&self, session_id: &str) -> InFlightGuard {
        let request_id = Uuid::new_v4();
        let token = CancellationToken::new();

        let mut entries = self.entries.lock().expect("abort registry poisoned");
        if let Some(prior) = entries.insert(
            session_id.to_string(),
            InFlightEntry {
                request_id,
                token: token.clone(),
            },
        ) {
            info!(
                session_id = %session_id,
                prior_request_id = %prior.request_id,
                "Cancelling prior in-flight request for session"
            );
            prior.token.cancel();
        }

        debug!(
            session_id = %session_id,
            request_id = %request_id,
            "Registered in-flight request"
        );

        InFlightGuard {
            registry: self.clone(),
            session_id: session_id.to_string(),
            request_id,
            token,
        }
    }

    /// Signal cancellation for a session's in-flight request
    ///
    /// Idempotent: returns `false` when no request is in flight, including a
    /// second abort for the same request.
    pub fn abort(&self, session_id: &str) -> bool {
        let mut entries = self.entries.lock().expect("abort registry poisoned");
        match entries.remove(session_id) {
            Some(entry) => {
                info!(
                    session_id = %session_id,
                    request_id = %entry.request_id,
                    "Aborting in-flight request"
                );
                entry.token.cancel();
                true
            }
            None => {
                debug!(session_id = %session_id, "No in-flight request to abort");
                false
            }
        }
    }

    /// Number of in-flight requests, for tests and logging
    pub fn in_flight_count(&self) -> usize {
        self.entries.lock().expect("abort registry poisoned").len()
    }

    fn release(&self, session_id: &str, request_id: Uuid) {
        let mut entries = self.entries.lock().expect("abort registry poisoned");
        // Only remove our own entry: a newer request may have replaced it
        if entries
            .get(session_id)
            .is_some_and(|e| e.request_id == request_id)
        {
            entries.remove(session_id);
            debug!(
                session_id = %session_id,
                request_id = %request_id,
                "Released in-flight request"
            );
        }
    }
}

/// RAII handle for a registered in-flight request
///
/// Dropping the guard releases the registry entry; holding it keeps the
/// request abortable via `AbortRegistry::abort`.
pub struct InFlightGuard {
    registry: AbortRegistry,
    session_id: String,
    request_id: Uuid,
    token: CancellationToken,
}

impl InFlightGuard {
    /// The cancellation token observed by the backend adapter
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// The unique id of this request, for logging
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.release(&self.session_id, self.request_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_with_no_request_returns_false() {
        let registry = AbortRegistry::new();
        assert!(!registry.abort("nope"));
    }

    #[test]
    fn test_abort_signals_token_and_is_idempotent() {
        let registry = AbortRegistry::new();
        let guard = registry.register("s1");
        let token = guard.token();

        assert!(!token.is_cancelled());
        assert!(registry.abort("s1"));
        assert!(token.is_cancelled());
        // Second abort finds nothing
        assert!(!registry.abort("s1"));
    }

    #[test]
    fn test_register_replaces_and_cancels_prior() {
        let registry = AbortRegistry::new();
        let first = registry.register("s1");
        let first_token = first.token();

        let second = registry.register("s1");
        assert!(first_token.is_cancelled());
        assert!(!second.token().is_cancelled());
        assert_eq!(registry.in_flight_count(), 1);
    }

    #[test]
    fn test_guard_drop_releases_entry() {
        let registry = AbortRegistry::new();
        {
            let _guard = registry.register("s1");
            assert_eq!(registry.in_flight_count(), 1);
        }
        assert_eq!(registry.in_flight_count(), 0);
        assert!(!registry.abort("s1"));
    }

    #[test]
    fn test_stale_guard_does_not_release_newer_entry() {
        let registry = AbortRegistry::new();
        let first = registry.register("s1");
        let second = registry.register("s1");

        // Dropping the replaced guard must not evict the newer registration
        drop(first);
        assert_eq!(registry.in_flight_count(), 1);
        assert!(registry.abort("s1"));
        assert!(second.token().is_cancelled());
    }

    #[test]
    fn test_sessions_are_independent() {
        let registry = AbortRegistry::new();
        let a = registry.register("a");
        let _b = registry.register("b");

        assert!(registry.abort("a"));
        assert!(a.token().is_cancelled());
        assert_eq!(registry.in_flight_count(), 1);
    }
}
