//! Session context owned by the gateway client.
//!
//! Credentials live in a [`SessionStorage`] under well-known keys. The token
//! and the cached profile are always cleared together.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tracing::{debug, info, warn};

/// Storage key of the bearer token.
pub const TOKEN_KEY: &str = "token";

/// Storage key of the cached user profile (JSON).
pub const PROFILE_KEY: &str = "user";

/// Key/value storage backing a session.
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

/// Process-local session storage.
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    entries: RwLock<HashMap<String, String>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemorySessionStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// Explicit session context.
///
/// # Lifecycle
///
/// - `init` adopts whatever credentials the storage already holds
/// - `establish` stores a fresh token and profile after login
/// - `evict` clears both on authentication failure
/// - `teardown` clears both on logout or shutdown
pub struct Session {
    storage: Arc<dyn SessionStorage>,
    /// Number of evictions caused by expired credentials
    evictions: AtomicU64,
}

impl Session {
    /// Create a session over existing storage.
    pub fn init(storage: Arc<dyn SessionStorage>) -> Self {
        let session = Self {
            storage,
            evictions: AtomicU64::new(0),
        };
        debug!(
            authenticated = session.is_authenticated(),
            "Session initialized"
        );
        session
    }

    /// Create an empty session backed by process memory.
    pub fn in_memory() -> Self {
        Self::init(Arc::new(MemorySessionStorage::new()))
    }

    /// Current bearer token, if any.
    pub fn token(&self) -> Option<String> {
        self.storage.get(TOKEN_KEY).filter(|t| !t.is_empty())
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    /// Cached profile of the signed-in user.
    pub fn profile(&self) -> Option<Value> {
        let raw = self.storage.get(PROFILE_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable cached profile");
                None
            }
        }
    }

    /// Store credentials after a successful login.
    pub fn establish(&self, token: impl Into<String>, profile: Option<&Value>) {
        self.storage.set(TOKEN_KEY, token.into());
        match profile {
            Some(profile) => self.storage.set(PROFILE_KEY, profile.to_string()),
            None => self.storage.remove(PROFILE_KEY),
        }
        info!("Session established");
    }

    /// Clear credentials after an authentication failure.
    pub fn evict(&self) {
        self.clear();
        self.evictions.fetch_add(1, Ordering::Relaxed);
        warn!("Session evicted after authentication failure");
    }

    /// Clear credentials on logout.
    pub fn teardown(&self) {
        self.clear();
        info!("Session closed");
    }

    /// Number of evictions so far.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    fn clear(&self) {
        self.storage.remove(TOKEN_KEY);
        self.storage.remove(PROFILE_KEY);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the token
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .field("evictions", &self.evictions())
            .finish()
    }
}
