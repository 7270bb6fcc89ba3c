//! Session store: who is logged in, persisted across restarts.
//!
//! The store is the single owner of writes to durable storage. Every mutation
//! that touches a persisted field writes through to storage first and only
//! then publishes the new state to readers, so a failed write leaves the
//! in-memory session unchanged and the error is returned to the caller.
//!
//! Readers either take a [`Session`] snapshot or [`SessionStore::subscribe`]
//! to be notified of every committed change.

mod snapshot;
mod storage;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow, bail};
use docchat_types::{
    AuthPayload, Organization, OrganizationPatch, Profile, ProfilePatch, User, UserPatch,
};
use tokio::sync::watch;
use tracing::{debug, warn};

pub use snapshot::{PersistedSnapshot, PersistedState, SNAPSHOT_VERSION};
pub use storage::{FileStorage, MemoryStorage, SNAPSHOT_KEY, SessionStorage, TOKEN_KEY};

/// In-memory view of the current identity plus UI feedback flags.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub user: Option<User>,
    pub organization: Option<Organization>,
    pub profile: Option<Profile>,
    pub token: Option<String>,
    pub is_loading: bool,
    pub last_error: Option<String>,
}

impl Session {
    /// True iff a non-empty token and a user are both present.
    pub fn is_authenticated(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty()) && self.user.is_some()
    }

    fn from_persisted(state: PersistedState) -> Self {
        Self {
            user: state.user,
            organization: state.organization,
            profile: state.profile,
            token: state.token,
            is_loading: false,
            last_error: None,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user.as_ref().map(|u| &u.email))
            .field(
                "organization",
                &self.organization.as_ref().map(|o| &o.slug),
            )
            .field("profile", &self.profile.as_ref().map(|p| &p.id))
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("is_authenticated", &self.is_authenticated())
            .field("is_loading", &self.is_loading)
            .field("last_error", &self.last_error)
            .finish()
    }
}

/// Shared, persisted session state.
pub struct SessionStore {
    storage: Mutex<Box<dyn SessionStorage>>,
    state: watch::Sender<Session>,
    /// Bumped on every committed `set_auth` or `clear_auth`.
    auth_generation: AtomicU64,
}

impl SessionStore {
    /// Creates an empty store over `storage` without reading it.
    pub fn new(storage: impl SessionStorage + 'static) -> Self {
        Self::with_session(Box::new(storage), Session::default())
    }

    /// Creates a store and rehydrates it from the persisted snapshot.
    ///
    /// An unreadable snapshot is logged and ignored.
    ///
    /// # Errors
    /// Returns an error if the storage backend itself cannot be read.
    pub fn rehydrate(storage: impl SessionStorage + 'static) -> Result<Self> {
        let session = load_session(&storage)?;
        debug!(authenticated = session.is_authenticated(), "session rehydrated");
        Ok(Self::with_session(Box::new(storage), session))
    }

    fn with_session(storage: Box<dyn SessionStorage>, session: Session) -> Self {
        Self {
            storage: Mutex::new(storage),
            state: watch::Sender::new(session),
            auth_generation: AtomicU64::new(0),
        }
    }

    /// Returns a copy of the current session.
    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Returns the current bearer token, if any.
    pub fn token(&self) -> Option<String> {
        self.state
            .borrow()
            .token
            .clone()
            .filter(|t| !t.is_empty())
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    /// Counter of committed token writes (`set_auth` and `clear_auth`).
    ///
    /// Lets other token holders tell whether the session was written after
    /// them.
    pub fn auth_generation(&self) -> u64 {
        self.auth_generation.load(Ordering::SeqCst)
    }

    /// Subscribes to committed session changes.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// Replaces the identity after a successful login or registration.
    ///
    /// # Errors
    /// Fails on an empty token or if the session cannot be persisted.
    pub fn set_auth(&self, payload: AuthPayload) -> Result<()> {
        if payload.token.trim().is_empty() {
            bail!("Cannot set auth with an empty token");
        }

        let AuthPayload {
            user,
            organization,
            profile,
            token,
        } = payload;
        let user_id = user.id.clone();

        self.apply(move |session| {
            session.user = Some(user);
            session.organization = Some(organization);
            session.profile = Some(profile);
            session.token = Some(token);
            session.last_error = None;
            true
        })?;
        self.auth_generation.fetch_add(1, Ordering::SeqCst);

        debug!(user_id = %user_id, "session authenticated");
        Ok(())
    }

    /// Merges `patch` into the current user. No-op when logged out.
    ///
    /// # Errors
    /// Returns an error if the session cannot be persisted.
    pub fn update_user(&self, patch: UserPatch) -> Result<()> {
        self.apply(|session| match session.user.as_mut() {
            Some(user) => {
                user.apply(patch);
                true
            }
            None => false,
        })
    }

    /// Merges `patch` into the current organization. No-op when absent.
    ///
    /// # Errors
    /// Returns an error if the session cannot be persisted.
    pub fn update_organization(&self, patch: OrganizationPatch) -> Result<()> {
        self.apply(|session| match session.organization.as_mut() {
            Some(organization) => {
                organization.apply(patch);
                true
            }
            None => false,
        })
    }

    /// Merges `patch` into the current profile. No-op when absent.
    ///
    /// # Errors
    /// Returns an error if the session cannot be persisted.
    pub fn update_profile(&self, patch: ProfilePatch) -> Result<()> {
        self.apply(|session| match session.profile.as_mut() {
            Some(profile) => {
                profile.apply(patch);
                true
            }
            None => false,
        })
    }

    /// # Errors
    /// Only fails if the storage lock is poisoned.
    pub fn set_loading(&self, loading: bool) -> Result<()> {
        self.apply(|session| {
            let changed = session.is_loading != loading;
            session.is_loading = loading;
            changed
        })
    }

    /// # Errors
    /// Only fails if the storage lock is poisoned.
    pub fn set_error(&self, error: Option<String>) -> Result<()> {
        self.apply(|session| {
            let changed = session.last_error != error;
            session.last_error = error;
            changed
        })
    }

    /// # Errors
    /// Only fails if the storage lock is poisoned.
    pub fn clear_error(&self) -> Result<()> {
        self.set_error(None)
    }

    /// Forgets the identity in storage and memory. Idempotent.
    ///
    /// # Errors
    /// Returns an error if durable storage could not be cleared; the
    /// in-memory session is left untouched in that case.
    pub fn clear_auth(&self) -> Result<()> {
        let mut storage = self.lock_storage()?;
        // Snapshot first: it is what a restart rehydrates from.
        storage
            .remove(SNAPSHOT_KEY)
            .context("Failed to remove persisted session")?;
        storage
            .remove(TOKEN_KEY)
            .context("Failed to remove persisted token")?;
        self.auth_generation.fetch_add(1, Ordering::SeqCst);

        let changed = self.state.send_if_modified(|session| {
            let cleared = Session {
                is_loading: session.is_loading,
                ..Session::default()
            };
            if *session == cleared {
                return false;
            }
            *session = cleared;
            true
        });
        if changed {
            debug!("session cleared");
        }
        Ok(())
    }

    /// Runs `change` against a copy of the session; when it reports a change,
    /// persists the difference and then publishes the copy.
    fn apply(&self, change: impl FnOnce(&mut Session) -> bool) -> Result<()> {
        let mut storage = self.lock_storage()?;
        let current = self.state.borrow().clone();
        let mut next = current.clone();
        if !change(&mut next) {
            return Ok(());
        }

        write_through(&mut **storage, &current, &next)?;
        self.state.send_replace(next);
        Ok(())
    }

    fn lock_storage(&self) -> Result<MutexGuard<'_, Box<dyn SessionStorage>>> {
        self.storage
            .lock()
            .map_err(|_| anyhow!("session storage lock poisoned"))
    }
}

/// Persists the difference between `current` and `next`.
///
/// A rehydrated session is authenticated only through the snapshot, so a new
/// token is written before the snapshot and a removed one after it. A
/// snapshot failure after a token write puts the previous token back.
fn write_through(storage: &mut dyn SessionStorage, current: &Session, next: &Session) -> Result<()> {
    let token_changed = current.token != next.token;

    if token_changed && let Some(token) = next.token.as_deref() {
        storage
            .set(TOKEN_KEY, token)
            .context("Failed to persist token")?;
    }

    if let Err(err) = write_snapshot(storage, current, next) {
        if token_changed && next.token.is_some() {
            restore_token(storage, current.token.as_deref());
        }
        return Err(err);
    }

    if token_changed && next.token.is_none() {
        storage
            .remove(TOKEN_KEY)
            .context("Failed to remove persisted token")?;
    }

    Ok(())
}

fn write_snapshot(storage: &mut dyn SessionStorage, current: &Session, next: &Session) -> Result<()> {
    let before = PersistedState::from(current);
    let after = PersistedState::from(next);
    if before == after {
        return Ok(());
    }

    if after.is_empty() {
        storage
            .remove(SNAPSHOT_KEY)
            .context("Failed to remove persisted session")
    } else {
        let json = serde_json::to_string(&PersistedSnapshot::new(after))
            .context("Failed to serialize session snapshot")?;
        storage
            .set(SNAPSHOT_KEY, &json)
            .context("Failed to persist session")
    }
}

fn restore_token(storage: &mut dyn SessionStorage, previous: Option<&str>) {
    let restored = match previous {
        Some(token) => storage.set(TOKEN_KEY, token),
        None => storage.remove(TOKEN_KEY),
    };
    if let Err(err) = restored {
        warn!(error = %err, "failed to restore persisted token");
    }
}

fn load_session(storage: &dyn SessionStorage) -> Result<Session> {
    let stored_token = storage
        .get(TOKEN_KEY)
        .context("Failed to read persisted token")?
        .filter(|t| !t.trim().is_empty());

    let Some(raw) = storage
        .get(SNAPSHOT_KEY)
        .context("Failed to read persisted session")?
    else {
        return Ok(Session {
            token: stored_token,
            ..Session::default()
        });
    };

    let snapshot: PersistedSnapshot = match serde_json::from_str(&raw) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!(error = %err, "ignoring unreadable session snapshot");
            return Ok(Session {
                token: stored_token,
                ..Session::default()
            });
        }
    };

    if snapshot.version != SNAPSHOT_VERSION {
        warn!(
            version = snapshot.version,
            "session snapshot has unexpected version"
        );
    }

    let recorded_flag = snapshot.state.is_authenticated;
    let mut session = Session::from_persisted(snapshot.state);
    if session.token.is_none() {
        session.token = stored_token;
    }
    if recorded_flag != session.is_authenticated() {
        warn!(
            recorded = recorded_flag,
            derived = session.is_authenticated(),
            "session snapshot authentication flag disagrees with its contents"
        );
    }

    Ok(session)
}
