//! On-disk shape of the persisted session subset.

use docchat_types::{Organization, Profile, User};
use serde::{Deserialize, Serialize};

use super::Session;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 0;

/// The persisted subset of [`Session`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub organization: Option<Organization>,
    #[serde(default)]
    pub profile: Option<Profile>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub is_authenticated: bool,
}

impl PersistedState {
    pub fn is_empty(&self) -> bool {
        self.user.is_none()
            && self.organization.is_none()
            && self.profile.is_none()
            && self.token.is_none()
    }
}

impl From<&Session> for PersistedState {
    fn from(session: &Session) -> Self {
        Self {
            user: session.user.clone(),
            organization: session.organization.clone(),
            profile: session.profile.clone(),
            token: session.token.clone(),
            is_authenticated: session.is_authenticated(),
        }
    }
}

/// Versioned envelope written under the snapshot key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    pub state: PersistedState,
    #[serde(default)]
    pub version: u32,
}

impl PersistedSnapshot {
    pub fn new(state: PersistedState) -> Self {
        Self {
            state,
            version: SNAPSHOT_VERSION,
        }
    }
}
