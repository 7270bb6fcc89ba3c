//! Authenticated identity: user, organization, profile and their patches.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update for [`User`]. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    /// Shallow-merges the set fields of `patch` into this user.
    pub fn apply(&mut self, patch: UserPatch) {
        if let Some(email) = patch.email {
            self.email = email;
        }
        if let Some(full_name) = patch.full_name {
            self.full_name = full_name;
        }
        if let Some(avatar) = patch.avatar {
            self.avatar = Some(avatar);
        }
        if let Some(updated_at) = patch.updated_at {
            self.updated_at = updated_at;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Organization {
    pub fn apply(&mut self, patch: OrganizationPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(slug) = patch.slug {
            self.slug = slug;
        }
        if let Some(logo) = patch.logo {
            self.logo = Some(logo);
        }
        if let Some(updated_at) = patch.updated_at {
            self.updated_at = updated_at;
        }
    }
}

/// Membership role inside an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::User => write!(f, "user"),
        }
    }
}

/// The user's membership record within their organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub organization_id: String,
    pub role: Role,
    pub email: String,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Organization joined in by the server (`organizations` on the wire).
    #[serde(
        default,
        rename = "organizations",
        skip_serializing_if = "Option::is_none"
    )]
    pub organization: Option<Organization>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    pub fn apply(&mut self, patch: ProfilePatch) {
        if let Some(role) = patch.role {
            self.role = role;
        }
        if let Some(email) = patch.email {
            self.email = email;
        }
        if let Some(full_name) = patch.full_name {
            self.full_name = full_name;
        }
        if let Some(avatar) = patch.avatar {
            self.avatar = Some(avatar);
        }
        if let Some(updated_at) = patch.updated_at {
            self.updated_at = updated_at;
        }
    }
}

/// Payload returned by login and registration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthPayload {
    pub user: User,
    pub organization: Organization,
    pub profile: Profile,
    pub token: String,
}

impl fmt::Debug for AuthPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthPayload")
            .field("user", &self.user)
            .field("organization", &self.organization)
            .field("profile", &self.profile)
            .field("token", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshedToken {
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorSetup {
    pub qr_code: String,
    pub secret: String,
}

/// A signed-in device as listed by `GET /api/auth/sessions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSession {
    pub id: String,
    pub device: String,
    pub location: String,
    pub last_active: String,
    pub current: bool,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn user() -> User {
        User {
            id: "u1".to_string(),
            email: "ada@example.com".to_string(),
            full_name: "Ada".to_string(),
            avatar: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_user_patch_merges_only_set_fields() {
        let mut user = user();
        user.apply(UserPatch {
            full_name: Some("Ada Lovelace".to_string()),
            ..UserPatch::default()
        });

        assert_eq!(user.full_name, "Ada Lovelace");
        assert_eq!(user.email, "ada@example.com");
        assert!(user.avatar.is_none());
    }

    #[test]
    fn test_patch_serializes_only_set_fields() {
        let patch = UserPatch {
            avatar: Some("https://cdn.example.com/a.png".to_string()),
            ..UserPatch::default()
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "avatar": "https://cdn.example.com/a.png" })
        );
    }

    #[test]
    fn test_profile_reads_joined_organization() {
        let json = r#"{
            "id": "p1",
            "organizationId": "o1",
            "role": "admin",
            "email": "ada@example.com",
            "fullName": "Ada",
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z",
            "organizations": {
                "id": "o1",
                "name": "Acme",
                "slug": "acme",
                "createdAt": "2024-01-01T00:00:00Z",
                "updatedAt": "2024-01-01T00:00:00Z"
            }
        }"#;

        let profile: Profile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.role, Role::Admin);
        assert_eq!(profile.organization.unwrap().slug, "acme");
    }

    #[test]
    fn test_auth_payload_debug_masks_token() {
        let payload = AuthPayload {
            user: user(),
            organization: Organization {
                id: "o1".to_string(),
                name: "Acme".to_string(),
                slug: "acme".to_string(),
                logo: None,
                created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                updated_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            },
            profile: Profile {
                id: "p1".to_string(),
                organization_id: "o1".to_string(),
                role: Role::User,
                email: "ada@example.com".to_string(),
                full_name: "Ada".to_string(),
                avatar: None,
                created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                updated_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                organization: None,
            },
            token: "secret-token-value".to_string(),
        };

        let debug = format!("{payload:?}");
        assert!(!debug.contains("secret-token-value"));
    }
}
