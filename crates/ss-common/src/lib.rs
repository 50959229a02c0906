use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod logging;

// ============================================================================
// Roles
// ============================================================================

/// Application role of a signed-in user.
///
/// Serialized exactly as the backend stores it (`"Student"`, `"Tutor"`, `"Admin"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Student,
    Tutor,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Student, Role::Tutor, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "Student",
            Role::Tutor => "Tutor",
            Role::Admin => "Admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

// ============================================================================
// Identity Types
// ============================================================================

/// Identity as asserted by the credential provider.
///
/// Carries no role: the provider is never trusted for authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderIdentity {
    pub uid: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default, rename = "photoURL")]
    pub photo_url: Option<String>,
}

/// User record as stored by the application backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    pub email: String,
    pub role: Role,
}

/// The signed-in user: provider profile merged with the verified backend record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
    pub role: Role,
}

impl Identity {
    /// Merge a provider identity with a verified backend record.
    ///
    /// Profile fields prefer the provider's values; the role always comes from the record.
    pub fn merge(provider: &ProviderIdentity, record: &UserRecord) -> Self {
        Self {
            uid: provider.uid.clone(),
            email: provider.email.clone(),
            display_name: provider.display_name.clone().or_else(|| record.name.clone()),
            photo_url: provider.photo_url.clone().or_else(|| record.image.clone()),
            role: record.role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(name: Option<&str>) -> ProviderIdentity {
        ProviderIdentity {
            uid: "uid-1".to_string(),
            email: "ada@example.com".to_string(),
            display_name: name.map(String::from),
            photo_url: None,
        }
    }

    fn record(role: Role) -> UserRecord {
        UserRecord {
            name: Some("Ada (backend)".to_string()),
            image: Some("https://i.ibb.co/ada.png".to_string()),
            email: "ada@example.com".to_string(),
            role,
        }
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("Tutor".parse::<Role>().unwrap(), Role::Tutor);
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert!("Teacher".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serializes_as_backend_string() {
        assert_eq!(serde_json::to_string(&Role::Student).unwrap(), "\"Student\"");
        let role: Role = serde_json::from_str("\"Admin\"").unwrap();
        assert_eq!(role, Role::Admin);
    }

    #[test]
    fn test_merge_takes_role_from_record() {
        let identity = Identity::merge(&provider(Some("Ada")), &record(Role::Tutor));
        assert_eq!(identity.role, Role::Tutor);
        assert_eq!(identity.display_name.as_deref(), Some("Ada"));
        assert_eq!(identity.photo_url.as_deref(), Some("https://i.ibb.co/ada.png"));
    }

    #[test]
    fn test_merge_falls_back_to_record_name() {
        let identity = Identity::merge(&provider(None), &record(Role::Student));
        assert_eq!(identity.display_name.as_deref(), Some("Ada (backend)"));
    }

    #[test]
    fn test_provider_identity_wire_names() {
        let json = serde_json::json!({
            "uid": "u1",
            "email": "a@b.c",
            "displayName": "A",
            "photoURL": "https://x/y.png"
        });
        let identity: ProviderIdentity = serde_json::from_value(json).unwrap();
        assert_eq!(identity.photo_url.as_deref(), Some("https://x/y.png"));
    }
}
