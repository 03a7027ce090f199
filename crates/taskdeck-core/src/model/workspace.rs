use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::{ParseEnumError, normalize};

pub type WorkspaceId = i64;
pub type UserId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkspaceType {
    Personal,
    Team,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkspaceRole {
    Admin,
    Member,
    Viewer,
}

impl WorkspaceRole {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Member => "MEMBER",
            Self::Viewer => "VIEWER",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: WorkspaceType,
    pub owner_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

/// Membership row. Unique per (`workspace_id`, `user_id`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceMember {
    pub workspace_id: WorkspaceId,
    pub user_id: UserId,
    pub role: WorkspaceRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

impl WorkspaceMember {
    /// Email when the service joined the user in, otherwise `user #id`.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.user
            .as_ref()
            .map_or_else(|| format!("user #{}", self.user_id), |u| u.email.clone())
    }
}

/// Response of `POST /auth/login`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

const fn default_active() -> bool {
    true
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl fmt::Display for WorkspaceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for WorkspaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Personal => "PERSONAL",
            Self::Team => "TEAM",
        })
    }
}

impl FromStr for WorkspaceRole {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "ADMIN" => Ok(Self::Admin),
            "MEMBER" => Ok(Self::Member),
            "VIEWER" => Ok(Self::Viewer),
            _ => Err(ParseEnumError {
                expected: "role",
                got: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_type_field_is_renamed() {
        let ws: Workspace =
            serde_json::from_str(r#"{"id":7,"name":"Home","type":"PERSONAL","owner_id":1}"#)
                .unwrap();
        assert_eq!(ws.kind, WorkspaceType::Personal);
        let back = serde_json::to_value(&ws).unwrap();
        assert_eq!(back["type"], "PERSONAL");
    }

    #[test]
    fn member_without_joined_user_displays_id() {
        let member: WorkspaceMember =
            serde_json::from_str(r#"{"workspace_id":7,"user_id":4,"role":"VIEWER"}"#).unwrap();
        assert_eq!(member.role, WorkspaceRole::Viewer);
        assert_eq!(member.display_name(), "user #4");
    }

    #[test]
    fn member_with_joined_user_displays_email() {
        let member: WorkspaceMember = serde_json::from_str(
            r#"{"workspace_id":7,"user_id":4,"role":"ADMIN","user":{"id":4,"email":"ana@example.com","is_active":true}}"#,
        )
        .unwrap();
        assert_eq!(member.display_name(), "ana@example.com");
    }

    #[test]
    fn token_type_defaults_to_bearer() {
        let token: AccessToken = serde_json::from_str(r#"{"access_token":"abc"}"#).unwrap();
        assert_eq!(token.token_type, "bearer");
    }

    #[test]
    fn role_parse_roundtrips() {
        for role in [WorkspaceRole::Admin, WorkspaceRole::Member, WorkspaceRole::Viewer] {
            assert_eq!(role.to_string().parse::<WorkspaceRole>().unwrap(), role);
        }
        assert!("owner".parse::<WorkspaceRole>().is_err());
    }
}
