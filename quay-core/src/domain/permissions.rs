//! Permission grants
//!
//! Permissions are declared per pipeline and optionally overridden per job.
//! Quay records and forwards them; the host authorization layer enforces them.

use serde::{Deserialize, Serialize};

/// Access level for a single scope
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    #[default]
    None,
    Read,
    Write,
}

impl Access {
    /// Whether this grant satisfies `required`. Write implies read.
    pub fn allows(self, required: Access) -> bool {
        self >= required
    }
}

impl std::fmt::Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Access::None => write!(f, "none"),
            Access::Read => write!(f, "read"),
            Access::Write => write!(f, "write"),
        }
    }
}

/// Capability set granted to a job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permissions {
    /// Source repository contents
    #[serde(default)]
    pub contents: Access,

    /// Hosting publish target
    #[serde(default)]
    pub pages: Access,

    /// Identity-token issuance for trust with the hosting provider
    #[serde(default)]
    pub id_token: Access,
}

impl Permissions {
    pub fn none() -> Self {
        Self::default()
    }

    /// Read-only access to source contents
    pub fn read_contents() -> Self {
        Self {
            contents: Access::Read,
            ..Self::default()
        }
    }

    /// The grant a pages deployment needs: read source, write pages, mint id tokens
    pub fn pages_deploy() -> Self {
        Self {
            contents: Access::Read,
            pages: Access::Write,
            id_token: Access::Write,
        }
    }

    pub fn can_issue_id_token(&self) -> bool {
        self.id_token.allows(Access::Write)
    }
}

impl std::fmt::Display for Permissions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "contents: {}, pages: {}, id-token: {}",
            self.contents, self.pages, self.id_token
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_implies_read() {
        assert!(Access::Write.allows(Access::Read));
        assert!(Access::Read.allows(Access::None));
        assert!(!Access::Read.allows(Access::Write));
    }

    #[test]
    fn test_only_deploy_grant_issues_id_token() {
        let deploy = Permissions::pages_deploy();
        let build = Permissions::read_contents();

        assert!(deploy.can_issue_id_token());
        assert!(!build.can_issue_id_token());
    }

    #[test]
    fn test_missing_scopes_deserialize_as_none() {
        let perms: Permissions = serde_json::from_str(r#"{"pages":"write"}"#).unwrap();
        assert_eq!(perms.contents, Access::None);
        assert_eq!(perms.pages, Access::Write);
    }
}
