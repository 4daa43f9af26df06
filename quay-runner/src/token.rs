//! Identity tokens
//!
//! A job whose grant includes `id_token: write` receives a short-lived token
//! that the publisher presents to the hosting provider. Tokens are scoped to
//! one run, one job and one audience.

use chrono::{DateTime, Duration, Utc};
use quay_core::domain::permissions::Permissions;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityToken {
    pub value: String,
    pub run_id: Uuid,
    pub job: String,
    pub audience: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdentityToken {
    /// Whether the token can be presented for `run_id` to `audience` right now
    pub fn is_valid_for(&self, run_id: Uuid, audience: &str) -> bool {
        self.run_id == run_id && self.audience == audience && Utc::now() < self.expires_at
    }
}

/// Mints identity tokens for jobs that are allowed to request them
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    /// Returns `None` when the grant does not include identity-token issuance
    pub fn issue(
        &self,
        run_id: Uuid,
        job: &str,
        audience: &str,
        permissions: &Permissions,
    ) -> Option<IdentityToken> {
        if !permissions.can_issue_id_token() {
            return None;
        }

        let issued_at = Utc::now();
        Some(IdentityToken {
            value: format!("quay.{}.{}", run_id.simple(), Uuid::new_v4().simple()),
            run_id,
            job: job.to_string(),
            audience: audience.to_string(),
            issued_at,
            expires_at: issued_at + self.ttl,
        })
    }
}

impl Default for TokenIssuer {
    fn default() -> Self {
        Self::new(Duration::minutes(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_requires_grant() {
        let issuer = TokenIssuer::default();
        let run_id = Uuid::new_v4();

        assert!(
            issuer
                .issue(run_id, "build", "github-pages", &Permissions::read_contents())
                .is_none()
        );

        let token = issuer
            .issue(run_id, "deploy", "github-pages", &Permissions::pages_deploy())
            .unwrap();
        assert_eq!(token.job, "deploy");
        assert!(token.is_valid_for(run_id, "github-pages"));
    }

    #[test]
    fn test_token_is_scoped() {
        let issuer = TokenIssuer::default();
        let run_id = Uuid::new_v4();
        let token = issuer
            .issue(run_id, "deploy", "github-pages", &Permissions::pages_deploy())
            .unwrap();

        assert!(!token.is_valid_for(Uuid::new_v4(), "github-pages"));
        assert!(!token.is_valid_for(run_id, "staging"));
    }

    #[test]
    fn test_expired_token_is_invalid() {
        let issuer = TokenIssuer::new(Duration::seconds(-1));
        let run_id = Uuid::new_v4();
        let token = issuer
            .issue(run_id, "deploy", "github-pages", &Permissions::pages_deploy())
            .unwrap();
        assert!(!token.is_valid_for(run_id, "github-pages"));
    }
}
