//! Bearer-token authentication (spec component J). The spec treats the
//! authentication middleware itself as an external collaborator (§1); this
//! is the concrete collaborator the server binary plugs in, grounded on the
//! teacher's SHA-256 token-hash lookup.

use sha2::{Digest, Sha256};
use sqlx::PgPool;

/// The resolved identity of a connecting client. `user_pk` is `None` for an
/// anonymous principal — legal only when `allow_unauthenticated` is set
/// (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_pk: Option<i64>,
}

impl Principal {
    pub fn anonymous() -> Self {
        Principal { user_pk: None }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_pk.is_some()
    }
}

pub fn extract_bearer(authorization: &str) -> Option<&str> {
    authorization.strip_prefix("Bearer ")
}

/// Resolve a raw bearer token to a `Principal` by hashing it and looking up
/// the hash in `auth_tokens`. Returns `None` on a missing, malformed, or
/// revoked token — callers decide whether that denies the connection or
/// falls back to anonymous.
pub async fn resolve_principal(pool: &PgPool, raw_token: &str) -> Option<Principal> {
    let hash = Sha256::digest(raw_token.as_bytes());
    let hash_hex = hex::encode(hash);
    let row = sqlx::query!(
        r#"SELECT user_pk FROM auth_tokens WHERE token_hash = $1 AND revoked_at IS NULL"#,
        hash_hex
    )
    .fetch_optional(pool)
    .await
    .ok()??;
    Some(Principal { user_pk: Some(row.user_pk) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_bearer_handles_missing_and_present_prefix() {
        assert_eq!(extract_bearer("Bearer abc123"), Some("abc123"));
        assert_eq!(extract_bearer("Basic abc123"), None);
        assert_eq!(extract_bearer(""), None);
    }

    #[test]
    fn anonymous_principal_is_not_authenticated() {
        let p = Principal::anonymous();
        assert!(!p.is_authenticated());
    }
}
