//! Session repository for database operations.

use chrono::Utc;
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter};
use sha2::{Digest, Sha256};

use crate::entities::{sessions, users};

/// An active session together with its user.
#[derive(Debug, Clone)]
pub struct SessionWithUser {
    /// The session row.
    pub session: sessions::Model,
    /// The user owning the session.
    pub user: users::Model,
}

/// Session repository for token lookups.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    db: DatabaseConnection,
}

impl SessionRepository {
    /// Creates a new session repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Hashes a session token for storage.
    #[must_use]
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Finds the unexpired session for `token` and its user.
    ///
    /// Sessions of soft-deleted users are treated as absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_active_by_token(
        &self,
        token: &str,
    ) -> Result<Option<SessionWithUser>, DbErr> {
        let found = sessions::Entity::find()
            .filter(sessions::Column::TokenHash.eq(Self::hash_token(token)))
            .filter(sessions::Column::ExpiresAt.gt(Utc::now()))
            .find_also_related(users::Entity)
            .one(&self.db)
            .await?;

        Ok(match found {
            Some((session, Some(user))) if user.deleted_at.is_none() => {
                Some(SessionWithUser { session, user })
            }
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_token_is_stable_hex() {
        let hash = SessionRepository::hash_token("session-token");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, SessionRepository::hash_token("session-token"));
        assert_ne!(hash, SessionRepository::hash_token("session-token2"));
    }
}
