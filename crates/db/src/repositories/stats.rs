//! Aggregate entity counts for the admin stats endpoint.

use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter};
use serde::Serialize;
use thiserror::Error;

use crate::entities::{
    boards, card_attachments, card_comments, cards, lists, users, workspaces,
};

/// Errors from stats queries.
#[derive(Debug, Error)]
pub enum StatsError {
    /// One of the count queries failed.
    #[error("failed to count {entity}: {source}")]
    Count {
        /// Table being counted.
        entity: &'static str,
        /// Underlying database error.
        #[source]
        source: DbErr,
    },
}

/// Row counts of live (not soft-deleted) entities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityCounts {
    /// Registered users.
    pub users: u64,
    /// Workspaces.
    pub workspaces: u64,
    /// Boards across all workspaces.
    pub boards: u64,
    /// Lists.
    pub lists: u64,
    /// Cards.
    pub cards: u64,
    /// Card comments.
    pub comments: u64,
    /// Card attachments.
    pub attachments: u64,
}

/// Stats repository.
#[derive(Debug, Clone)]
pub struct StatsRepository {
    db: DatabaseConnection,
}

macro_rules! count_live {
    ($db:expr, $module:ident, $name:literal) => {
        async {
            $module::Entity::find()
                .filter($module::Column::DeletedAt.is_null())
                .count($db)
                .await
                .map_err(|source| StatsError::Count {
                    entity: $name,
                    source,
                })
        }
    };
}

impl StatsRepository {
    /// Creates a new stats repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Counts every live entity type concurrently.
    ///
    /// # Errors
    ///
    /// Returns the first failing count.
    pub async fn counts(&self) -> Result<EntityCounts, StatsError> {
        let db = &self.db;
        let (users, workspaces, boards, lists, cards, comments, attachments) = tokio::try_join!(
            count_live!(db, users, "users"),
            count_live!(db, workspaces, "workspaces"),
            count_live!(db, boards, "boards"),
            count_live!(db, lists, "lists"),
            count_live!(db, cards, "cards"),
            count_live!(db, card_comments, "card_comments"),
            count_live!(db, card_attachments, "card_attachments"),
        )?;

        Ok(EntityCounts {
            users,
            workspaces,
            boards,
            lists,
            cards,
            comments,
            attachments,
        })
    }
}
