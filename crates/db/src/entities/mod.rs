//! `SeaORM` entities for the tables the backend reads.
//!
//! The schema is owned by the application; these entities only cover the
//! columns needed for session lookup and entity counts.

pub mod boards;
pub mod card_attachments;
pub mod card_comments;
pub mod cards;
pub mod lists;
pub mod sessions;
pub mod users;
pub mod workspaces;
