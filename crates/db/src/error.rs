//! Typed error type for the db crate.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A child row referenced a parent that does not exist.  Postgres reports
    /// the same condition as a foreign-key violation.
    #[error("no row {id} in {table}")]
    MissingParent { table: &'static str, id: Uuid },
}

impl DbError {
    /// The write referenced a workflow instance that is gone, e.g. removed by
    /// cleanup between a read and a step insert.
    pub fn is_missing_parent(&self) -> bool {
        match self {
            Self::MissingParent { .. } => true,
            Self::Sqlx(sqlx::Error::Database(e)) => e.is_foreign_key_violation(),
            _ => false,
        }
    }
}
