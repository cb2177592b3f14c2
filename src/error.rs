// Copyright 2023 Remi Bernotavicius

use diesel::result::DatabaseErrorKind;
use std::fmt;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("{0} already exists")]
    Duplicate(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("users cannot follow themselves")]
    SelfFollow,

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("failed to open database: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("failed to run migrations: {0}")]
    Migration(Box<dyn std::error::Error + Send + Sync + 'static>),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Config(String),
}

impl Error {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Maps the store's own reports of missing rows and unique-constraint
/// violations onto the domain errors, naming the entity involved.
pub(crate) trait QueryResultExt<T> {
    fn or_not_found(self, what: impl fmt::Display) -> Result<T>;
    fn or_duplicate(self, what: impl fmt::Display) -> Result<T>;
}

impl<T> QueryResultExt<T> for diesel::QueryResult<T> {
    fn or_not_found(self, what: impl fmt::Display) -> Result<T> {
        self.map_err(|e| match e {
            diesel::result::Error::NotFound => Error::NotFound(what.to_string()),
            e => e.into(),
        })
    }

    fn or_duplicate(self, what: impl fmt::Display) -> Result<T> {
        self.map_err(|e| match e {
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                Error::Duplicate(what.to_string())
            }
            e => e.into(),
        })
    }
}

#[test]
fn query_result_mapping() {
    let missing: diesel::QueryResult<()> = Err(diesel::result::Error::NotFound);
    assert!(matches!(
        missing.or_not_found("recipe 7"),
        Err(Error::NotFound(what)) if what == "recipe 7"
    ));

    let rolled_back: diesel::QueryResult<()> = Err(diesel::result::Error::RollbackTransaction);
    assert!(matches!(
        rolled_back.or_duplicate("tag"),
        Err(Error::Database(diesel::result::Error::RollbackTransaction))
    ));

    let ok: diesel::QueryResult<i32> = Ok(3);
    assert_eq!(ok.or_duplicate("tag").unwrap(), 3);
}

#[test]
fn unique_violation_is_duplicate() {
    let violated: diesel::QueryResult<()> = Err(diesel::result::Error::DatabaseError(
        DatabaseErrorKind::UniqueViolation,
        Box::new(String::from("UNIQUE constraint failed: favorites.user_id")),
    ));
    assert!(matches!(
        violated.or_duplicate("recipe 1 in favorites"),
        Err(Error::Duplicate(what)) if what == "recipe 1 in favorites"
    ));

    let other: diesel::QueryResult<()> = Err(diesel::result::Error::DatabaseError(
        DatabaseErrorKind::ForeignKeyViolation,
        Box::new(String::from("FOREIGN KEY constraint failed")),
    ));
    assert!(matches!(
        other.or_duplicate("recipe 1 in favorites"),
        Err(Error::Database(_))
    ));
}
