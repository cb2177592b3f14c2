// Copyright 2023 Remi Bernotavicius

use diesel::connection::SimpleConnection as _;
use diesel::prelude::Connection as _;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::path::Path;

pub mod models;
pub mod schema;

#[cfg(test)]
pub mod test_util;

pub type Connection = diesel::sqlite::SqliteConnection;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

/// Opens (creating if needed) the SQLite database at `path` and brings its
/// schema up to date. Foreign keys are off by default in SQLite and the
/// cascading deletes depend on them, so they are switched on for every
/// connection.
pub fn establish_connection(path: impl AsRef<Path>) -> crate::Result<Connection> {
    let path = path.as_ref();
    let url = path
        .to_str()
        .ok_or_else(|| crate::Error::Config(format!("database path {path:?} is not UTF-8")))?;
    let mut connection = Connection::establish(url)?;
    connection.batch_execute("PRAGMA foreign_keys = ON")?;
    let applied = connection
        .run_pending_migrations(MIGRATIONS)
        .map_err(crate::Error::Migration)?;
    if !applied.is_empty() {
        log::info!("applied {} migration(s) to {url}", applied.len());
    }
    Ok(connection)
}

#[test]
fn migrations() {
    let mut conn = establish_connection(":memory:").unwrap();

    let reverted = conn.revert_all_migrations(MIGRATIONS).unwrap();
    assert_eq!(reverted.len(), 3);
    conn.run_pending_migrations(MIGRATIONS).unwrap();
    assert!(!conn.has_pending_migration(MIGRATIONS).unwrap());
}

#[test]
fn foreign_keys_enabled() {
    use diesel::RunQueryDsl as _;

    #[derive(diesel::QueryableByName)]
    struct Pragma {
        #[diesel(sql_type = diesel::sql_types::Integer)]
        foreign_keys: i32,
    }

    let mut conn = establish_connection(":memory:").unwrap();
    let pragma: Pragma = diesel::sql_query("PRAGMA foreign_keys")
        .get_result(&mut conn)
        .unwrap();
    assert_eq!(pragma.foreign_keys, 1);
}
