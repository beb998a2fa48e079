use rusqlite::Connection;
use tracing::info;

use super::StoreError;

/// Ordered schema steps; step `n` moves `user_version` from `n` to `n + 1`.
const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE registrations (
        id                 INTEGER PRIMARY KEY AUTOINCREMENT,
        name               TEXT NOT NULL CHECK (length(trim(name)) > 0),
        phone              TEXT NOT NULL CHECK (length(trim(phone)) > 0),
        created_at         TEXT NOT NULL,
        payment_id         TEXT,
        payment_status     TEXT,
        payment_updated_at TEXT
    );
    CREATE INDEX registrations_payment_id ON registrations (payment_id);
    "#,
    r#"
    ALTER TABLE registrations ADD COLUMN address TEXT;
    ALTER TABLE registrations ADD COLUMN controlled_medication TEXT;
    ALTER TABLE registrations ADD COLUMN mobility_impairment TEXT;
    ALTER TABLE registrations ADD COLUMN mental_health_condition TEXT;
    ALTER TABLE registrations ADD COLUMN baptism INTEGER NOT NULL DEFAULT 0;
    ALTER TABLE registrations ADD COLUMN first_communion INTEGER NOT NULL DEFAULT 0;
    ALTER TABLE registrations ADD COLUMN confirmation INTEGER NOT NULL DEFAULT 0;
    CREATE TABLE guardians (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        registration_id INTEGER NOT NULL REFERENCES registrations (id) ON DELETE CASCADE,
        position        INTEGER NOT NULL,
        name            TEXT NOT NULL,
        address         TEXT,
        phone           TEXT
    );
    CREATE INDEX guardians_registration ON guardians (registration_id, position);
    "#,
];

pub const SCHEMA_VERSION: i64 = MIGRATIONS.len() as i64;

pub(super) fn current_version(conn: &Connection) -> Result<i64, StoreError> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

/// Applies pending steps, each in its own transaction. Returns how many ran.
pub(super) fn apply(conn: &mut Connection) -> Result<usize, StoreError> {
    let found = current_version(conn)?;
    if found > SCHEMA_VERSION {
        return Err(StoreError::SchemaTooNew(found));
    }

    let mut applied = 0;
    for (index, sql) in MIGRATIONS.iter().enumerate().skip(found as usize) {
        let target = index as i64 + 1;
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", target)?;
        tx.commit()?;
        info!(version = target, "applied schema migration");
        applied += 1;
    }
    Ok(applied)
}

pub(super) fn ensure_current(conn: &Connection) -> Result<(), StoreError> {
    match current_version(conn)? {
        found if found == SCHEMA_VERSION => Ok(()),
        found if found > SCHEMA_VERSION => Err(StoreError::SchemaTooNew(found)),
        found => Err(StoreError::SchemaOutdated {
            found,
            expected: SCHEMA_VERSION,
        }),
    }
}
