use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{migrations, StoreError};
use crate::workflows::registration::{
    Guardian, HealthDisclosures, NewRegistration, PaymentStatus, PaymentUpdate, RegistrationId,
    RegistrationRecord, RegistrationRepository, RepositoryError, Sacraments,
};

const REGISTRATION_COLUMNS: &str = "id, name, phone, address, controlled_medication, \
     mobility_impairment, mental_health_condition, baptism, first_communion, confirmation, \
     created_at, payment_id, payment_status, payment_updated_at";

/// Registration store on a single SQLite connection. Writes are serialized by
/// the connection mutex.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::configure(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::configure(Connection::open_in_memory()?)
    }

    fn configure(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Brings the schema up to date. Returns the number of steps applied.
    pub fn migrate(&self) -> Result<usize, StoreError> {
        let mut conn = self.lock()?;
        migrations::apply(&mut conn)
    }

    pub fn schema_version(&self) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        migrations::current_version(&conn)
    }

    /// Fails unless the schema matches this build exactly.
    pub fn ensure_migrated(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        migrations::ensure_current(&conn)
    }

    fn insert_registration(
        &self,
        registration: NewRegistration,
    ) -> Result<RegistrationRecord, StoreError> {
        let created_at = Utc::now();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO registrations (name, phone, address, controlled_medication, \
             mobility_impairment, mental_health_condition, baptism, first_communion, \
             confirmation, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                registration.name,
                registration.phone,
                registration.address,
                registration.health.controlled_medication,
                registration.health.mobility_impairment,
                registration.health.mental_health_condition,
                registration.sacraments.baptism,
                registration.sacraments.first_communion,
                registration.sacraments.confirmation,
                created_at,
            ],
        )?;
        let id = RegistrationId(tx.last_insert_rowid());

        {
            let mut statement = tx.prepare(
                "INSERT INTO guardians (registration_id, position, name, address, phone) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (position, guardian) in registration.guardians.iter().enumerate() {
                statement.execute(params![
                    id.0,
                    position as i64,
                    guardian.name,
                    guardian.address,
                    guardian.phone,
                ])?;
            }
        }
        tx.commit()?;

        Ok(RegistrationRecord {
            id,
            registration,
            created_at,
            payment_id: None,
            payment_status: None,
            payment_updated_at: None,
        })
    }

    fn load(
        conn: &Connection,
        filter: &str,
        param: &dyn rusqlite::ToSql,
    ) -> Result<Option<RegistrationRecord>, StoreError> {
        let sql = format!("SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE {filter}");
        let row = conn
            .query_row(&sql, [param], RegistrationRow::from_row)
            .optional()?;

        match row {
            Some(row) => {
                let guardians = Self::guardians(conn, row.id)?;
                Ok(Some(row.into_record(guardians)))
            }
            None => Ok(None),
        }
    }

    fn guardians(conn: &Connection, id: RegistrationId) -> Result<Vec<Guardian>, StoreError> {
        let mut statement = conn.prepare(
            "SELECT name, address, phone FROM guardians \
             WHERE registration_id = ?1 ORDER BY position",
        )?;
        let guardians = statement
            .query_map([id.0], |row| {
                Ok(Guardian {
                    name: row.get(0)?,
                    address: row.get(1)?,
                    phone: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(guardians)
    }
}

struct RegistrationRow {
    id: RegistrationId,
    name: String,
    phone: String,
    address: Option<String>,
    health: HealthDisclosures,
    sacraments: Sacraments,
    created_at: DateTime<Utc>,
    payment_id: Option<String>,
    payment_status: Option<String>,
    payment_updated_at: Option<DateTime<Utc>>,
}

impl RegistrationRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: RegistrationId(row.get(0)?),
            name: row.get(1)?,
            phone: row.get(2)?,
            address: row.get(3)?,
            health: HealthDisclosures {
                controlled_medication: row.get(4)?,
                mobility_impairment: row.get(5)?,
                mental_health_condition: row.get(6)?,
            },
            sacraments: Sacraments {
                baptism: row.get(7)?,
                first_communion: row.get(8)?,
                confirmation: row.get(9)?,
            },
            created_at: row.get(10)?,
            payment_id: row.get(11)?,
            payment_status: row.get(12)?,
            payment_updated_at: row.get(13)?,
        })
    }

    fn into_record(self, guardians: Vec<Guardian>) -> RegistrationRecord {
        RegistrationRecord {
            id: self.id,
            registration: NewRegistration {
                name: self.name,
                phone: self.phone,
                address: self.address,
                guardians,
                health: self.health,
                sacraments: self.sacraments,
            },
            created_at: self.created_at,
            payment_id: self.payment_id,
            payment_status: self.payment_status.as_deref().map(PaymentStatus::from),
            payment_updated_at: self.payment_updated_at,
        }
    }
}

impl RegistrationRepository for SqliteStore {
    fn insert(
        &self,
        registration: NewRegistration,
    ) -> Result<RegistrationRecord, RepositoryError> {
        if registration.name.trim().is_empty() {
            return Err(RepositoryError::Incomplete("name"));
        }
        if registration.phone.trim().is_empty() {
            return Err(RepositoryError::Incomplete("phone"));
        }
        Ok(self.insert_registration(registration)?)
    }

    fn fetch(&self, id: RegistrationId) -> Result<Option<RegistrationRecord>, RepositoryError> {
        let conn = self.lock()?;
        Ok(Self::load(&conn, "id = ?1", &id.0)?)
    }

    fn find_by_payment_id(
        &self,
        payment_id: &str,
    ) -> Result<Option<RegistrationRecord>, RepositoryError> {
        let conn = self.lock()?;
        Ok(Self::load(
            &conn,
            "payment_id = ?1 ORDER BY id DESC LIMIT 1",
            &payment_id,
        )?)
    }

    fn record_payment(
        &self,
        id: RegistrationId,
        update: &PaymentUpdate,
    ) -> Result<Option<RegistrationRecord>, RepositoryError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE registrations \
                 SET payment_id = ?1, payment_status = ?2, payment_updated_at = ?3 \
                 WHERE id = ?4",
                params![update.payment_id, update.status.as_str(), Utc::now(), id.0],
            )
            .map_err(StoreError::from)?;
        if changed == 0 {
            return Ok(None);
        }
        Ok(Self::load(&conn, "id = ?1", &id.0)?)
    }

    fn latest_without_payment(&self) -> Result<Option<RegistrationRecord>, RepositoryError> {
        let conn = self.lock()?;
        let id: Option<i64> = conn
            .query_row(
                "SELECT id FROM registrations WHERE payment_id IS NULL ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)?;

        match id {
            Some(id) => Ok(Self::load(&conn, "id = ?1", &id)?),
            None => Ok(None),
        }
    }
}
