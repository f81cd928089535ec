//! SQLite contact repository implementation.

use chrono::Utc;
use leadflow_core::repository::contact::ContactRepository;
use leadflow_types::contact::Contact;
use leadflow_types::error::RepositoryError;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, from_json, parse_datetime, parse_uuid, query_err, to_json};

/// SQLite-backed implementation of `ContactRepository`.
#[derive(Clone)]
pub struct SqliteContactRepository {
    pool: DatabasePool,
}

impl SqliteContactRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct ContactRow {
    id: String,
    name: String,
    email: Option<String>,
    phone: Option<String>,
    extra: String,
    created_at: String,
}

impl ContactRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            extra: row.try_get("extra")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_contact(self) -> Result<Contact, RepositoryError> {
        Ok(Contact {
            id: Some(parse_uuid(&self.id)?),
            name: self.name,
            email: self.email,
            phone: self.phone,
            created_at: Some(parse_datetime(&self.created_at)?),
            extra: from_json("extra", &self.extra)?,
        })
    }
}

impl ContactRepository for SqliteContactRepository {
    async fn create_contact(&self, contact: &Contact) -> Result<(), RepositoryError> {
        let id = contact
            .id
            .ok_or_else(|| RepositoryError::Query("contact has no id".to_string()))?;
        let created_at = contact.created_at.unwrap_or_else(Utc::now);

        sqlx::query(
            r#"INSERT INTO contacts (id, name, email, phone, extra, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(id.to_string())
        .bind(&contact.name)
        .bind(&contact.email)
        .bind(&contact.phone)
        .bind(to_json(&contact.extra)?)
        .bind(format_datetime(&created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.message().contains("UNIQUE") => {
                RepositoryError::Conflict(format!("contact {id} already exists"))
            }
            other => query_err(other),
        })?;

        Ok(())
    }

    async fn get_contact(&self, id: &Uuid) -> Result<Option<Contact>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM contacts WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        match row {
            Some(row) => Ok(Some(ContactRow::from_row(&row).map_err(query_err)?.into_contact()?)),
            None => Ok(None),
        }
    }
}
