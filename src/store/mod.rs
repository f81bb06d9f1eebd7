//! Credential stores.
//!
//! Both variants build records the same way from the schema; they differ only
//! in where the rows live.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use crate::error::StoreError;
use crate::schema::{SchemaDescriptor, UserRecord, PASSWORD_COLUMN};

pub mod memory;
pub mod password;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Creates a user from fields keyed by column name.
    async fn create_user(&self, fields: HashMap<String, String>) -> Result<(), StoreError>;

    /// Checks the password and returns the full record without the password
    /// hash. Hidden columns are included; this is what claim mapping reads.
    async fn authenticate(&self, username: &str, password: &str)
        -> Result<UserRecord, StoreError>;

    /// Checks the password and returns only the externally visible columns.
    async fn get_user_info(
        &self,
        username: &str,
        password: &str,
    ) -> Result<UserRecord, StoreError> {
        let record = self.authenticate(username, password).await?;
        Ok(self.schema().visible(record))
    }

    fn schema(&self) -> &SchemaDescriptor;
}

/// Applies defaults, required checks, type checks and password hashing.
pub(crate) fn prepare_record(
    schema: &SchemaDescriptor,
    mut fields: HashMap<String, String>,
) -> Result<UserRecord, StoreError> {
    let mut record = UserRecord::new();
    for col in schema.columns() {
        let value = match fields.remove(&col.name) {
            Some(value) => value,
            None => match &col.default {
                Some(default) => default.clone(),
                None if col.required => return Err(StoreError::MissingField(col.name.clone())),
                None => continue,
            },
        };

        if col.is_password() {
            record.insert(col.name.clone(), password::hash_password(&value)?);
            continue;
        }
        let value = col
            .column_type
            .canonical(&value)
            .ok_or_else(|| StoreError::InvalidValue {
                column: col.name.clone(),
                expected: col.column_type.keyword(),
            })?;
        record.insert(col.name.clone(), value);
    }

    let username = &schema.username_column().name;
    if !record.contains_key(username) {
        return Err(StoreError::MissingField(username.clone()));
    }
    if !fields.is_empty() {
        debug!(ignored = ?fields.keys().collect::<Vec<_>>(), "fields outside the schema ignored");
    }
    Ok(record)
}

/// Removes the stored hash from `record` and compares it with `password`.
pub(crate) fn check_password(record: &mut UserRecord, password: &str) -> Result<(), StoreError> {
    let hash = record
        .remove(PASSWORD_COLUMN)
        .ok_or(StoreError::InvalidPassword)?;
    if password::verify_password(password, &hash)? {
        Ok(())
    } else {
        Err(StoreError::InvalidPassword)
    }
}
