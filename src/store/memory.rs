use std::collections::{hash_map::Entry, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{info, warn};

use super::{check_password, prepare_record, CredentialStore};
use crate::error::StoreError;
use crate::schema::{SchemaDescriptor, UserRecord};

/// Schema-driven store keeping records in process memory.
///
/// One lock guards the whole table: creation takes it exclusively,
/// authentication shares it.
pub struct InMemoryStore {
    users: RwLock<HashMap<String, UserRecord>>,
    schema: SchemaDescriptor,
}

impl InMemoryStore {
    pub fn new(schema: SchemaDescriptor) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            schema,
        }
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn create_user(&self, fields: HashMap<String, String>) -> Result<(), StoreError> {
        // Hash outside the lock; the existence check and insert happen together below.
        let record = prepare_record(&self.schema, fields)?;
        let username = record[&self.schema.username_column().name].clone();

        match self.users.write().entry(username.clone()) {
            Entry::Occupied(_) => {
                warn!(username = %username, "user already exists");
                return Err(StoreError::UserExists);
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
        }
        info!(username = %username, "user created");
        Ok(())
    }

    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<UserRecord, StoreError> {
        let mut record = self
            .users
            .read()
            .get(username)
            .cloned()
            .ok_or(StoreError::UserNotFound)?;
        check_password(&mut record, password)?;
        Ok(record)
    }

    fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }
}
