//! In-memory store.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use super::{ConsentStore, StoreError};
use crate::consent::model::{Client, ConsentTemplate, Submission};

#[derive(Default)]
struct Tables {
    templates: HashMap<Uuid, ConsentTemplate>,
    clients: HashMap<Uuid, Client>,
    submissions: HashMap<Uuid, Submission>,
}

/// Keeps every record in process memory behind a single lock, which also
/// makes the referential checks atomic.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConsentStore for InMemoryStore {
    async fn list_templates(&self) -> Result<Vec<ConsentTemplate>, StoreError> {
        let tables = self.tables.read();
        let mut templates: Vec<ConsentTemplate> = tables.templates.values().cloned().collect();
        templates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(templates)
    }

    async fn get_template(&self, id: &Uuid) -> Result<Option<ConsentTemplate>, StoreError> {
        Ok(self.tables.read().templates.get(id).cloned())
    }

    async fn get_template_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<ConsentTemplate>, StoreError> {
        let tables = self.tables.read();
        Ok(tables.templates.values().find(|t| t.slug == slug).cloned())
    }

    async fn insert_template(&self, template: &ConsentTemplate) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        let taken = tables
            .templates
            .values()
            .any(|t| t.slug == template.slug && t.id != template.id);
        if taken {
            return Err(StoreError::Conflict(format!(
                "Template slug '{}' already exists",
                template.slug
            )));
        }
        tables.templates.insert(template.id, template.clone());
        Ok(())
    }

    async fn delete_template(&self, id: &Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if !tables.templates.contains_key(id) {
            return Err(StoreError::NotFound(format!("Template {}", id)));
        }
        let referenced = tables.submissions.values().filter(|s| s.template_id == *id).count();
        if referenced > 0 {
            return Err(StoreError::Protected(format!(
                "Template {} is referenced by {} submission(s)",
                id, referenced
            )));
        }
        tables.templates.remove(id);
        Ok(())
    }

    async fn list_clients(&self) -> Result<Vec<Client>, StoreError> {
        let tables = self.tables.read();
        let mut clients: Vec<Client> = tables.clients.values().cloned().collect();
        clients.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(clients)
    }

    async fn get_client(&self, id: &Uuid) -> Result<Option<Client>, StoreError> {
        Ok(self.tables.read().clients.get(id).cloned())
    }

    async fn insert_client(&self, client: &Client) -> Result<(), StoreError> {
        self.tables.write().clients.insert(client.id, client.clone());
        Ok(())
    }

    async fn delete_client(&self, id: &Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if tables.clients.remove(id).is_none() {
            return Err(StoreError::NotFound(format!("Client {}", id)));
        }
        for submission in tables.submissions.values_mut() {
            if submission.client_id == Some(*id) {
                submission.client_id = None;
            }
        }
        Ok(())
    }

    async fn list_submissions(&self) -> Result<Vec<Submission>, StoreError> {
        let tables = self.tables.read();
        let mut submissions: Vec<Submission> = tables.submissions.values().cloned().collect();
        submissions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(submissions)
    }

    async fn get_submission(&self, id: &Uuid) -> Result<Option<Submission>, StoreError> {
        Ok(self.tables.read().submissions.get(id).cloned())
    }

    async fn insert_submission(&self, submission: &Submission) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if !tables.templates.contains_key(&submission.template_id) {
            return Err(StoreError::NotFound(format!(
                "Template {}",
                submission.template_id
            )));
        }
        let mut record = submission.clone();
        if let Some(client_id) = record.client_id {
            if !tables.clients.contains_key(&client_id) {
                record.client_id = None;
            }
        }
        tables.submissions.insert(record.id, record);
        Ok(())
    }

    async fn set_submission_document(
        &self,
        id: &Uuid,
        document: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        match tables.submissions.get_mut(id) {
            Some(submission) => {
                submission.document = document.map(str::to_string);
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("Submission {}", id))),
        }
    }

    async fn delete_submission(&self, id: &Uuid) -> Result<Submission, StoreError> {
        self.tables
            .write()
            .submissions
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(format!("Submission {}", id)))
    }
}
