//! PostgreSQL store.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{ConsentStore, StoreError};
use crate::consent::model::{Client, ConsentTemplate, Submission};

const TEMPLATE_COLUMNS: &str = "id, slug, title, body, created_at, updated_at";
const CLIENT_COLUMNS: &str = "id, full_name, email, phone, notes";
const SUBMISSION_COLUMNS: &str = "id, template_id, client_id, full_name, email, phone, \
     treatment_date, treatment_type, answers, signature_image, typed_signature, signed_at, \
     document, consent_given, created_at";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and apply the embedded migrations.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .idle_timeout(std::time::Duration::from_secs(900))
            .max_lifetime(std::time::Duration::from_secs(1800))
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| sqlx::Error::Migrate(Box::new(e)))?;

        Ok(Self { pool })
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_foreign_key_violation())
        .unwrap_or(false)
}

#[async_trait]
impl ConsentStore for PgStore {
    async fn list_templates(&self) -> Result<Vec<ConsentTemplate>, StoreError> {
        let sql = format!(
            "SELECT {} FROM consent_templates ORDER BY created_at DESC",
            TEMPLATE_COLUMNS
        );
        Ok(sqlx::query_as::<_, ConsentTemplate>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_template(&self, id: &Uuid) -> Result<Option<ConsentTemplate>, StoreError> {
        let sql = format!("SELECT {} FROM consent_templates WHERE id = $1", TEMPLATE_COLUMNS);
        Ok(sqlx::query_as::<_, ConsentTemplate>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_template_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<ConsentTemplate>, StoreError> {
        let sql = format!("SELECT {} FROM consent_templates WHERE slug = $1", TEMPLATE_COLUMNS);
        Ok(sqlx::query_as::<_, ConsentTemplate>(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn insert_template(&self, template: &ConsentTemplate) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO consent_templates (id, slug, title, body, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET slug = $2, title = $3, body = $4, updated_at = $6
            "#,
        )
        .bind(template.id)
        .bind(&template.slug)
        .bind(&template.title)
        .bind(&template.body)
        .bind(template.created_at)
        .bind(template.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!("Template slug '{}' already exists", template.slug))
            } else {
                e.into()
            }
        })?;
        Ok(())
    }

    async fn delete_template(&self, id: &Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM consent_templates WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    StoreError::Protected(format!(
                        "Template {} is referenced by existing submissions",
                        id
                    ))
                } else {
                    e.into()
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("Template {}", id)));
        }
        Ok(())
    }

    async fn list_clients(&self) -> Result<Vec<Client>, StoreError> {
        let sql = format!("SELECT {} FROM clients ORDER BY full_name", CLIENT_COLUMNS);
        Ok(sqlx::query_as::<_, Client>(&sql).fetch_all(&self.pool).await?)
    }

    async fn get_client(&self, id: &Uuid) -> Result<Option<Client>, StoreError> {
        let sql = format!("SELECT {} FROM clients WHERE id = $1", CLIENT_COLUMNS);
        Ok(sqlx::query_as::<_, Client>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn insert_client(&self, client: &Client) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO clients (id, full_name, email, phone, notes)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET full_name = $2, email = $3, phone = $4, notes = $5
            "#,
        )
        .bind(client.id)
        .bind(&client.full_name)
        .bind(&client.email)
        .bind(&client.phone)
        .bind(&client.notes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_client(&self, id: &Uuid) -> Result<(), StoreError> {
        // consent_submissions.client_id is ON DELETE SET NULL
        let result = sqlx::query("DELETE FROM clients WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("Client {}", id)));
        }
        Ok(())
    }

    async fn list_submissions(&self) -> Result<Vec<Submission>, StoreError> {
        let sql = format!(
            "SELECT {} FROM consent_submissions ORDER BY created_at DESC",
            SUBMISSION_COLUMNS
        );
        Ok(sqlx::query_as::<_, Submission>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_submission(&self, id: &Uuid) -> Result<Option<Submission>, StoreError> {
        let sql = format!(
            "SELECT {} FROM consent_submissions WHERE id = $1",
            SUBMISSION_COLUMNS
        );
        Ok(sqlx::query_as::<_, Submission>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn insert_submission(&self, submission: &Submission) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO consent_submissions (
                id, template_id, client_id, full_name, email, phone,
                treatment_date, treatment_type, answers, signature_image,
                typed_signature, signed_at, document, consent_given, created_at
            )
            VALUES (
                $1, $2, (SELECT id FROM clients WHERE id = $3), $4, $5, $6,
                $7, $8, $9, $10, $11, $12, $13, $14, $15
            )
            "#,
        )
        .bind(submission.id)
        .bind(submission.template_id)
        .bind(submission.client_id)
        .bind(&submission.full_name)
        .bind(&submission.email)
        .bind(&submission.phone)
        .bind(submission.treatment_date)
        .bind(&submission.treatment_type)
        .bind(Json(&submission.answers))
        .bind(submission.signature_image.as_deref())
        .bind(&submission.typed_signature)
        .bind(submission.signed_at)
        .bind(submission.document.as_deref())
        .bind(submission.consent_given)
        .bind(submission.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                StoreError::NotFound(format!("Template {}", submission.template_id))
            } else {
                e.into()
            }
        })?;
        Ok(())
    }

    async fn set_submission_document(
        &self,
        id: &Uuid,
        document: Option<&str>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE consent_submissions SET document = $1 WHERE id = $2")
            .bind(document)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("Submission {}", id)));
        }
        Ok(())
    }

    async fn delete_submission(&self, id: &Uuid) -> Result<Submission, StoreError> {
        let sql = format!(
            "DELETE FROM consent_submissions WHERE id = $1 RETURNING {}",
            SUBMISSION_COLUMNS
        );
        sqlx::query_as::<_, Submission>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Submission {}", id)))
    }
}
