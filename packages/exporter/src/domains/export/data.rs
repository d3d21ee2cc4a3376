//! PostgreSQL-backed evidence provider.
//!
//! Reads each record category as `jsonb` so the pipeline stays agnostic of
//! the domain tables' shapes.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::kernel::traits::{EvidenceProvider, ProviderError};

pub struct PgEvidenceProvider {
    pool: PgPool,
}

impl PgEvidenceProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn framework_exists(&self, framework_id: Uuid) -> Result<bool, ProviderError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM frameworks WHERE id = $1)")
            .bind(framework_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ProviderError::Unavailable(e.into()))
    }

    async fn fetch_category(
        &self,
        table: &'static str,
        organization_id: Uuid,
        framework_id: Uuid,
    ) -> Result<Vec<serde_json::Value>, ProviderError> {
        let sql = format!(
            "SELECT to_jsonb(t) FROM {table} t \
             WHERE t.organization_id = $1 AND t.framework_id = $2 \
             ORDER BY t.created_at, t.id"
        );

        sqlx::query_scalar::<_, serde_json::Value>(&sql)
            .bind(organization_id)
            .bind(framework_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ProviderError::Unavailable(e.into()))
    }
}

#[async_trait]
impl EvidenceProvider for PgEvidenceProvider {
    async fn fetch_controls(
        &self,
        organization_id: Uuid,
        framework_id: Uuid,
    ) -> Result<Vec<serde_json::Value>, ProviderError> {
        // The first stage also validates the framework so a bad id fails
        // terminally instead of producing an empty bundle.
        if !self.framework_exists(framework_id).await? {
            return Err(ProviderError::FrameworkNotFound(framework_id));
        }
        self.fetch_category("controls", organization_id, framework_id)
            .await
    }

    async fn fetch_evidence(
        &self,
        organization_id: Uuid,
        framework_id: Uuid,
    ) -> Result<Vec<serde_json::Value>, ProviderError> {
        self.fetch_category("evidence_items", organization_id, framework_id)
            .await
    }

    async fn fetch_tasks(
        &self,
        organization_id: Uuid,
        framework_id: Uuid,
    ) -> Result<Vec<serde_json::Value>, ProviderError> {
        self.fetch_category("tasks", organization_id, framework_id)
            .await
    }

    async fn fetch_policies(
        &self,
        organization_id: Uuid,
        framework_id: Uuid,
    ) -> Result<Vec<serde_json::Value>, ProviderError> {
        self.fetch_category("policies", organization_id, framework_id)
            .await
    }

    async fn fetch_automation_log(
        &self,
        organization_id: Uuid,
        framework_id: Uuid,
    ) -> Result<Vec<serde_json::Value>, ProviderError> {
        self.fetch_category("automation_log", organization_id, framework_id)
            .await
    }

    async fn fetch_score_history(
        &self,
        organization_id: Uuid,
        framework_id: Uuid,
    ) -> Result<Vec<serde_json::Value>, ProviderError> {
        self.fetch_category("score_history", organization_id, framework_id)
            .await
    }
}
