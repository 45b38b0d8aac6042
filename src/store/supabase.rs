//! Supabase (PostgREST) store

use super::{BlueprintStore, OptimizationHistoryRecord, OptimizedBlueprintRecord, StoreError};
use crate::graph::Blueprint;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use tracing::debug;

pub struct SupabaseStore {
    base_url: String,
    service_key: String,
    client: Client,
}

impl SupabaseStore {
    pub fn new(base_url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
            client: Client::new(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
    }

    async fn insert<T: Serialize + Sync>(&self, table: &str, row: &T) -> Result<(), StoreError> {
        let response = self
            .authorize(self.client.post(self.table_url(table)))
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await?;

        check_status(response).await?;
        debug!("Inserted row into {}", table);
        Ok(())
    }
}

async fn check_status(response: Response) -> Result<Response, StoreError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Backend(format!("{}: {}", status, body)))
}

#[async_trait]
impl BlueprintStore for SupabaseStore {
    async fn fetch_blueprint(&self, id: &str, user_id: &str) -> Result<Blueprint, StoreError> {
        let response = self
            .authorize(self.client.get(self.table_url("blueprints")))
            .query(&[
                ("id", format!("eq.{}", id)),
                ("user_id", format!("eq.{}", user_id)),
                ("select", "*".to_string()),
            ])
            .send()
            .await?;

        let rows: Vec<Blueprint> = check_status(response).await?.json().await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn insert_optimized(&self, record: &OptimizedBlueprintRecord) -> Result<(), StoreError> {
        self.insert("optimized_blueprints", record).await
    }

    async fn insert_history(&self, record: &OptimizationHistoryRecord) -> Result<(), StoreError> {
        self.insert("optimization_history", record).await
    }
}
