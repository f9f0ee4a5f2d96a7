//! REST implementation of IRemoteStore
//!
//! Maps the four remote-store operations onto the table API:
//!
//! | Operation | Request                                                    |
//! |-----------|------------------------------------------------------------|
//! | select    | `GET /rest/v1/<table>?select=*&<col>=eq.<val>`             |
//! | insert    | `POST /rest/v1/<table>` with `Prefer: return=representation` |
//! | update    | `PATCH /rest/v1/<table>?id=eq.<id>`                        |
//! | delete    | `DELETE /rest/v1/<table>?id=eq.<id>`                       |

use anyhow::{Context, Result};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use fitsync_core::config::RemoteConfig;
use fitsync_core::domain::{record::ID_FIELD, Collection, EntityRecord, RecordId};
use fitsync_core::ports::{IRemoteStore, RemoteFilter};

use crate::client::RestClient;
use crate::RemoteError;

/// Remote store backed by the REST table API
pub struct RestRemoteStore {
    client: RestClient,
}

impl RestRemoteStore {
    /// Creates a store over an existing client
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }

    /// Creates a store from the `remote` configuration section
    pub fn from_config(config: &RemoteConfig) -> Self {
        Self::new(RestClient::from_config(config))
    }

    /// Creates a store for a custom base URL (useful for testing)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self::new(RestClient::new(base_url))
    }

    /// Returns the underlying client
    pub fn client(&self) -> &RestClient {
        &self.client
    }
}

fn id_filter(id: &RecordId) -> [(&'static str, String); 1] {
    [(ID_FIELD, format!("eq.{}", id.as_str()))]
}

/// Extracts the stored row from an insert response
///
/// With `return=representation` the API answers with an array holding the
/// inserted row; a bare object is accepted too.
fn first_row(body: Value) -> Result<EntityRecord, RemoteError> {
    let row = match body {
        Value::Array(rows) => rows.into_iter().next(),
        obj @ Value::Object(_) => Some(obj),
        _ => None,
    };
    let row = row.ok_or_else(|| RemoteError::InvalidResponse("insert returned no row".into()))?;
    let record =
        EntityRecord::from_value(row).map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
    if record.id().is_none() {
        return Err(RemoteError::InvalidResponse(
            "inserted row has no id".into(),
        ));
    }
    Ok(record)
}

#[async_trait::async_trait]
impl IRemoteStore for RestRemoteStore {
    async fn select(
        &self,
        collection: Collection,
        filter: &RemoteFilter,
    ) -> Result<Vec<EntityRecord>> {
        let mut query: Vec<(String, String)> = vec![("select".into(), "*".into())];
        query.extend(
            filter
                .predicates()
                .iter()
                .map(|(field, value)| (field.clone(), format!("eq.{value}"))),
        );

        debug!(collection = %collection, predicates = filter.predicates().len(), "Remote select");
        let response = self
            .client
            .request(Method::GET, collection.as_str())
            .query(&query)
            .send()
            .await
            .map_err(RemoteError::from)
            .with_context(|| format!("Failed to select from {collection}"))?;

        let rows: Vec<EntityRecord> = RestClient::check(response)
            .await
            .with_context(|| format!("GET {collection} returned error status"))?
            .json()
            .await
            .with_context(|| format!("Failed to parse {collection} rows"))?;
        Ok(rows)
    }

    async fn insert(&self, collection: Collection, record: &EntityRecord) -> Result<EntityRecord> {
        debug!(collection = %collection, "Remote insert");
        let response = self
            .client
            .request(Method::POST, collection.as_str())
            .header("Prefer", "return=representation")
            .json(record)
            .send()
            .await
            .map_err(RemoteError::from)
            .with_context(|| format!("Failed to insert into {collection}"))?;

        let body: Value = RestClient::check(response)
            .await
            .with_context(|| format!("POST {collection} returned error status"))?
            .json()
            .await
            .with_context(|| format!("Failed to parse {collection} insert response"))?;

        Ok(first_row(body)?)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &RecordId,
        patch: &EntityRecord,
    ) -> Result<()> {
        let mut body = patch.clone();
        body.remove(ID_FIELD);

        debug!(collection = %collection, entity_id = %id, "Remote update");
        let response = self
            .client
            .request(Method::PATCH, collection.as_str())
            .query(&id_filter(id))
            .json(&body)
            .send()
            .await
            .map_err(RemoteError::from)
            .with_context(|| format!("Failed to update {collection}/{id}"))?;

        RestClient::check(response)
            .await
            .with_context(|| format!("PATCH {collection}/{id} returned error status"))?;
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &RecordId) -> Result<()> {
        debug!(collection = %collection, entity_id = %id, "Remote delete");
        let response = self
            .client
            .request(Method::DELETE, collection.as_str())
            .query(&id_filter(id))
            .send()
            .await
            .map_err(RemoteError::from)
            .with_context(|| format!("Failed to delete {collection}/{id}"))?;

        RestClient::check(response)
            .await
            .with_context(|| format!("DELETE {collection}/{id} returned error status"))?;
        Ok(())
    }
}
