use crate::database::check_identifier;
use crate::database::Datastore;
use crate::database::DatastoreError;
use crate::database::Direction;
use crate::database::Record;
use async_trait::async_trait;
use reqwest::Response;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client of a PostgREST style endpoint, as exposed by Supabase under `/rest/v1`.
#[derive(Clone)]
pub struct RestStore {
    http: reqwest::Client,
    endpoint: Url,
    access_key: String,
}

impl RestStore {
    pub fn new(endpoint: &str, access_key: impl Into<String>) -> Result<Self, DatastoreError> {
        let endpoint = Url::parse(endpoint)
            .ok()
            .filter(|url| !url.cannot_be_a_base() && matches!(url.scheme(), "http" | "https"))
            .ok_or_else(|| DatastoreError::InvalidEndpoint(endpoint.to_owned()))?;
        let http = reqwest::Client::builder()
            .user_agent(format!("sheet-sync/{}", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(RestStore { http, endpoint, access_key: access_key.into() })
    }

    fn table_url(&self, table: &str) -> Result<Url, DatastoreError> {
        let table = check_identifier(table)?;
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| DatastoreError::InvalidEndpoint(self.endpoint.to_string()))?
            .pop_if_empty()
            .extend(["rest", "v1", table]);
        Ok(url)
    }
}

#[async_trait]
impl Datastore for RestStore {
    async fn insert(&self, table: &str, records: &[Record]) -> Result<(), DatastoreError> {
        let url = self.table_url(table)?;
        debug!(%url, records = records.len(), "inserting records");
        let response = self
            .http
            .post(url)
            .header("apikey", &self.access_key)
            .bearer_auth(&self.access_key)
            .header("Prefer", "return=minimal")
            .json(records)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn select(&self, table: &str, order_by: &str, direction: Direction) -> Result<Vec<Record>, DatastoreError> {
        let mut url = self.table_url(table)?;
        let order_by = check_identifier(order_by)?;
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("order", &format!("{}.{}", order_by, direction.as_str()));
        debug!(%url, "selecting records");
        let response = self
            .http
            .get(url)
            .header("apikey", &self.access_key)
            .bearer_auth(&self.access_key)
            .send()
            .await?;
        let body = check_status(response).await?.text().await?;
        serde_json::from_str(&body).map_err(|error| DatastoreError::Decode(error.to_string()))
    }
}

/// Non-2xx answers carry a JSON error object whose `message` is the useful part.
async fn check_status(response: Response) -> Result<Response, DatastoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|value| value.get("message").and_then(Value::as_str).map(str::to_owned))
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| match body.trim() {
            "" => status.canonical_reason().unwrap_or("request failed").to_owned(),
            text => text.to_owned(),
        });
    Err(DatastoreError::Rejected { status: status.as_u16(), message })
}
