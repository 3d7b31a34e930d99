//! CouchDB HTTP adapter.
//!
//! Maps the `DocumentStore` calls onto the CouchDB document API:
//!
//! - `get`             -> `GET  /{db}/{id}`
//! - `insert`          -> `PUT  /{db}/{id}`
//! - `bulk_write`      -> `POST /{db}/_bulk_docs`
//! - `fetch`           -> `POST /{db}/_all_docs?include_docs=true`
//! - `fetch_revisions` -> `POST /{db}/_all_docs`

use crate::connection::config::{CouchAddress, StoreConfig};
use crate::core::{Document, ErrorKind, ForceError, StoreError};
use crate::interface::{DocumentStore, FetchRow, WriteResult};
use async_trait::async_trait;
use log::debug;
use reqwest::{Client as HttpClient, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value as JsonValue, json};
use url::Url;

pub struct CouchStore {
    http: HttpClient,
    server: Url,
    database: Option<String>,
    credentials: Option<(String, Option<String>)>,
}

/// CouchDB error body: `{"error": "...", "reason": "..."}`
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WriteResponse {
    rev: String,
}

/// One element of a `_bulk_docs` response.
#[derive(Debug, Deserialize)]
struct BulkDocResult {
    rev: Option<String>,
    error: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AllDocsResponse {
    rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
struct AllDocsRow {
    key: Option<String>,
    value: Option<RowValue>,
    doc: Option<JsonValue>,
    error: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RowValue {
    rev: String,
    #[serde(default)]
    deleted: bool,
}

impl AllDocsRow {
    fn live_rev(&self) -> Option<String> {
        if self.error.is_some() {
            return None;
        }
        self.value
            .as_ref()
            .filter(|value| !value.deleted)
            .map(|value| value.rev.clone())
    }
}

impl CouchStore {
    /// Build a store handle from a parsed address. No request is made.
    pub fn connect(address: CouchAddress, config: &StoreConfig) -> Result<Self, ForceError> {
        config.validate().map_err(ForceError::InvalidConfig)?;

        let mut builder = HttpClient::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone());
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|err| StoreError::transport(err.to_string()))?;

        let credentials = match (&config.username, &address.username) {
            (Some(username), _) => Some((username.clone(), config.password.clone())),
            (None, Some(username)) => Some((username.clone(), address.password.clone())),
            (None, None) => None,
        };

        Ok(Self {
            http,
            server: address.server,
            database: address.database,
            credentials,
        })
    }

    /// URL of `/{db}/{segments..}`, with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let database = self
            .database
            .as_deref()
            .ok_or_else(|| StoreError::new(ErrorKind::NotFound, "no database selected"))?;

        let mut url = self.server.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::bad_response("server address cannot be a base"))?
            .pop_if_empty()
            .push(database)
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some((username, password)) => request.basic_auth(username, password.as_ref()),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, StoreError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|err| StoreError::transport(err.to_string()))?;
        read_response(response).await
    }

    async fn all_docs(&self, ids: &[String], include_docs: bool) -> Result<Vec<AllDocsRow>, StoreError> {
        let mut url = self.endpoint(&["_all_docs"])?;
        if include_docs {
            url.query_pairs_mut().append_pair("include_docs", "true");
        }

        debug!("CouchStore: _all_docs for {} keys (include_docs={})", ids.len(), include_docs);
        let response: AllDocsResponse = self
            .send(self.http.post(url).json(&json!({ "keys": ids })))
            .await?;

        if response.rows.len() != ids.len() {
            return Err(StoreError::bad_response(format!(
                "_all_docs returned {} rows for {} keys",
                response.rows.len(),
                ids.len()
            )));
        }
        Ok(response.rows)
    }
}

/// Turns an HTTP response into either the decoded body or the CouchDB error
/// it carries.
async fn read_response<T: DeserializeOwned>(response: Response) -> Result<T, StoreError> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|err| StoreError::transport(err.to_string()))?;
    decode_body(status, &body)
}

fn decode_body<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> Result<T, StoreError> {
    if status.is_success() {
        return serde_json::from_slice(body)
            .map_err(|err| StoreError::bad_response(format!("decode response: {}", err)));
    }
    Err(error_from_body(status, body))
}

fn error_from_body(status: StatusCode, body: &[u8]) -> StoreError {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(ErrorBody { error: Some(code), reason }) => {
            StoreError::from_parts(Some(&code), reason.as_deref())
        }
        _ => StoreError::bad_response(format!("HTTP {}", status)),
    }
}

fn write_result(result: BulkDocResult) -> WriteResult {
    match (result.error, result.rev) {
        (Some(code), _) => Err(StoreError::from_parts(Some(&code), result.reason.as_deref())),
        (None, Some(rev)) => Ok(rev),
        (None, None) => Err(StoreError::bad_response("bulk result without rev")),
    }
}

fn fetch_row(id: &str, row: AllDocsRow) -> FetchRow {
    let key = row.key.unwrap_or_else(|| id.to_string());
    let doc = match (row.error, row.doc) {
        (Some(code), _) => Err(StoreError::from_parts(Some(&code), row.reason.as_deref())),
        // Deleted documents come back with a null doc
        (None, None | Some(JsonValue::Null)) => Err(StoreError::not_found()),
        (None, Some(doc)) => serde_json::from_value::<Document>(doc)
            .map_err(|err| StoreError::bad_response(format!("decode document: {}", err))),
    };
    FetchRow { key, doc }
}

#[async_trait]
impl DocumentStore for CouchStore {
    fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    async fn get(&self, id: &str) -> Result<Document, StoreError> {
        let url = self.endpoint(&[id])?;
        self.send(self.http.get(url)).await
    }

    async fn insert(&self, doc: &Document) -> Result<String, StoreError> {
        let url = self.endpoint(&[doc.id.as_str()])?;
        let response: WriteResponse = self.send(self.http.put(url).json(doc)).await?;
        Ok(response.rev)
    }

    async fn bulk_write(&self, docs: &[Document]) -> Result<Vec<WriteResult>, StoreError> {
        let url = self.endpoint(&["_bulk_docs"])?;
        let results: Vec<BulkDocResult> = self
            .send(self.http.post(url).json(&json!({ "docs": docs })))
            .await?;

        if results.len() != docs.len() {
            return Err(StoreError::bad_response(format!(
                "_bulk_docs returned {} results for {} documents",
                results.len(),
                docs.len()
            )));
        }

        Ok(results.into_iter().map(write_result).collect())
    }

    async fn fetch(&self, ids: &[String]) -> Result<Vec<FetchRow>, StoreError> {
        let rows = self.all_docs(ids, true).await?;

        Ok(ids.iter().zip(rows).map(|(id, row)| fetch_row(id, row)).collect())
    }

    async fn fetch_revisions(&self, ids: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        let rows = self.all_docs(ids, false).await?;
        Ok(rows.iter().map(AllDocsRow::live_rev).collect())
    }
}
