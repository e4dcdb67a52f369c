//! CouchDB adapter over the HTTP API

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

use super::{DocMeta, DocResult, DocStoreError, DocumentStore, FindQuery, doc_id};

/// `{"ok": true, "id": ..., "rev": ...}` write response
#[derive(Debug, Deserialize)]
struct WriteResponse {
    id: String,
    rev: String,
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    #[serde(default)]
    docs: Vec<Value>,
    #[serde(default)]
    warning: Option<String>,
}

/// One CouchDB database reached over HTTP with basic auth
#[derive(Clone)]
pub struct CouchDocumentStore {
    client: Client,
    base_url: Url,
    db: String,
    user: String,
    password: String,
}

impl CouchDocumentStore {
    pub fn new(
        base_url: &str,
        db: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> DocResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| DocStoreError::Unavailable(format!("invalid CouchDB URL: {e}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DocStoreError::Unavailable(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            db: db.into(),
            user: user.into(),
            password: password.into(),
        })
    }

    /// Build `{base}/{db}/{segments...}` with each segment percent-encoded
    fn url(&self, segments: &[&str]) -> DocResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| DocStoreError::Unavailable("CouchDB URL cannot be a base".into()))?;
            path.pop_if_empty().push(&self.db);
            for s in segments {
                path.push(s);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.user, Some(&self.password))
    }

    async fn send(&self, builder: RequestBuilder) -> DocResult<Response> {
        builder
            .send()
            .await
            .map_err(|e| DocStoreError::Unavailable(e.to_string()))
    }

    async fn write_response(resp: Response, id: &str) -> DocResult<DocMeta> {
        match resp.status() {
            StatusCode::OK | StatusCode::CREATED | StatusCode::ACCEPTED => {
                let body: WriteResponse = resp
                    .json()
                    .await
                    .map_err(|e| DocStoreError::Malformed(e.to_string()))?;
                Ok(DocMeta {
                    id: body.id,
                    rev: body.rev,
                })
            }
            StatusCode::CONFLICT => Err(DocStoreError::Conflict(id.to_string())),
            StatusCode::NOT_FOUND => Err(DocStoreError::NotFound(id.to_string())),
            status => Err(Self::unexpected(status, resp).await),
        }
    }

    async fn unexpected(status: StatusCode, resp: Response) -> DocStoreError {
        let body = resp.text().await.unwrap_or_default();
        DocStoreError::Unavailable(format!("unexpected status {status}: {body}"))
    }

    /// Create the database if missing (`412 Precondition Failed` = exists)
    pub async fn ensure_database(&self) -> DocResult<()> {
        let url = self.url(&[])?;
        let resp = self.send(self.request(Method::PUT, url)).await?;
        match resp.status() {
            StatusCode::CREATED | StatusCode::ACCEPTED => {
                tracing::info!(db = %self.db, "Created CouchDB database");
                Ok(())
            }
            StatusCode::PRECONDITION_FAILED => Ok(()),
            status => Err(Self::unexpected(status, resp).await),
        }
    }

    async fn find(&self, query: &FindQuery) -> DocResult<Vec<Value>> {
        let url = self.url(&["_find"])?;
        let resp = self
            .send(self.request(Method::POST, url).json(&query.to_body()))
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            return Err(Self::unexpected(status, resp).await);
        }
        let body: FindResponse = resp
            .json()
            .await
            .map_err(|e| DocStoreError::Malformed(e.to_string()))?;
        if let Some(warning) = body.warning {
            tracing::debug!(db = %self.db, warning = %warning, "CouchDB _find warning");
        }
        Ok(body.docs)
    }
}

#[async_trait]
impl DocumentStore for CouchDocumentStore {
    fn db_name(&self) -> &str {
        &self.db
    }

    async fn create_doc(&self, doc: Value) -> DocResult<DocMeta> {
        let id = doc_id(&doc).unwrap_or_default().to_string();
        let url = self.url(&[])?;
        let resp = self.send(self.request(Method::POST, url).json(&doc)).await?;
        Self::write_response(resp, &id).await
    }

    async fn get_doc(&self, id: &str) -> DocResult<Option<Value>> {
        let url = self.url(&[id])?;
        let resp = self.send(self.request(Method::GET, url)).await?;
        match resp.status() {
            StatusCode::OK => resp
                .json()
                .await
                .map(Some)
                .map_err(|e| DocStoreError::Malformed(e.to_string())),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(Self::unexpected(status, resp).await),
        }
    }

    async fn put_doc(&self, doc: Value) -> DocResult<DocMeta> {
        let id = doc_id(&doc)
            .ok_or_else(|| DocStoreError::Malformed("missing _id".into()))?
            .to_string();
        let url = self.url(&[&id])?;
        let resp = self.send(self.request(Method::PUT, url).json(&doc)).await?;
        Self::write_response(resp, &id).await
    }

    async fn delete_doc(&self, id: &str, rev: &str) -> DocResult<()> {
        let mut url = self.url(&[id])?;
        url.query_pairs_mut().append_pair("rev", rev);
        let resp = self.send(self.request(Method::DELETE, url)).await?;
        Self::write_response(resp, id).await.map(|_| ())
    }

    async fn query(&self, query: &FindQuery) -> Vec<Value> {
        match self.find(query).await {
            Ok(docs) => docs,
            Err(e) => {
                tracing::warn!(db = %self.db, error = %e, "Document query failed");
                Vec::new()
            }
        }
    }

    async fn ensure_index(&self, fields: &[&str], name: &str) -> DocResult<()> {
        let url = self.url(&["_index"])?;
        let body = json!({
            "index": { "fields": fields },
            "name": name,
            "type": "json",
        });
        let resp = self.send(self.request(Method::POST, url).json(&body)).await?;
        match resp.status() {
            StatusCode::OK | StatusCode::CREATED => {
                tracing::debug!(db = %self.db, index = %name, "Index ensured");
                Ok(())
            }
            // Index already exists
            StatusCode::BAD_REQUEST | StatusCode::CONFLICT => {
                tracing::debug!(db = %self.db, index = %name, "Index already present");
                Ok(())
            }
            status => Err(Self::unexpected(status, resp).await),
        }
    }
}
