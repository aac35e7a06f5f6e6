//! Remote persistence engine for staging and prod.
//!
//! Talks to a PostgREST-style document API:
//!
//! - reads: `GET {base}/rest/v1/{collection}?id=eq.{id}&select=doc`
//! - commits: `POST {base}/rest/v1/rpc/apply_changes` with the whole change
//!   set as one body, so the server applies it in a single transaction
//!
//! Every request carries the service key both as `apikey` and as a bearer
//! token.

use std::time::Duration;

use keel_core::{
    application::{
        ApplicationError, EngineKind, EnvironmentTag,
        ports::{Change, ChangeSet, DocumentKey, PersistenceEngine},
    },
    error::{KeelError, KeelResult},
};
use reqwest::{
    Url,
    blocking::{Client, Response},
    header::{self, HeaderMap, HeaderValue},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::settings::RemoteSettings;

#[derive(Debug, Deserialize)]
struct DocumentRow {
    doc: Value,
}

/// Document store reached over HTTP.
#[derive(Debug)]
pub struct RemoteEngine {
    environment: EnvironmentTag,
    base: Url,
    client: Client,
}

impl RemoteEngine {
    /// Build a client for `environment` from its connection settings.
    ///
    /// No request is made here; a missing or unusable URL or key is reported
    /// as [`KeelError::ConnectionConfiguration`] right away.
    pub fn connect(
        environment: EnvironmentTag,
        settings: &RemoteSettings,
        timeout: Duration,
    ) -> KeelResult<Self> {
        let prefix = environment.as_str().to_ascii_uppercase();
        let url = settings
            .url
            .as_deref()
            .ok_or_else(|| connection_error(environment, format!("{prefix}_DATABASE_URL is not set")))?;
        let key = settings
            .api_key
            .as_deref()
            .ok_or_else(|| connection_error(environment, format!("{prefix}_DATABASE_KEY is not set")))?;

        let base = parse_base_url(url)
            .map_err(|reason| connection_error(environment, format!("{prefix}_DATABASE_URL {reason}")))?;

        let mut headers = HeaderMap::new();
        let mut api_key = HeaderValue::from_str(key).map_err(|_| {
            connection_error(environment, format!("{prefix}_DATABASE_KEY is not a valid header value"))
        })?;
        api_key.set_sensitive(true);
        let mut bearer = HeaderValue::from_str(&format!("Bearer {key}")).map_err(|_| {
            connection_error(environment, format!("{prefix}_DATABASE_KEY is not a valid header value"))
        })?;
        bearer.set_sensitive(true);
        headers.insert("apikey", api_key);
        headers.insert(header::AUTHORIZATION, bearer);
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .pool_max_idle_per_host(settings.pool_size)
            .user_agent(concat!("keel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| connection_error(environment, format!("HTTP client setup failed: {e}")))?;

        debug!(
            environment = %environment,
            host = base.host_str().unwrap_or_default(),
            pool_size = settings.pool_size,
            "Remote engine configured"
        );

        Ok(Self {
            environment,
            base,
            client,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn table_url(&self, collection: &str) -> KeelResult<Url> {
        if !is_valid_collection(collection) {
            return Err(ApplicationError::persistence(format!(
                "'{collection}' is not a valid collection name"
            ))
            .into());
        }
        self.join(&format!("rest/v1/{collection}"))
    }

    fn join(&self, path: &str) -> KeelResult<Url> {
        self.base.join(path).map_err(|e| KeelError::Internal {
            message: format!("could not build request URL for {path}: {e}"),
        })
    }

    fn check(&self, response: Response, what: &str) -> KeelResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        warn!(environment = %self.environment, %status, what, "Remote engine rejected request");
        Err(ApplicationError::persistence(format!(
            "{what} failed with {status}: {}",
            body.trim()
        ))
        .into())
    }
}

impl PersistenceEngine for RemoteEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Remote
    }

    fn location(&self) -> String {
        self.base.host_str().unwrap_or("remote").to_string()
    }

    fn load(&self, key: &DocumentKey) -> KeelResult<Option<Value>> {
        let url = self.table_url(&key.collection)?;
        let response = self
            .client
            .get(url)
            .query(&[("id", format!("eq.{}", key.id)), ("select", "doc".into())])
            .send()
            .map_err(|e| transport_error(&format!("read {key}"), e))?;
        let response = self.check(response, &format!("read {key}"))?;

        let rows: Vec<DocumentRow> = response.json().map_err(|e| ApplicationError::MalformedDocument {
            collection: key.collection.clone(),
            id: key.id.clone(),
            reason: e.to_string(),
        })?;
        Ok(rows.into_iter().next().map(|row| row.doc))
    }

    fn apply(&self, changes: &ChangeSet) -> KeelResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        for change in changes.iter() {
            let collection = match change {
                Change::Put { collection, .. } | Change::Delete { collection, .. } => collection,
            };
            if !is_valid_collection(collection) {
                return Err(ApplicationError::persistence(format!(
                    "'{collection}' is not a valid collection name"
                ))
                .into());
            }
        }

        let url = self.join("rest/v1/rpc/apply_changes")?;
        let response = self
            .client
            .post(url)
            .json(&json!({ "changes": changes }))
            .send()
            .map_err(|e| transport_error("commit", e))?;
        self.check(response, "commit")?;

        debug!(changes = changes.len(), "Remote commit applied");
        Ok(())
    }

    fn ping(&self) -> KeelResult<()> {
        let url = self.join("rest/v1/")?;
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| transport_error("ping", e))?;
        self.check(response, "ping").map(|_| ())
    }
}

fn parse_base_url(raw: &str) -> Result<Url, String> {
    let mut url = Url::parse(raw.trim()).map_err(|e| format!("is not a valid URL: {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("must use http or https, got '{}'", url.scheme()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn is_valid_collection(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn connection_error(environment: EnvironmentTag, reason: String) -> KeelError {
    KeelError::ConnectionConfiguration {
        environment: environment.to_string(),
        reason,
    }
}

fn transport_error(what: &str, e: reqwest::Error) -> KeelError {
    let kind = if e.is_timeout() {
        "timed out"
    } else if e.is_connect() {
        "could not connect"
    } else {
        "failed"
    };
    ApplicationError::persistence(format!("{what} {kind}: {e}")).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(url: Option<&str>, key: Option<&str>) -> RemoteSettings {
        RemoteSettings {
            url: url.map(str::to_string),
            api_key: key.map(str::to_string),
            pool_size: 4,
        }
    }

    fn connect(url: Option<&str>, key: Option<&str>) -> KeelResult<RemoteEngine> {
        RemoteEngine::connect(
            EnvironmentTag::Staging,
            &settings(url, key),
            Duration::from_secs(1),
        )
    }

    #[test]
    fn missing_url_names_the_variable() {
        let err = connect(None, Some("k")).unwrap_err();
        match err {
            KeelError::ConnectionConfiguration {
                environment,
                reason,
            } => {
                assert_eq!(environment, "staging");
                assert!(reason.contains("STAGING_DATABASE_URL"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_key_names_the_variable() {
        let err = connect(Some("https://db.example.com"), None).unwrap_err();
        assert!(err.to_string().contains("STAGING_DATABASE_KEY"));
    }

    #[test]
    fn unparseable_url_is_a_connection_error() {
        let err = connect(Some("not a url"), Some("k")).unwrap_err();
        assert!(matches!(err, KeelError::ConnectionConfiguration { .. }));

        let err = connect(Some("ftp://db.example.com"), Some("k")).unwrap_err();
        assert!(matches!(err, KeelError::ConnectionConfiguration { .. }));
    }

    #[test]
    fn key_with_newline_is_rejected() {
        let err = connect(Some("https://db.example.com"), Some("bad\nkey")).unwrap_err();
        assert!(matches!(err, KeelError::ConnectionConfiguration { .. }));
    }

    #[test]
    fn urls_keep_the_base_path() {
        let engine = connect(Some("https://db.example.com/tenant"), Some("k")).unwrap();

        assert_eq!(engine.base_url().as_str(), "https://db.example.com/tenant/");
        assert_eq!(
            engine.table_url("users").unwrap().as_str(),
            "https://db.example.com/tenant/rest/v1/users"
        );
        assert_eq!(engine.location(), "db.example.com");
        assert_eq!(engine.kind(), EngineKind::Remote);
    }

    #[test]
    fn collection_names_cannot_escape_the_table_path() {
        let engine = connect(Some("https://db.example.com"), Some("k")).unwrap();

        assert!(engine.table_url("../admin").is_err());
        assert!(engine.table_url("").is_err());
        assert!(engine.table_url("order_items").is_ok());
    }

    #[test]
    fn empty_commit_makes_no_request() {
        // Port 9 is discard; any request would fail fast.
        let engine = connect(Some("http://127.0.0.1:9"), Some("k")).unwrap();
        engine.apply(&ChangeSet::new()).unwrap();
    }
}
