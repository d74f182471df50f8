use crate::error::StoreError;
use crate::store::{Connection, ConnectionEvent, ConnectionFactory, Durability};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use urlencoding;

/// Configuration for the ClickHouse store backend.
///
/// The backend talks to ClickHouse over HTTP using the `JSONEachRow`
/// format. Each UTC day gets its own table inside `database`, named by the
/// partition key the sink supplies (`2026_08_23` and so on).
#[derive(Clone, Debug)]
pub struct ClickHouseConfig {
    /// Database holding the per-day tables.
    pub database: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        ClickHouseConfig {
            database: "log".to_string(),
            user: None,
            password: None,
        }
    }
}

/// Connection factory for the ClickHouse HTTP interface.
///
/// The address passed by the sink is the base URL without query, e.g.
/// "http://127.0.0.1:8123". Connecting issues a ping so an unreachable
/// store fails the sink's single initial attempt instead of its first
/// write.
pub struct ClickHouseFactory {
    client: Client,
    config: ClickHouseConfig,
}

impl ClickHouseFactory {
    pub fn new(config: ClickHouseConfig) -> Self {
        ClickHouseFactory {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl ConnectionFactory for ClickHouseFactory {
    async fn connect(
        &self,
        addr: &str,
    ) -> Result<(Arc<dyn Connection>, mpsc::Receiver<ConnectionEvent>), StoreError> {
        let (events, rx) = mpsc::channel(16);
        let conn = ClickHouseConnection {
            client: self.client.clone(),
            config: self.config.clone(),
            url: addr.to_string(),
            events,
        };
        conn.ping().await?;
        Ok((Arc::new(conn), rx))
    }
}

pub struct ClickHouseConnection {
    client: Client,
    config: ClickHouseConfig,
    url: String,
    events: mpsc::Sender<ConnectionEvent>,
}

impl ClickHouseConnection {
    fn credentials(&self) -> String {
        let mut query = String::new();
        if let Some(user) = &self.config.user {
            query.push_str(&format!("&user={}", urlencoding::encode(user)));
        }
        if let Some(password) = &self.config.password {
            query.push_str(&format!("&password={}", urlencoding::encode(password)));
        }
        query
    }

    fn insert_endpoint(&self, partition: &str, durability: Durability) -> String {
        let statement = format!(
            "INSERT INTO {}.`{}` FORMAT JSONEachRow",
            self.config.database, partition
        );
        let mut query = format!("query={}", urlencoding::encode(&statement));
        if durability == Durability::Soft {
            // fire-and-forget server side: acknowledge before the part is
            // flushed to disk
            query.push_str("&async_insert=1&wait_for_async_insert=0");
        }
        query.push_str(&self.credentials());
        format!("{}/?{}", self.url, query)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let url = format!(
            "{}/?query={}{}",
            self.url,
            urlencoding::encode("SELECT 1"),
            self.credentials()
        );
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(StoreError::Connection(format!(
                "ClickHouse ping failed with status {}",
                resp.status()
            )))
        }
    }

    /// Turn a transport error into the matching lifecycle event before
    /// reporting it, so the sink's state machine reacts the same way it
    /// would to a stateful client.
    fn report_transport(&self, err: reqwest::Error) -> StoreError {
        let event = if err.is_timeout() {
            ConnectionEvent::Timeout
        } else {
            ConnectionEvent::Close
        };
        let _ = self.events.try_send(event);
        StoreError::Connection(err.to_string())
    }

    fn classify_rejection(status: reqwest::StatusCode, text: String) -> StoreError {
        if text.contains("CANNOT_PARSE") || text.contains("Cannot parse") {
            return StoreError::CompileRejection(text);
        }
        if text.contains("TOO_LARGE_STRING_SIZE") || text.contains("Too large string size") {
            return StoreError::OversizedField;
        }
        StoreError::Other(format!(
            "ClickHouse insert failed with status {status}: {text}"
        ))
    }
}

#[async_trait]
impl Connection for ClickHouseConnection {
    async fn insert(
        &self,
        partition: &str,
        rows: Vec<Value>,
        durability: Durability,
    ) -> Result<(), StoreError> {
        let mut body = String::new();
        for row in &rows {
            body.push_str(
                &serde_json::to_string(row).map_err(|e| StoreError::Other(e.to_string()))?,
            );
            body.push('\n');
        }

        let resp = self
            .client
            .post(self.insert_endpoint(partition, durability))
            .body(body)
            .send()
            .await
            .map_err(|e| self.report_transport(e))?;

        if resp.status().is_success() {
            return Ok(());
        }
        let status = resp.status();
        let text = resp
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        Err(Self::classify_rejection(status, text))
    }

    async fn reconnect(&self) -> Result<(), StoreError> {
        let result = self.ping().await;
        if result.is_ok() {
            let _ = self.events.try_send(ConnectionEvent::Connect);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_classification_matches_fault_signatures() {
        let status = reqwest::StatusCode::BAD_REQUEST;
        assert!(matches!(
            ClickHouseConnection::classify_rejection(
                status,
                "Code: 27. DB::Exception: Cannot parse input".to_string()
            ),
            StoreError::CompileRejection(_)
        ));
        assert!(matches!(
            ClickHouseConnection::classify_rejection(
                status,
                "Code: 131. DB::Exception: Too large string size".to_string()
            ),
            StoreError::OversizedField
        ));
        assert!(matches!(
            ClickHouseConnection::classify_rejection(status, "something else".to_string()),
            StoreError::Other(_)
        ));
    }

    #[test]
    fn soft_durability_requests_async_insert() {
        let (events, _rx) = mpsc::channel(1);
        let conn = ClickHouseConnection {
            client: Client::new(),
            config: ClickHouseConfig::default(),
            url: "http://127.0.0.1:8123".to_string(),
            events,
        };
        let endpoint = conn.insert_endpoint("2026_08_23", Durability::Soft);
        assert!(endpoint.contains("async_insert=1"));
        assert!(endpoint.contains("wait_for_async_insert=0"));
        let strict = conn.insert_endpoint("2026_08_23", Durability::Hard);
        assert!(!strict.contains("async_insert"));
    }
}
