use crate::{Arguments, LocalEngine, ResultTable, Scalar, TradeViewError, TradeViewResult};

use serde::{Deserialize, Serialize};
use std::{fmt, future::Future, path::PathBuf, time::Duration};

/// Default timeout for establishing the TCP/TLS connection to the broker.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// The only operation needed from a query engine: submit SQL, get a rectangular result.
///
/// Implementations map transport failures to `TradeViewError::Connection` and
/// engine-side rejections to `TradeViewError::Query`.
pub trait QueryEngine: Send + Sync {
    fn submit(&self, sql: &str) -> impl Future<Output = TradeViewResult<ResultTable>> + Send;
}

// --- Broker wire format ---

#[derive(Debug, Serialize)]
struct BrokerRequest<'a> {
    sql: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BrokerResponse {
    result_table: Option<BrokerResultTable>,
    #[serde(default)]
    exceptions: Vec<BrokerException>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BrokerResultTable {
    data_schema: BrokerSchema,
    #[serde(default)]
    rows: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BrokerSchema {
    column_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BrokerException {
    #[serde(default)]
    error_code: i64,
    message: String,
}

impl BrokerResponse {
    /// Turns a decoded broker body into a `ResultTable`, or the engine's diagnostic.
    fn into_result_table(self) -> TradeViewResult<ResultTable> {
        if !self.exceptions.is_empty() {
            let message = self
                .exceptions
                .iter()
                .map(|e| format!("[{}] {}", e.error_code, e.message))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(TradeViewError::Query { message });
        }

        // Queries that match no segment come back without a result table.
        let Some(table) = self.result_table else {
            return Ok(ResultTable::default());
        };

        let rows = table
            .rows
            .iter()
            .map(|row| row.iter().map(Scalar::from).collect())
            .collect();

        ResultTable::new(table.data_schema.column_names, rows)
    }
}

/// HTTP client for the broker's SQL endpoint (`POST /query/sql`).
#[derive(Debug, Clone)]
pub struct BrokerClient {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl BrokerClient {
    /// `timeout` bounds a whole request, connection and response body included.
    pub fn new(url: String, timeout: Duration) -> TradeViewResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .timeout(timeout)
            .build()
            .map_err(|e| TradeViewError::Connection(e.to_string()))?;
        Ok(BrokerClient {
            client,
            url,
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl QueryEngine for BrokerClient {
    async fn submit(&self, sql: &str) -> TradeViewResult<ResultTable> {
        let transport = |e| TradeViewError::from_reqwest(e, self.timeout);

        let response = self
            .client
            .post(&self.url)
            .json(&BrokerRequest { sql })
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TradeViewError::from_status(status, &body));
        }

        let body = response.bytes().await.map_err(transport)?;
        let decoded: BrokerResponse = serde_json::from_slice(&body)
            .map_err(|e| TradeViewError::Protocol(e.to_string()))?;

        decoded.into_result_table()
    }
}

/// The one long-lived connection handle of the process.
///
/// Opened in `main`, shared as `Arc<Connection>` by every render cycle, and
/// dropped when the application exits.
#[derive(Debug)]
pub enum Connection {
    Broker(BrokerClient),
    Local(LocalEngine),
}

impl Connection {
    /// A short description for the status bar.
    pub fn describe(&self) -> String {
        match self {
            Connection::Broker(client) => format!("broker {}", client.url()),
            Connection::Local(engine) => format!("snapshot {}", engine.root().display()),
        }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl QueryEngine for Connection {
    async fn submit(&self, sql: &str) -> TradeViewResult<ResultTable> {
        match self {
            Connection::Broker(client) => client.submit(sql).await,
            Connection::Local(engine) => engine.submit(sql).await,
        }
    }
}

/// Per-call execution settings: request timeout and bounded retry with backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPolicy {
    /// Upper bound for one attempt, connection included.
    pub timeout: Duration,
    /// Extra attempts after a transient failure (`Connection` or `Timeout`).
    pub retries: u32,
    /// Delay before the first retry; doubled for each following one.
    pub backoff: Duration,
    /// Optional `LIMIT` appended to every generated query.
    pub row_limit: Option<usize>,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        ExecutionPolicy {
            timeout: Duration::from_secs(30),
            retries: 2,
            backoff: Duration::from_millis(250),
            row_limit: None,
        }
    }
}

/// Where to connect and how to execute, resolved from the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub broker_url: String,
    pub local_dir: Option<PathBuf>,
    pub policy: ExecutionPolicy,
}

impl EngineConfig {
    /// Creates a new `EngineConfig` from command-line `Arguments`.
    pub fn new(args: &Arguments) -> TradeViewResult<Self> {
        let path = if args.path.starts_with('/') {
            args.path.clone()
        } else {
            format!("/{}", args.path)
        };

        let local_dir = match &args.local {
            Some(dir) => Some(dir.canonicalize()?),
            None => None,
        };

        Ok(EngineConfig {
            broker_url: format!("{}://{}:{}{}", args.scheme, args.host, args.port, path),
            local_dir,
            policy: ExecutionPolicy {
                timeout: Duration::from_secs(args.timeout),
                retries: args.retries,
                row_limit: args.row_limit,
                ..Default::default()
            },
        })
    }

    /// Opens the connection: the snapshot engine when a local directory is set,
    /// the broker otherwise.
    pub async fn connect(&self) -> TradeViewResult<Connection> {
        match &self.local_dir {
            Some(dir) => {
                let engine = LocalEngine::open(dir).await?;
                tracing::info!("Using local snapshot engine at {}", dir.display());
                Ok(Connection::Local(engine))
            }
            None => {
                let client = BrokerClient::new(self.broker_url.clone(), self.policy.timeout)?;
                tracing::info!("Using broker at {}", self.broker_url);
                Ok(Connection::Broker(client))
            }
        }
    }
}

//----------------------------------------------------------------------------//
//                                   Tests                                    //
//----------------------------------------------------------------------------//

/// Run tests with:
/// `cargo test -- --show-output tests_engine`
#[cfg(test)]
mod tests_engine {
    use super::*;
    use clap::Parser;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    /// Serves one connection on localhost: reads the request, then writes
    /// `response` after `stall`. Returns the endpoint URL.
    async fn serve_once(response: &'static str, stall: Duration) -> TradeViewResult<String> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buffer = [0u8; 4096];
                let _ = socket.read(&mut buffer).await;
                tokio::time::sleep(stall).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        Ok(format!("http://{addr}/query/sql"))
    }

    fn decode(body: &str) -> TradeViewResult<ResultTable> {
        let response: BrokerResponse =
            serde_json::from_str(body).map_err(|e| TradeViewError::Protocol(e.to_string()))?;
        response.into_result_table()
    }

    #[test]
    fn decodes_broker_result_table() -> TradeViewResult<()> {
        let body = r#"{
            "resultTable": {
                "dataSchema": {
                    "columnNames": ["GENDER", "TRADE_CATEGORY", "VALUE_TRADE_COUNT"],
                    "columnDataTypes": ["STRING", "STRING", "LONG"]
                },
                "rows": [["M", "HIGH", 12], ["F", "LOW", 7]]
            },
            "exceptions": [],
            "numServersQueried": 1,
            "timeUsedMs": 4
        }"#;

        let table = decode(body)?;
        assert_eq!(
            table.columns,
            vec!["GENDER", "TRADE_CATEGORY", "VALUE_TRADE_COUNT"]
        );
        assert_eq!(table.height(), 2);
        assert_eq!(table.rows[0][2], Scalar::Int(12));
        assert_eq!(table.rows[1][0], Scalar::Text("F".into()));
        Ok(())
    }

    #[test]
    fn broker_exceptions_become_query_errors() {
        let body = r#"{
            "exceptions": [
                {"errorCode": 150, "message": "SQLParsingError: Unknown column FOO"}
            ]
        }"#;

        let result = decode(body);
        assert!(
            matches!(
                &result,
                Err(TradeViewError::Query { message }) if message.contains("Unknown column FOO")
                    && message.contains("150")
            ),
            "got {result:?}"
        );
    }

    #[test]
    fn missing_result_table_is_empty() -> TradeViewResult<()> {
        let table = decode(r#"{"exceptions": []}"#)?;
        assert!(table.is_empty());
        Ok(())
    }

    #[test]
    fn config_builds_broker_url() -> TradeViewResult<()> {
        let args = Arguments::parse_from([
            "trade-view",
            "--host",
            "13.229.109.174",
            "--port",
            "8099",
            "--path",
            "query/sql",
            "--timeout",
            "10",
            "--retries",
            "0",
        ]);
        let config = EngineConfig::new(&args)?;
        assert_eq!(config.broker_url, "http://13.229.109.174:8099/query/sql");
        assert_eq!(config.policy.timeout, Duration::from_secs(10));
        assert_eq!(config.policy.retries, 0);
        assert_eq!(config.local_dir, None);
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_broker_is_a_connection_error() -> TradeViewResult<()> {
        // Port 9 (discard) on localhost is closed on test machines.
        let url = "http://127.0.0.1:9/query/sql".to_string();
        let client = BrokerClient::new(url, Duration::from_secs(5))?;
        let result = client.submit("SELECT 1").await;
        assert!(
            matches!(&result, Err(TradeViewError::Connection(_))),
            "got {result:?}"
        );
        Ok(())
    }

    #[tokio::test]
    async fn unavailable_broker_is_a_connection_error() -> TradeViewResult<()> {
        let url = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\ncontent-length: 11\r\nconnection: close\r\n\r\nunavailable",
            Duration::ZERO,
        )
        .await?;
        let client = BrokerClient::new(url, Duration::from_secs(5))?;

        let result = client.submit("SELECT 1").await;
        assert!(
            matches!(&result, Err(TradeViewError::Connection(msg)) if msg.contains("503")),
            "got {result:?}"
        );
        assert!(result.is_err_and(|e| e.is_transient()));
        Ok(())
    }

    #[tokio::test]
    async fn bad_request_is_a_query_error() -> TradeViewResult<()> {
        let url = serve_once(
            "HTTP/1.1 400 Bad Request\r\ncontent-length: 7\r\nconnection: close\r\n\r\nbad sql",
            Duration::ZERO,
        )
        .await?;
        let client = BrokerClient::new(url, Duration::from_secs(5))?;

        let result = client.submit("SELECT").await;
        assert!(
            matches!(&result, Err(TradeViewError::Query { message }) if message.contains("bad sql")),
            "got {result:?}"
        );
        Ok(())
    }

    #[tokio::test]
    async fn stalled_broker_is_a_timeout() -> TradeViewResult<()> {
        let url = serve_once("HTTP/1.1 200 OK\r\n\r\n", Duration::from_secs(5)).await?;
        let client = BrokerClient::new(url, Duration::from_millis(200))?;

        let result = client.submit("SELECT 1").await;
        assert!(
            matches!(&result, Err(TradeViewError::Timeout(d)) if *d == Duration::from_millis(200)),
            "got {result:?}"
        );
        Ok(())
    }
}
