//! Connection provider module
//!
//! Opens a run-scoped [`Connection`] to the relational source. Connect and
//! authentication failures are reported immediately as a [`ConnectError`]
//! with a distinguishable kind; nothing is retried here.

use super::Auth;
use crate::error::ConnectError;
use sqlx::Connection as _;
use sqlx::any::AnyPoolOptions;
use sqlx::{AnyConnection, AnyPool};
use std::time::Duration;
use url::Url;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_CONNECTIONS: u32 = 4;
const MIN_CONNECTIONS: u32 = 3;

/// Opens connections to the source database for one run at a time.
///
/// # Example
/// ```no_run
/// use tablepipe::client::{Auth, ConnectionProvider};
///
/// # async fn example() -> Result<(), tablepipe::ConnectError> {
/// let provider = ConnectionProvider::new(
///     "postgres://db.internal:5432/warehouse",
///     Auth::Password("etl".into(), "secret".into()),
/// );
/// let connection = provider.open().await?;
/// // ... drive a run ...
/// connection.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct ConnectionProvider {
    dsn: String,
    auth: Auth,
    connect_timeout: Duration,
    max_connections: u32,
}

impl ConnectionProvider {
    pub fn new(dsn: impl Into<String>, auth: Auth) -> Self {
        Self {
            dsn: dsn.into(),
            auth,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Set the connect timeout (default: 10s)
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the pool size used by a single run (default: 4)
    ///
    /// An enrich run into a table holds the row stream, the sink transaction
    /// and a lookup connection at once, so this is at least 3.
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(MIN_CONNECTIONS);
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Connection string with the password masked, for logging
    pub fn redacted_dsn(&self) -> String {
        match self.connection_url() {
            Ok(url) => redact(&url),
            Err(_) => "<invalid dsn>".to_string(),
        }
    }

    /// Open a connection for one run.
    ///
    /// A single direct connect is made first so authentication and network
    /// failures surface immediately, then a pool for the run is built on the
    /// same connection string.
    ///
    /// # Errors
    /// - `AuthFailed` when the server rejects the credentials
    /// - `Unreachable` for network, TLS or protocol failures
    /// - `Timeout` when the connect does not finish within the timeout
    /// - `InvalidDsn` for unparseable or unsupported connection strings
    pub async fn open(&self) -> Result<Connection, ConnectError> {
        sqlx::any::install_default_drivers();

        let url = self.connection_url()?;
        log::debug!("Connecting to {}", redact(&url));

        let probe = tokio::time::timeout(self.connect_timeout, AnyConnection::connect(&url))
            .await
            .map_err(|_| ConnectError::Timeout(self.connect_timeout))?
            .map_err(|e| classify(e, self.connect_timeout))?;
        if let Err(e) = probe.close().await {
            log::debug!("Failed to close probe connection cleanly: {}", e);
        }

        let pool = AnyPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.connect_timeout)
            .connect_lazy(&url)
            .map_err(|e| classify(e, self.connect_timeout))?;

        log::info!("Connected to {}", redact(&url));
        Ok(Connection { pool })
    }

    /// The DSN with credentials merged in
    fn connection_url(&self) -> Result<String, ConnectError> {
        match &self.auth {
            Auth::None => Ok(self.dsn.clone()),
            Auth::Password(username, password) => {
                let mut url = Url::parse(&self.dsn)
                    .map_err(|e| ConnectError::InvalidDsn(format!("{}: {}", self.dsn, e)))?;
                url.set_username(username)
                    .and_then(|_| url.set_password(Some(password)))
                    .map_err(|_| {
                        ConnectError::InvalidDsn(format!(
                            "{} cannot carry credentials",
                            url.scheme()
                        ))
                    })?;
                Ok(url.to_string())
            }
        }
    }
}

/// A run-scoped handle on the source database
#[derive(Clone, Debug)]
pub struct Connection {
    pool: AnyPool,
}

impl Connection {
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Release every connection held by the run
    pub async fn close(self) {
        self.pool.close().await;
    }
}

fn redact(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some("***"));
            url.to_string()
        }
        _ => dsn.to_string(),
    }
}

fn classify(err: sqlx::Error, timeout: Duration) -> ConnectError {
    match err {
        sqlx::Error::Database(db) => {
            classify_sqlstate(db.code().as_deref(), db.message().to_string())
        }
        sqlx::Error::Configuration(e) => ConnectError::InvalidDsn(e.to_string()),
        sqlx::Error::PoolTimedOut => ConnectError::Timeout(timeout),
        other => ConnectError::Unreachable(other.to_string()),
    }
}

/// SQLSTATE class 28 is "invalid authorization specification"
fn classify_sqlstate(code: Option<&str>, message: String) -> ConnectError {
    match code {
        Some(code) if code.starts_with("28") => ConnectError::AuthFailed(message),
        _ => ConnectError::Unreachable(message),
    }
}
