//! Query execution against a SAVIME server.

use tracing::warn;

use crate::blocks;
use crate::conn::Connection;
use crate::engine::{Engine, QueryResult};
use crate::error::{Error, Result};
use crate::variable::DataVariableBlock;

/// Marker the server embeds in the response text of queries it executed
/// but could not complete. A secondary, best-effort signal: the handle's
/// `successful` flag stays authoritative (some server versions set it
/// unreliably, so both signals are kept independent).
const SILENT_ERROR_MARKER: &str = "Error";

/// Connection settings for [`Client::connect`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Escalate silently-failed queries to errors instead of logging them.
    pub raise_silent_error: bool,
}

impl Default for ClientConfig {
    fn default() -> ClientConfig {
        ClientConfig {
            host: "127.0.0.1".to_string(),
            port: 65000,
            raise_silent_error: false,
        }
    }
}

impl ClientConfig {
    pub fn host(mut self, host: impl Into<String>) -> ClientConfig {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> ClientConfig {
        self.port = port;
        self
    }

    pub fn raise_silent_error(mut self, raise: bool) -> ClientConfig {
        self.raise_silent_error = raise;
        self
    }
}

/// A SAVIME client over one connection.
///
/// The connection is either owned (created and opened by
/// [`connect`](Client::connect)/[`scoped`](Client::scoped)) or supplied by
/// the caller ([`with_connection`](Client::with_connection)); the two are
/// mutually exclusive. An owned connection closes when the client drops.
pub struct Client<E: Engine> {
    conn: Connection<E>,
    owns_connection: bool,
    raise_silent_error: bool,
    /// Acquired for a bounded scope: the scope owns the connection's
    /// lifetime, so server shutdown through this client is refused.
    scoped: bool,
}

impl<E: Engine> Client<E> {
    /// Open a new connection per `config` and wrap it.
    pub fn connect(engine: E, config: ClientConfig) -> Result<Client<E>> {
        let mut conn = Connection::new(engine, config.host, config.port);
        conn.open()?;
        Ok(Client {
            conn,
            owns_connection: true,
            raise_silent_error: config.raise_silent_error,
            scoped: false,
        })
    }

    /// Like [`connect`](Client::connect), for clients whose lifetime is
    /// bounded by an enclosing scope. The connection still closes on drop;
    /// in addition, [`shutdown`](Client::shutdown) is refused.
    pub fn scoped(engine: E, config: ClientConfig) -> Result<Client<E>> {
        let mut client = Client::connect(engine, config)?;
        client.scoped = true;
        Ok(client)
    }

    /// Wrap an externally-managed connection. The caller keeps
    /// responsibility for its lifecycle and can reclaim it with
    /// [`into_connection`](Client::into_connection).
    pub fn with_connection(conn: Connection<E>, raise_silent_error: bool) -> Client<E> {
        Client {
            conn,
            owns_connection: false,
            raise_silent_error,
            scoped: false,
        }
    }

    pub fn connection(&self) -> &Connection<E> {
        &self.conn
    }

    /// True when the client created its own connection; false when it was
    /// supplied via [`with_connection`](Client::with_connection).
    pub fn owns_connection(&self) -> bool {
        self.owns_connection
    }

    /// Give the wrapped connection back to the caller.
    ///
    /// Dropping the client instead releases an open connection outright, so
    /// suppliers of an external connection reclaim it here.
    pub fn into_connection(self) -> Connection<E> {
        self.conn
    }

    /// Execute query text and drain every result block.
    ///
    /// A handle reporting `successful == false` aborts immediately with
    /// [`Error::QueryHandleFailure`] before any block is read. Separately,
    /// a response text containing the server's error marker either
    /// escalates to [`Error::SilentQueryError`] (strict mode) or is logged
    /// and processing continues.
    ///
    /// Non-schema responses yield an empty sequence; per-block import
    /// failures shrink the sequence by one block each, with a warning.
    pub fn execute(&mut self, query: &str) -> Result<Vec<DataVariableBlock>> {
        let (engine, handle) = self.conn.parts_mut().ok_or_else(|| {
            Error::ConnectionFailure("cannot execute on a closed connection".into())
        })?;

        let mut result = engine.execute(handle, query);
        if !result.successful() {
            return Err(Error::QueryHandleFailure(result.response_text().to_string()));
        }
        if result.response_text().contains(SILENT_ERROR_MARKER) {
            if self.raise_silent_error {
                return Err(Error::SilentQueryError(result.response_text().to_string()));
            }
            warn!(
                response = result.response_text(),
                "query failed silently; continuing"
            );
        }

        blocks::drain_blocks(engine, handle, &mut result)
    }

    /// Terminate the remote server process.
    ///
    /// Refused when the connection is closed, or when the client was
    /// acquired for a bounded scope (the scope owns the connection's
    /// lifetime and must not be pre-empted).
    pub fn shutdown(&mut self) -> Result<()> {
        if self.scoped {
            return Err(Error::ConnectionFailure(
                "a scoped client cannot shut the server down".into(),
            ));
        }
        self.conn.shutdown_transport()
    }
}
