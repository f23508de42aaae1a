//! Connection lifecycle management.
//!
//! A [`Connection`] is constructed closed and transitions through
//! `open`/`close` with explicit idempotency checks: re-opening an open
//! connection or re-closing a closed one is an error, never a silent
//! no-op. Dropping an open connection closes it, so release happens on
//! every exit path including panics and early returns.

use tracing::{debug, info};

use crate::engine::{Engine, TransportHandle};
use crate::error::{Error, Result};

/// A transport connection to one SAVIME server.
pub struct Connection<E: Engine> {
    host: String,
    port: u16,
    engine: E,
    handle: Option<TransportHandle>,
}

impl<E: Engine> Connection<E> {
    /// Create a closed connection for `host:port`.
    pub fn new(engine: E, host: impl Into<String>, port: u16) -> Connection<E> {
        Connection {
            host: host.into(),
            port,
            engine,
            handle: None,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Open the transport.
    ///
    /// Fails when already open, or when the transport reports an invalid
    /// handle (`opened == false` or a negative socket descriptor).
    pub fn open(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Err(Error::ConnectionFailure(
                "connection is already opened".into(),
            ));
        }
        let handle = self.engine.open_connection(self.port, &self.host);
        if !handle.is_valid() {
            return Err(Error::ConnectionFailure(format!(
                "could not open connection to {}:{}",
                self.host, self.port
            )));
        }
        info!(host = %self.host, port = self.port, client = handle.clientid, "connection opened");
        self.handle = Some(handle);
        Ok(())
    }

    /// Close the transport.
    ///
    /// Fails when already closed, or when the handle's socket descriptor
    /// still reads as invalid after the close call.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut handle) = self.handle.take() else {
            return Err(Error::ConnectionFailure(
                "connection is already closed".into(),
            ));
        };
        self.engine.close_connection(&mut handle);
        if handle.socketfd < 0 {
            return Err(Error::ConnectionFailure(format!(
                "transport reported an invalid socket while closing {}:{}",
                self.host, self.port
            )));
        }
        info!(host = %self.host, port = self.port, "connection closed");
        Ok(())
    }

    /// Engine plus live transport handle; `None` when closed.
    pub(crate) fn parts_mut(&mut self) -> Option<(&E, &mut TransportHandle)> {
        let Connection { engine, handle, .. } = self;
        handle.as_mut().map(|h| (&*engine, h))
    }

    /// Terminate the remote server through this connection. The transport
    /// is considered closed afterwards (the library tears it down).
    pub(crate) fn shutdown_transport(&mut self) -> Result<()> {
        let Some(mut handle) = self.handle.take() else {
            return Err(Error::ConnectionFailure(
                "connection is already closed".into(),
            ));
        };
        self.engine.shutdown(&mut handle);
        info!(host = %self.host, port = self.port, "server shutdown requested");
        Ok(())
    }
}

impl<E: Engine> Drop for Connection<E> {
    fn drop(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            self.engine.close_connection(&mut handle);
            debug!(host = %self.host, port = self.port, "connection released on drop");
        }
    }
}
