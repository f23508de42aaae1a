//! Collaborator seam over the native query engine.
//!
//! The transport and result handles of the client library are
//! capability-bearing tokens; this module wraps them behind the
//! [`Engine`]/[`QueryResult`] traits so the pipeline never touches raw
//! fields and tests can substitute a scripted engine. The production
//! implementation lives in [`crate::native`].

use std::os::fd::OwnedFd;

use crate::types::WireType;

/// Transport connection state, owned by exactly one
/// [`Connection`](crate::Connection).
///
/// Mirrors the client library's connection struct; a handle with
/// `opened == false` or a negative socket descriptor is the library's way
/// of reporting a failed open.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportHandle {
    pub socketfd: i32,
    pub clientid: i32,
    pub queryid: i32,
    /// Message counter for message numbering.
    pub message_count: i32,
    pub opened: bool,
}

impl TransportHandle {
    /// True when the transport reports a live socket.
    pub fn is_valid(&self) -> bool {
        self.opened && self.socketfd >= 0
    }
}

/// Outcome of one block read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// A block arrived and more may follow.
    BlocksLeft,
    /// Terminal: the result set is drained.
    NoMoreBlocks,
    /// Terminal: the read itself failed; already-produced blocks are kept.
    ErrorReadingBlocks,
    /// Terminal: the server flagged the response as bad; same policy.
    ErrorResponseBlocks,
}

impl BlockStatus {
    /// Decode the raw wire status.
    ///
    /// On the wire `SAV_SUCCESS` aliases `SAV_BLOCKS_LEFT` and
    /// `SAV_FAILURE` aliases `SAV_NO_MORE_BLOCKS`; any unrecognized code
    /// reads as a block-read error.
    pub fn from_raw(raw: i32) -> BlockStatus {
        match raw {
            savime_sys::SAV_BLOCKS_LEFT => BlockStatus::BlocksLeft,
            savime_sys::SAV_NO_MORE_BLOCKS => BlockStatus::NoMoreBlocks,
            savime_sys::SAV_ERROR_RESPONSE_BLOCKS => BlockStatus::ErrorResponseBlocks,
            _ => BlockStatus::ErrorReadingBlocks,
        }
    }

    /// True when the loop must stop after this status.
    pub fn is_terminal(self) -> bool {
        self != BlockStatus::BlocksLeft
    }

    pub fn is_error(self) -> bool {
        matches!(
            self,
            BlockStatus::ErrorReadingBlocks | BlockStatus::ErrorResponseBlocks
        )
    }
}

/// One named column of a result schema.
#[derive(Debug, Clone)]
pub struct DataElement {
    pub name: String,
    /// Dimension column (index values) rather than attribute data.
    pub is_dimension: bool,
    pub ty: WireType,
}

/// Result-side surface of one executed query.
///
/// `response_text`, `is_schema`, `successful` and `schema` are fixed at
/// execution time; the descriptor map is refilled by every block read and
/// must be emptied before the next one.
///
/// Disposal of the underlying handle is RAII: dropping the value releases
/// the server-side bookkeeping exactly once, on success and failure paths
/// alike.
pub trait QueryResult {
    fn response_text(&self) -> &str;

    /// True when the result carries a schema and payload blocks; plain
    /// acknowledgements are drained without importing anything.
    fn is_schema(&self) -> bool;

    /// Authoritative execution flag. `false` aborts the query before any
    /// block is read.
    fn successful(&self) -> bool;

    /// Schema entries in name order; stable across blocks.
    fn schema(&self) -> &[DataElement];

    /// Hand out the current block's descriptors, emptying the map.
    ///
    /// Ownership moves to the caller: the returned fds close when dropped,
    /// and a second call before the next block read returns an empty list.
    fn take_descriptors(&mut self) -> Vec<(String, OwnedFd)>;
}

/// Narrow interface over the native query engine (the external
/// collaborator). All calls block; failure is reported through handle
/// state, not through return types, matching the library's contract.
pub trait Engine {
    type Result: QueryResult;

    /// Open a transport to `host:port`. A handle with `opened == false` or
    /// an invalid socket descriptor signals failure.
    fn open_connection(&self, port: u16, host: &str) -> TransportHandle;

    /// Close the transport. Idempotency is not guaranteed by the
    /// collaborator; the caller tracks open state.
    fn close_connection(&self, conn: &mut TransportHandle);

    /// Execute query text. Always returns a handle; `successful` and
    /// `response_text` carry the outcome.
    fn execute(&self, conn: &mut TransportHandle, query: &str) -> Self::Result;

    /// Read the next block into the result handle, refilling its
    /// descriptor map on success.
    fn read_query_block(&self, conn: &mut TransportHandle, result: &mut Self::Result)
        -> BlockStatus;

    /// Signal the remote server process to terminate. The transport is
    /// unusable afterwards.
    fn shutdown(&self, conn: &mut TransportHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_decoding_covers_wire_aliases() {
        assert_eq!(BlockStatus::from_raw(1), BlockStatus::BlocksLeft);
        assert_eq!(BlockStatus::from_raw(0), BlockStatus::NoMoreBlocks);
        assert_eq!(BlockStatus::from_raw(-1), BlockStatus::ErrorReadingBlocks);
        assert_eq!(BlockStatus::from_raw(-2), BlockStatus::ErrorResponseBlocks);
        // Unknown negative codes degrade to a read error, not a panic.
        assert_eq!(BlockStatus::from_raw(-9), BlockStatus::ErrorReadingBlocks);
    }

    #[test]
    fn terminal_states() {
        assert!(!BlockStatus::BlocksLeft.is_terminal());
        assert!(BlockStatus::NoMoreBlocks.is_terminal());
        assert!(BlockStatus::ErrorReadingBlocks.is_terminal());
        assert!(BlockStatus::ErrorResponseBlocks.is_terminal());
        assert!(!BlockStatus::NoMoreBlocks.is_error());
        assert!(BlockStatus::ErrorResponseBlocks.is_error());
    }

    #[test]
    fn transport_validity() {
        let mut h = TransportHandle::default();
        assert!(!h.is_valid());
        h.opened = true;
        h.socketfd = 3;
        assert!(h.is_valid());
        h.socketfd = -1;
        assert!(!h.is_valid());
    }
}
