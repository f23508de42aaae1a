//! Block protocol loop and result assembly.
//!
//! One read call yields one of four outcomes: a block arrived (import it),
//! the result set is drained (stop, success), or one of two terminal
//! errors (stop, keep the blocks already produced). Whatever the outcome,
//! the handle's descriptor map is emptied and every descriptor closed
//! before the next read; per-block import failures drop that block only.

use tracing::{debug, warn};

use crate::engine::{BlockStatus, Engine, QueryResult, TransportHandle};
use crate::error::Result;
use crate::import;
use crate::variable::DataVariableBlock;

/// Drain every block of `result`, in arrival order.
pub(crate) fn drain_blocks<E: Engine>(
    engine: &E,
    conn: &mut TransportHandle,
    result: &mut E::Result,
) -> Result<Vec<DataVariableBlock>> {
    let mut blocks = Vec::new();

    if !result.is_schema() {
        // One read lets the server finish flushing its acknowledgement;
        // nothing is imported for a non-schema response.
        let _ = engine.read_query_block(conn, result);
        drop(result.take_descriptors());
        return Ok(blocks);
    }

    loop {
        let status = engine.read_query_block(conn, result);
        // Descriptors must not outlive this iteration, whatever happens
        // below: dropping the taken fds closes them.
        let descriptors = result.take_descriptors();

        match status {
            BlockStatus::BlocksLeft => {
                match import::import_block(result.schema(), &descriptors) {
                    Ok(block) => {
                        debug!(rows = block.num_rows(), "block assembled");
                        blocks.push(block);
                    }
                    Err(err) => {
                        warn!(error = %err, "block dropped; continuing with the remaining blocks");
                    }
                }
            }
            BlockStatus::NoMoreBlocks => break,
            BlockStatus::ErrorReadingBlocks | BlockStatus::ErrorResponseBlocks => {
                warn!(
                    ?status,
                    produced = blocks.len(),
                    "block read failed; keeping partial results"
                );
                break;
            }
        }
    }

    Ok(blocks)
}
