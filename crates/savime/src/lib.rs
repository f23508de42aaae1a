//! savime: a SAVIME array-database client.
//!
//! Executes queries against a SAVIME server through the native client
//! library and ingests multi-block results as typed, shaped, read-only
//! arrays without copying the payload buffers.
//!
//! ```no_run
//! use savime::{Client, ClientConfig, NativeEngine};
//!
//! # fn main() -> savime::Result<()> {
//! let engine = NativeEngine::new()?;
//! let mut client = Client::connect(engine, ClientConfig::default().port(65000))?;
//! for block in client.execute("SELECT(weather);")? {
//!     for var in block.variables() {
//!         println!("{} {:?}", var.name, var.shape());
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The pipeline is synchronous and single-threaded per connection; every
//! call blocks. Independent connections can run on separate threads with
//! no shared state beyond the immutable type table.

#![deny(unsafe_op_in_unsafe_fn)]

mod blocks;
mod client;
mod conn;
mod engine;
mod error;
mod import;
mod native;
mod types;
mod variable;

pub use client::{Client, ClientConfig};
pub use conn::Connection;
pub use engine::{BlockStatus, DataElement, Engine, QueryResult, TransportHandle};
pub use error::{Error, Result};
pub use import::MappedBuffer;
pub use native::{NativeEngine, NativeResult};
pub use types::{is_array_compatible, size_of, HostType, Scalar, WireKind, WireType};
pub use variable::{ColumnData, DataVariable, DataVariableBlock, TypedArray};
