//! # doublebuffer
//!
//! A double-buffered flush pipeline that persists applied metadata writes of
//! a replicated state machine to an embedded key-value store.
//!
//! Producers append [`Entry`] values to the active buffer. A background
//! daemon swaps the active and ready buffers, splits the ready buffer into
//! commit runs (snapshot creations always commit alone, followed by a store
//! checkpoint), commits every run atomically and reports the durable log
//! index back to the consensus layer.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use doublebuffer::*;
//!
//! let store = Arc::new(LmdbMetadataStore::new("./om.db")?);
//! let buffer = DoubleBuffer::new(store, DoubleBufferConfig::default())?;
//!
//! buffer.add(Entry::new(
//!     1,
//!     1,
//!     OperationResponse::plain(
//!         "create-key",
//!         vec![StagedWrite::put(Table::Keys, "/vol/bucket/key", "info")],
//!     ),
//! ))?;
//!
//! buffer.drain()?;
//! buffer.shutdown()?;
//! # Ok::<(), doublebuffer::FlushError>(())
//! ```

pub mod api;
pub mod runtime;
pub mod storage;

pub use crate::api::{config, error, types};
pub use crate::runtime::metrics;
pub use crate::storage::metadata;

pub use api::config::{
    DoubleBufferConfig, FatalErrorPolicy, IndexToTerm, ShutdownPolicy, SnapshotCallback,
};
pub use api::error::{FlushError, FlushResult};
pub use api::types::*;
pub use runtime::buffer::{DaemonState, DoubleBuffer};
pub use runtime::metrics::{FlushMetrics, HealthState, HealthStatus, MetricsSnapshot};
pub use runtime::watermark::Notification;
pub use storage::metadata::{BatchOp, Checkpoint, LmdbMetadataStore, MetadataStore, WriteBatch};
