//! Persistence backends: filesystem helpers and the metadata store.

pub mod fs;
pub mod metadata;

pub mod prelude {
    pub use super::metadata::{
        BatchOp, Checkpoint, LmdbMetadataStore, MetadataStore, WriteBatch,
    };
}
