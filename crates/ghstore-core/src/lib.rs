//! ghstore-core library.
//!
//! A key-value object store whose backing medium is an issue tracker. Each
//! object is a ticket: the ticket body holds the materialized JSON state and
//! the comments hold the append-only change log.
//!
//! # Layers
//!
//! - [`access`]: who may submit changes.
//! - [`codec`]: the comment payload format.
//! - [`merge`]: deep merge of JSON states.
//! - [`reconcile`]: folding unprocessed comments into a ticket's state.
//! - [`canonical`]: alias resolution and merging across related tickets.
//! - [`store`]: the [`ObjectStore`] facade.
//!
//! All tracker I/O goes through the [`tracker::Tracker`] trait.
//!
//! # Conventions
//!
//! - **Errors**: [`StoreError`] with a stable [`ErrorCode`].
//! - **Logging**: `tracing` macros only; the binary installs the subscriber.

pub mod access;
pub mod canonical;
pub mod codec;
pub mod config;
pub mod error;
pub mod labels;
pub mod merge;
pub mod model;
pub mod reconcile;
pub mod snapshot;
pub mod store;
pub mod tracker;

pub use config::{StoreConfig, load_config};
pub use error::{ErrorCode, Result, StoreError};
pub use model::{DeprecationReason, ObjectMeta, StoredObject};
pub use store::ObjectStore;
