//! taskdeck-core library.
//!
//! The client-side synchronization engine behind every taskdeck view: a
//! keyed [`cache::QueryCache`], the [`mutation::MutationPipeline`] that is the
//! only write path to the remote service, the [`push::PushReconciler`] that
//! patches cached task lists from the live channel, the
//! [`dragdrop::DragDropController`] for optimistic board moves, and the
//! [`scope::WorkspaceScope`] that decides which workspace everything points at.
//! [`session::Session`] owns one of each.
//!
//! # Conventions
//!
//! - **Errors**: [`error::SyncError`] on engine paths, `anyhow::Result` for
//!   config loading.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod board;
pub mod cache;
pub mod config;
pub mod dragdrop;
pub mod error;
pub mod model;
pub mod mutation;
pub mod push;
pub mod remote;
pub mod scope;
pub mod session;

pub use cache::{CacheData, CacheEntry, CacheKey, FetchTicket, QueryCache};
pub use error::{ErrorCode, SyncError};
pub use session::Session;
