//! Keeps the local view of remote content consistent across reads and writes.
//!
//! - [`QueryCoordinator`] answers reads from the cache, coalescing misses and
//!   revalidating stale entries in the background
//! - [`MutationCoordinator`] runs writes, including the optimistic reaction toggle
//! - [`invalidation`] maps each completed write to the reads it stales
//! - [`thread`] assembles comment threads from flat lists
//! - [`SyncClient`] ties them to a content service connection

mod client;
pub mod invalidation;
mod mutation;
mod query;
pub mod thread;

pub use client::SyncClient;
pub use invalidation::{KeyPattern, Mutation, MutationKind};
pub use mutation::{MutationCoordinator, MutationPhase, OptimisticMutation};
pub use query::QueryCoordinator;
pub use thread::{ReplySource, ThreadItem};
