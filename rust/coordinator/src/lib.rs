//! The coordinator: a stateless DTO/validation facade over the catalog
//! DAO (`catalog-dao`), the external heap scheduler seam used by the
//! attach protocol, and the soft-delete reaper's host loop. No gRPC
//! service is generated here -- see `bin/catalog_service.rs` for a thin
//! example binary that wires a `Coordinator` and a `Reaper` together and
//! runs the latter to completion.

mod config;
mod coordinator;
mod heap;
mod reaper;

pub use config::{
    CoordinatorConfig, DeleteMode, HeapHasher, HeapServiceConfig, ReaperConfig, RootConfig,
    SqliteConfig,
};
pub use coordinator::{CollectionCheckResult, CollectionVersionInfo, Coordinator};
pub use heap::{AlwaysFailingHeapClient, HeapClient, InMemoryHeapClient, ShardedHeapClient, Triggerable};
pub use reaper::Reaper;
