//! The external heap scheduler the attach protocol's Phase 2/3 push
//! against. Modeled on `s3heap::Triggerable`/`HeapScheduler` (the
//! production heap's own vocabulary: a triggerable is a `(partitioning,
//! scheduling)` uuid pair, and a nonce is the unique id of one invocation)
//! and on `s3heap-service::client::GrpcHeapService::push`'s
//! push-only-what-the-caller-owns shape. The real network client would
//! implement this trait against the gRPC heap-tender service; this crate
//! only needs the seam and an in-memory double for tests.

use async_trait::async_trait;
use catalog_config::assignment::assignment_policy::{AssignmentPolicy, RendezvousHashingAssignmentPolicy};
use catalog_types::CatalogError;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// A schedulable unit: `partitioning` is the collection an attachment is
/// bound to (the natural sharding key), `scheduling` is the attachment's own
/// id -- not the registered function's id, since two attachments can share
/// one function and must still land on distinct heap scheduling keys.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Triggerable {
    pub partitioning: Uuid,
    pub scheduling: Uuid,
}

/// Pushes and inspects schedules on the external heap. `push_schedule` is
/// the Phase 2 call of the attach protocol; `peek_schedule` lets a caller
/// check whether a given trigger currently has a live nonce scheduled
/// (used by tests and by `CleanupExpiredPartialAttachedFunctions` callers
/// that want to confirm the heap agrees a row is truly abandoned).
#[async_trait]
pub trait HeapClient: Send + Sync {
    async fn push_schedule(&self, trigger: Triggerable, nonce: Uuid) -> Result<(), CatalogError>;
    async fn peek_schedule(&self, trigger: Triggerable) -> Result<Option<Uuid>, CatalogError>;
}

/// In-process test double. Always accepts pushes and reports back the
/// most recently pushed nonce for a trigger.
#[derive(Default)]
pub struct InMemoryHeapClient {
    schedules: parking_lot::Mutex<HashMap<Triggerable, Uuid>>,
}

impl InMemoryHeapClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HeapClient for InMemoryHeapClient {
    async fn push_schedule(&self, trigger: Triggerable, nonce: Uuid) -> Result<(), CatalogError> {
        self.schedules.lock().insert(trigger, nonce);
        Ok(())
    }

    async fn peek_schedule(&self, trigger: Triggerable) -> Result<Option<Uuid>, CatalogError> {
        Ok(self.schedules.lock().get(&trigger).copied())
    }
}

/// A `HeapClient` always failing its push, for exercising the partial-attach
/// recovery path (S4) without a real heap service.
#[derive(Default)]
pub struct AlwaysFailingHeapClient;

#[async_trait]
impl HeapClient for AlwaysFailingHeapClient {
    async fn push_schedule(&self, _trigger: Triggerable, _nonce: Uuid) -> Result<(), CatalogError> {
        Err(CatalogError::Internal("heap push rejected".to_string()))
    }

    async fn peek_schedule(&self, _trigger: Triggerable) -> Result<Option<Uuid>, CatalogError> {
        Ok(None)
    }
}

/// Fans a single logical heap client out across multiple heap-service
/// shards/members, using the same rendezvous-hash assignment policy the
/// teacher uses to route requests to backend services (`assignment_policy.rs`),
/// generalized here to routing an attachment's `partitioning` uuid to a
/// heap-service member. The member list itself (normally discovered from a
/// memberlist custom resource in the teacher's deployment) is supplied as a
/// plain `Vec<String>` at construction time rather than wired through a
/// Kubernetes-specific memberlist provider, since this crate has no
/// standing dependency on that machinery.
pub struct ShardedHeapClient {
    policy: RendezvousHashingAssignmentPolicy,
    shards: HashMap<String, Arc<dyn HeapClient>>,
}

impl ShardedHeapClient {
    pub fn new(shards: HashMap<String, Arc<dyn HeapClient>>) -> Self {
        let mut policy = RendezvousHashingAssignmentPolicy::default();
        policy.set_members(shards.keys().cloned().collect());
        ShardedHeapClient { policy, shards }
    }

    fn shard_for(&self, trigger: Triggerable) -> Result<Arc<dyn HeapClient>, CatalogError> {
        let member = self
            .policy
            .assign_one(&trigger.partitioning.to_string())
            .map_err(|err| CatalogError::Internal(format!("heap shard assignment failed: {err}")))?;
        self.shards
            .get(&member)
            .cloned()
            .ok_or_else(|| CatalogError::Internal(format!("no heap client registered for shard {member}")))
    }
}

#[async_trait]
impl HeapClient for ShardedHeapClient {
    async fn push_schedule(&self, trigger: Triggerable, nonce: Uuid) -> Result<(), CatalogError> {
        self.shard_for(trigger)?.push_schedule(trigger, nonce).await
    }

    async fn peek_schedule(&self, trigger: Triggerable) -> Result<Option<Uuid>, CatalogError> {
        self.shard_for(trigger)?.peek_schedule(trigger).await
    }
}
