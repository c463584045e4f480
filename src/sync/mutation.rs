//! Writes: plain mutations that invalidate on success, and the optimistic
//! reaction toggle that applies before the request and rolls back on failure.

use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, CacheStore, CacheValue, Cacheable, ReactionSet};
use crate::error::{Result, SyncError};
use crate::gateway::{GatewayResult, PostId, Principal, ReactionType};

use super::invalidation::{invalidate, Mutation};

/// Where an optimistic write is in its life. Transitions only move forward:
/// `Pending → Applied → Confirmed | RolledBack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
  Pending,
  Applied,
  Confirmed,
  RolledBack,
}

/// One optimistic reaction toggle, carrying the membership it replaced.
#[derive(Debug, Clone)]
pub struct OptimisticMutation {
  key: CacheKey,
  reaction: ReactionType,
  snapshot: ReactionSet,
  applied: ReactionSet,
  phase: MutationPhase,
}

impl OptimisticMutation {
  /// Flip `reaction` in `snapshot`.
  pub fn toggle(key: CacheKey, snapshot: ReactionSet, reaction: ReactionType) -> Self {
    let mut applied = snapshot.clone();
    if !applied.remove(&reaction) {
      applied.insert(reaction);
    }
    Self {
      key,
      reaction,
      snapshot,
      applied,
      phase: MutationPhase::Pending,
    }
  }

  pub fn key(&self) -> &CacheKey {
    &self.key
  }

  pub fn snapshot(&self) -> &ReactionSet {
    &self.snapshot
  }

  pub fn applied(&self) -> &ReactionSet {
    &self.applied
  }

  pub fn phase(&self) -> MutationPhase {
    self.phase
  }

  /// Whether this toggle turns the reaction on. Decided from the snapshot,
  /// never from whatever the store holds by the time the request returns.
  pub fn turns_on(&self) -> bool {
    !self.snapshot.contains(&self.reaction)
  }

  pub fn apply(&mut self, store: &CacheStore) {
    if self.advance(MutationPhase::Pending, MutationPhase::Applied) {
      store.set_value(&self.key, self.applied.clone().into_value());
    }
  }

  pub fn confirm(&mut self) {
    self.advance(MutationPhase::Applied, MutationPhase::Confirmed);
  }

  /// Put the snapshot back exactly as it was taken.
  pub fn roll_back(&mut self, store: &CacheStore) {
    if self.advance(MutationPhase::Applied, MutationPhase::RolledBack) {
      store.set_value(&self.key, self.snapshot.clone().into_value());
    }
  }

  fn advance(&mut self, from: MutationPhase, to: MutationPhase) -> bool {
    if self.phase != from {
      warn!(key = %self.key, phase = ?self.phase, target = ?to, "ignored out-of-order transition");
      return false;
    }
    debug!(key = %self.key, from = ?from, to = ?to, "optimistic mutation");
    self.phase = to;
    true
  }
}

/// Runs writes against the cache store. The only writer besides the loads.
#[derive(Clone)]
pub struct MutationCoordinator {
  store: Arc<CacheStore>,
}

impl MutationCoordinator {
  pub fn new(store: Arc<CacheStore>) -> Self {
    Self { store }
  }

  /// Await a non-optimistic write and invalidate what it affects.
  pub async fn run<T, Fut>(&self, mutation: Mutation, request: Fut) -> Result<T>
  where
    Fut: Future<Output = GatewayResult<T>>,
  {
    let kind = mutation.kind();
    match request.await {
      Ok(output) => {
        info!(mutation = %kind, "mutation confirmed");
        invalidate(&self.store, &mutation);
        Ok(output)
      }
      Err(err) => {
        warn!(mutation = %kind, error = %err, "mutation failed");
        Err(SyncError::Mutation {
          kind,
          message: err.to_string(),
          rolled_back: false,
        })
      }
    }
  }

  /// Locally known reactions of `principal` on `post_id`, seeding an empty
  /// set on first use.
  pub fn user_reactions(&self, post_id: PostId, principal: &Principal) -> Result<ReactionSet> {
    let key = CacheKey::UserReactions(post_id, principal.clone());
    let entry = self
      .store
      .seed(&key, || ReactionSet::new().into_value());
    entry
      .value
      .as_ref()
      .and_then(ReactionSet::from_value)
      .ok_or(SyncError::ValueMismatch { key })
  }

  /// Snapshot the membership set and apply the toggle to it at once.
  ///
  /// Runs without suspending, so a read straight after it sees the toggled
  /// set.
  pub fn apply_toggle(
    &self,
    post_id: PostId,
    principal: &Principal,
    reaction: ReactionType,
  ) -> Result<OptimisticMutation> {
    let snapshot = self.user_reactions(post_id, principal)?;
    let key = CacheKey::UserReactions(post_id, principal.clone());
    let mut record = OptimisticMutation::toggle(key, snapshot, reaction);
    record.apply(&self.store);
    Ok(record)
  }

  /// Reconcile an applied toggle with the outcome of its request.
  pub fn settle_toggle(
    &self,
    mut record: OptimisticMutation,
    post_id: PostId,
    outcome: GatewayResult<()>,
  ) -> Result<ReactionSet> {
    match outcome {
      Ok(()) => {
        record.confirm();
        info!(key = %record.key(), "reaction toggle confirmed");
        invalidate(
          &self.store,
          &Mutation::ToggleReaction {
            post_id,
            reaction: record.reaction,
          },
        );
        Ok(record.applied)
      }
      Err(err) => {
        record.roll_back(&self.store);
        warn!(key = %record.key(), error = %err, "reaction toggle rolled back");
        Err(SyncError::Mutation {
          kind: Mutation::ToggleReaction {
            post_id,
            reaction: record.reaction,
          }
          .kind(),
          message: err.to_string(),
          rolled_back: true,
        })
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheStatus;
  use crate::gateway::GatewayError;

  fn alice() -> Principal {
    Principal::new("alice")
  }

  fn set(reactions: &[ReactionType]) -> ReactionSet {
    reactions.iter().copied().collect()
  }

  #[test]
  fn test_toggle_is_symmetric_difference() {
    let key = CacheKey::UserReactions(1, alice());
    let on = OptimisticMutation::toggle(key.clone(), set(&[]), ReactionType::Support);
    assert!(on.turns_on());
    assert_eq!(on.applied(), &set(&[ReactionType::Support]));

    let off = OptimisticMutation::toggle(
      key,
      set(&[ReactionType::Support, ReactionType::Helpful]),
      ReactionType::Support,
    );
    assert!(!off.turns_on());
    assert_eq!(off.applied(), &set(&[ReactionType::Helpful]));
  }

  #[test]
  fn test_phases_only_move_forward() {
    let store = CacheStore::new();
    let mut record = OptimisticMutation::toggle(
      CacheKey::UserReactions(1, alice()),
      set(&[]),
      ReactionType::Helpful,
    );

    record.confirm();
    assert_eq!(record.phase(), MutationPhase::Pending);

    record.apply(&store);
    record.confirm();
    assert_eq!(record.phase(), MutationPhase::Confirmed);

    record.roll_back(&store);
    assert_eq!(record.phase(), MutationPhase::Confirmed);
    assert_eq!(
      store.get(record.key()).value,
      Some(set(&[ReactionType::Helpful]).into_value())
    );
  }

  #[test]
  fn test_apply_is_visible_immediately() {
    let mutations = MutationCoordinator::new(Arc::new(CacheStore::new()));

    let record = mutations
      .apply_toggle(4, &alice(), ReactionType::Support)
      .unwrap();

    assert_eq!(record.phase(), MutationPhase::Applied);
    assert_eq!(
      mutations.user_reactions(4, &alice()).unwrap(),
      set(&[ReactionType::Support])
    );
  }

  #[test]
  fn test_failure_restores_snapshot_verbatim() {
    let store = Arc::new(CacheStore::new());
    let mutations = MutationCoordinator::new(Arc::clone(&store));
    let key = CacheKey::UserReactions(4, alice());
    store.set_value(&key, set(&[ReactionType::Helpful]).into_value());

    let record = mutations
      .apply_toggle(4, &alice(), ReactionType::Support)
      .unwrap();
    let outcome = mutations.settle_toggle(record, 4, Err(GatewayError::new("nope")));

    assert!(matches!(
      outcome,
      Err(SyncError::Mutation {
        rolled_back: true,
        ..
      })
    ));
    assert_eq!(
      mutations.user_reactions(4, &alice()).unwrap(),
      set(&[ReactionType::Helpful])
    );
  }

  #[test]
  fn test_success_stales_only_that_count() {
    let store = Arc::new(CacheStore::new());
    let mutations = MutationCoordinator::new(Arc::clone(&store));
    let support = CacheKey::ReactionCount(4, ReactionType::Support);
    let helpful = CacheKey::ReactionCount(4, ReactionType::Helpful);
    store.resolve(&support, CacheValue::Count(2));
    store.resolve(&helpful, CacheValue::Count(2));

    let record = mutations
      .apply_toggle(4, &alice(), ReactionType::Support)
      .unwrap();
    let applied = mutations.settle_toggle(record, 4, Ok(())).unwrap();

    assert_eq!(applied, set(&[ReactionType::Support]));
    assert_eq!(store.get(&support).status, CacheStatus::Stale);
    assert_eq!(store.get(&helpful).status, CacheStatus::Fresh);
  }

  #[tokio::test]
  async fn test_failed_write_touches_nothing() {
    let store = Arc::new(CacheStore::new());
    let mutations = MutationCoordinator::new(Arc::clone(&store));
    store.resolve(&CacheKey::Comments(1), CacheValue::Comments(Vec::new()));

    let outcome: Result<u64> = mutations
      .run(
        Mutation::CreateComment {
          post_id: 1,
          parent_comment_id: None,
        },
        async { Err(GatewayError::new("offline")) },
      )
      .await;

    assert!(matches!(
      outcome,
      Err(SyncError::Mutation {
        rolled_back: false,
        ..
      })
    ));
    assert_eq!(store.get(&CacheKey::Comments(1)).status, CacheStatus::Fresh);
  }
}
