use offgrid_proto::SnapshotState;

use crate::{action_debug, cache::NormalizedCache};

/// Capture the live cache as the new restore point.
pub fn checkpoint(snapshot: &mut SnapshotState, cache: &dyn NormalizedCache) {
    snapshot.cache = cache.extract();
    action_debug!("Snapshot", "checkpoint", "{} record(s), {} outstanding", snapshot.cache.len(), snapshot.enqueued_mutations);
}

/// Count a newly queued mutation, checkpointing first if it opens a new batch.
pub fn open_mutation(snapshot: &mut SnapshotState, cache: &dyn NormalizedCache) {
    if snapshot.enqueued_mutations == 0 {
        checkpoint(snapshot, cache);
    }
    snapshot.enqueued_mutations += 1;
}

/// Count a mutation as settled. Returns how many are still outstanding.
pub fn settle_mutation(snapshot: &mut SnapshotState) -> usize {
    snapshot.enqueued_mutations = snapshot.enqueued_mutations.saturating_sub(1);
    snapshot.enqueued_mutations
}

/// Put the cache back to the restore point.
pub fn restore(snapshot: &SnapshotState, cache: &dyn NormalizedCache) {
    action_debug!("Snapshot", "restore", "{} record(s)", snapshot.cache.len());
    cache.restore(snapshot.cache.clone());
}
