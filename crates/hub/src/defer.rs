//! Actions the Hub schedules while building a section and resolves at a later checkpoint.
//!
//! Many rows describe both the speculative effect of an instruction and its eventual undoing.
//! The section records what happened now, a [`PendingAction`] what to do later. Each action is
//! queued under exactly one [`Phase`] and runs at most once.

use std::collections::VecDeque;

use ethereum_types::Address;
use rustc_hash::FxHashMap;
use strum::Display;
use tracing::warn;

use crate::call_stack::FrameId;
use crate::section::SectionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Right after a child context is entered, before it executes anything.
    NextContext,
    /// Right after control returns to the parent context.
    ReEntry,
    /// After the instruction's effect, in the same context.
    PostExecution,
    /// When the owning frame is rolled back. Never fires otherwise.
    PostRollback,
    EndTransaction,
    PostTransaction,
    PostConflation,
}

/// Everything that can be scheduled. Each variant names the section it completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingAction {
    /// The callee of a CALL entered its context.
    CallContextEntry { section: SectionId },
    /// The callee of a CALL handed control back.
    CallReEntry { section: SectionId },
    /// The caller of a CALL is rolled back.
    CallRollback { section: SectionId },
    CreateContextEntry { section: SectionId },
    CreateReEntry { section: SectionId },
    CreateRollback { section: SectionId },
    /// Fills the latched stack result of `section` from the top of the stack.
    UnlatchStack { section: SectionId },
    /// Appends the undoing of the account row at `fragment` of `section`.
    UndoAccount { section: SectionId, fragment: usize },
    /// Appends the undoing of the storage row at `fragment` of `section`.
    UndoStorage { section: SectionId, fragment: usize },
    /// The root frame reverts: the value transfer of TX_INIT is undone.
    InitRollback { section: SectionId },
    /// A LOG whose frame reverts never makes it into the receipt.
    LogRollback { section: SectionId },
    /// A deployment that returned its code is rolled back.
    ReturnRollback { section: SectionId },
    SelfdestructRollback { section: SectionId },
    /// A SELFDESTRUCT that did not revert wipes the account at the end of the transaction.
    SelfdestructEndTransaction { section: SectionId, address: Address },
    /// Fills in the account rows of a TX_SKIP section once its effects are final.
    TxSkipCompletion { section: SectionId },
    /// Back-fills the running values of the transaction's sections.
    SealTransaction { tx: usize },
    AssignCodeFragmentIndices,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheduled {
    pub id: u64,
    pub phase: Phase,
    pub frame: Option<FrameId>,
    pub action: PendingAction,
}

#[derive(Debug, Default)]
pub struct DeferRegistry {
    next_id: u64,
    queues: FxHashMap<Phase, VecDeque<Scheduled>>,
}

impl DeferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `action` for `phase`. `frame` restricts frame-bound phases (re-entry, rollback) to
    /// one frame.
    pub fn schedule(&mut self, phase: Phase, frame: Option<FrameId>, action: PendingAction) -> u64 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.queues.entry(phase).or_default().push_back(Scheduled {
            id,
            phase,
            frame,
            action,
        });
        id
    }

    /// Every action queued for `phase`, in registration order. Taken actions leave the queue.
    pub fn take(&mut self, phase: Phase) -> Vec<Scheduled> {
        self.queues
            .get_mut(&phase)
            .map(|queue| queue.drain(..).collect())
            .unwrap_or_default()
    }

    /// Actions queued for `phase` that are bound to `frame`, in registration order.
    pub fn take_for_frame(&mut self, phase: Phase, frame: FrameId) -> Vec<Scheduled> {
        let Some(queue) = self.queues.get_mut(&phase) else {
            return Vec::new();
        };
        let (due, kept): (VecDeque<_>, VecDeque<_>) =
            queue.drain(..).partition(|entry| entry.frame == Some(frame));
        *queue = kept;
        due.into()
    }

    /// Rollback actions of the given frames: frame by frame in `order`, registration order
    /// within one frame.
    pub fn take_rollbacks(&mut self, order: &[FrameId]) -> Vec<Scheduled> {
        order
            .iter()
            .flat_map(|frame| self.take_for_frame(Phase::PostRollback, *frame))
            .collect()
    }

    /// Drops the rollback actions left at the end of a transaction: their frames never reverted.
    pub fn discard_rollbacks(&mut self) -> usize {
        let discarded = self
            .queues
            .remove(&Phase::PostRollback)
            .map_or(0, |queue| queue.len());
        if discarded > 0 {
            warn!("Discarding {discarded} rollback actions of frames that never reverted");
        }
        discarded
    }

    pub fn pending(&self, phase: Phase) -> usize {
        self.queues.get(&phase).map_or(0, VecDeque::len)
    }

    /// Forgets every queued action.
    pub fn clear(&mut self) {
        self.queues.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unlatch(index: usize) -> PendingAction {
        PendingAction::UnlatchStack {
            section: SectionId { tx: 0, index },
        }
    }

    #[test]
    fn phases_drain_in_registration_order() {
        let mut registry = DeferRegistry::new();
        registry.schedule(Phase::PostExecution, None, unlatch(1));
        registry.schedule(Phase::EndTransaction, None, unlatch(9));
        registry.schedule(Phase::PostExecution, None, unlatch(2));

        let due: Vec<_> = registry
            .take(Phase::PostExecution)
            .into_iter()
            .map(|entry| entry.action)
            .collect();
        assert_eq!(due, vec![unlatch(1), unlatch(2)]);
        assert!(registry.take(Phase::PostExecution).is_empty());
        assert_eq!(registry.pending(Phase::EndTransaction), 1);
    }

    #[test]
    fn frame_bound_actions_only_fire_for_their_frame() {
        let mut registry = DeferRegistry::new();
        registry.schedule(Phase::ReEntry, Some(FrameId(0)), unlatch(1));
        registry.schedule(Phase::ReEntry, Some(FrameId(1)), unlatch(2));

        let due = registry.take_for_frame(Phase::ReEntry, FrameId(1));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].action, unlatch(2));
        assert_eq!(registry.pending(Phase::ReEntry), 1);
    }

    #[test]
    fn rollbacks_follow_the_given_frame_order() {
        let mut registry = DeferRegistry::new();
        registry.schedule(Phase::PostRollback, Some(FrameId(0)), unlatch(1));
        registry.schedule(Phase::PostRollback, Some(FrameId(2)), unlatch(2));
        registry.schedule(Phase::PostRollback, Some(FrameId(1)), unlatch(3));
        registry.schedule(Phase::PostRollback, Some(FrameId(2)), unlatch(4));

        let due: Vec<_> = registry
            .take_rollbacks(&[FrameId(2), FrameId(1), FrameId(0)])
            .into_iter()
            .map(|entry| entry.action)
            .collect();
        assert_eq!(due, vec![unlatch(2), unlatch(4), unlatch(3), unlatch(1)]);
    }

    #[test]
    fn unfired_rollbacks_are_discarded() {
        let mut registry = DeferRegistry::new();
        registry.schedule(Phase::PostRollback, Some(FrameId(0)), unlatch(1));
        assert_eq!(registry.discard_rollbacks(), 1);
        assert_eq!(registry.pending(Phase::PostRollback), 0);
    }
}
