//! Fragments: the payload of one trace row each.
//!
//! A [`crate::section::TraceSection`] owns an ordered list of fragments. The section supplies the
//! values every row shares (hub stamp, context numbers, gas) and each fragment the values that
//! are specific to its row.

pub mod account;
pub mod context;
pub mod imc;
pub mod scenario;
pub mod stack;
pub mod storage;
pub mod transaction;

pub use account::AccountFragment;
pub use context::{ContextFragment, ContextPurpose};
pub use imc::ImcFragment;
pub use scenario::{
    CallScenario, CreateScenario, ReturnScenario, Scenario, ScenarioFragment, SelfdestructScenario,
};
pub use stack::{StackFragment, StackItem, StackResult};
pub use storage::StorageFragment;
pub use transaction::{TransactionFragment, TxPhase};

use serde::Serialize;
use strum::Display;

use crate::constants::{
    DOM_SUB_STAMP_OFFSET_FINALIZATION, DOM_SUB_STAMP_OFFSET_REVERT,
    DOM_SUB_STAMP_OFFSET_SELFDESTRUCT, MULTIPLIER_DOM_SUB_STAMPS,
};

/// A `[offset, offset + length)` region of some context's memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct MemorySpan {
    pub offset: u64,
    pub length: u64,
}

impl MemorySpan {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// Ordering stamps of account and storage rows.
///
/// Rows are ordered lexicographically by `(dom, sub)` when the account and storage consistency
/// checks sort them. Undo rows take the revert stamp as their dominant stamp so they sort after
/// everything the reverted frame did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DomSubStamps {
    pub dom: u64,
    pub sub: u64,
}

fn scaled(stamp: u32) -> u64 {
    u64::from(stamp) * u64::from(MULTIPLIER_DOM_SUB_STAMPS)
}

impl DomSubStamps {
    /// `n`-th row of the instruction with stamp `hub`.
    pub fn standard(hub: u32, n: u32) -> Self {
        Self {
            dom: scaled(hub) + u64::from(n),
            sub: 0,
        }
    }

    /// Undo row of the instruction with stamp `hub`, its own frame reverting at `revert`.
    pub fn revert_with_current(hub: u32, revert: u32, n: u32) -> Self {
        Self {
            dom: scaled(revert) + u64::from(DOM_SUB_STAMP_OFFSET_REVERT),
            sub: scaled(hub) + u64::from(n),
        }
    }

    /// Undo row of the instruction with stamp `hub` whose child reverts at `child_revert`.
    pub fn reverts_with_child(hub: u32, child_revert: u32, n: u32) -> Self {
        Self {
            dom: scaled(child_revert) + u64::from(DOM_SUB_STAMP_OFFSET_REVERT),
            sub: scaled(hub) + u64::from(n),
        }
    }

    /// `n`-th row of the transaction finalization with stamp `hub`.
    pub fn finalization(hub: u32, n: u32) -> Self {
        Self {
            dom: scaled(hub) + u64::from(DOM_SUB_STAMP_OFFSET_FINALIZATION),
            sub: u64::from(n),
        }
    }

    /// Account wipe of a SELFDESTRUCT with stamp `hub`, at the end of the transaction whose last
    /// stamp is `end`.
    pub fn selfdestruct(hub: u32, end: u32) -> Self {
        Self {
            dom: scaled(end) + u64::from(DOM_SUB_STAMP_OFFSET_SELFDESTRUCT),
            sub: scaled(hub),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FragmentKind {
    Stack,
    Account,
    Context,
    Storage,
    Imc,
    Scenario,
    Transaction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Stack(StackFragment),
    Account(AccountFragment),
    Context(ContextFragment),
    Storage(StorageFragment),
    Imc(ImcFragment),
    Scenario(ScenarioFragment),
    Transaction(TransactionFragment),
}

impl Fragment {
    pub fn kind(&self) -> FragmentKind {
        match self {
            Fragment::Stack(_) => FragmentKind::Stack,
            Fragment::Account(_) => FragmentKind::Account,
            Fragment::Context(_) => FragmentKind::Context,
            Fragment::Storage(_) => FragmentKind::Storage,
            Fragment::Imc(_) => FragmentKind::Imc,
            Fragment::Scenario(_) => FragmentKind::Scenario,
            Fragment::Transaction(_) => FragmentKind::Transaction,
        }
    }

    pub fn as_account(&self) -> Option<&AccountFragment> {
        match self {
            Fragment::Account(account) => Some(account),
            _ => None,
        }
    }

    pub fn as_storage(&self) -> Option<&StorageFragment> {
        match self {
            Fragment::Storage(storage) => Some(storage),
            _ => None,
        }
    }
}

impl From<StackFragment> for Fragment {
    fn from(fragment: StackFragment) -> Self {
        Fragment::Stack(fragment)
    }
}

impl From<AccountFragment> for Fragment {
    fn from(fragment: AccountFragment) -> Self {
        Fragment::Account(fragment)
    }
}

impl From<ContextFragment> for Fragment {
    fn from(fragment: ContextFragment) -> Self {
        Fragment::Context(fragment)
    }
}

impl From<StorageFragment> for Fragment {
    fn from(fragment: StorageFragment) -> Self {
        Fragment::Storage(fragment)
    }
}

impl From<ImcFragment> for Fragment {
    fn from(fragment: ImcFragment) -> Self {
        Fragment::Imc(fragment)
    }
}

impl From<ScenarioFragment> for Fragment {
    fn from(fragment: ScenarioFragment) -> Self {
        Fragment::Scenario(fragment)
    }
}

impl From<TransactionFragment> for Fragment {
    fn from(fragment: TransactionFragment) -> Self {
        Fragment::Transaction(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undo_rows_sort_after_the_reverted_frame() {
        let speculative = DomSubStamps::standard(5, 1);
        let later = DomSubStamps::standard(9, 0);
        let undo = DomSubStamps::revert_with_current(5, 9, 1);
        assert!(speculative < later);
        assert!(later < undo);
        assert_eq!(undo, DomSubStamps { dom: 152, sub: 81 });
    }
}
