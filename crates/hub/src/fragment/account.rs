use serde::Serialize;

use crate::account_snapshot::AccountSnapshot;
use crate::fragment::DomSubStamps;

/// A before/after pair of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountFragment {
    pub before: AccountSnapshot,
    pub after: AccountSnapshot,
    pub dom_sub: DomSubStamps,
    /// Whether the row points at the code of `after`, e.g. because it is about to run.
    pub requires_code_fragment_index: bool,
}

impl AccountFragment {
    pub fn new(before: AccountSnapshot, after: AccountSnapshot, dom_sub: DomSubStamps) -> Self {
        Self {
            before,
            after,
            dom_sub,
            requires_code_fragment_index: false,
        }
    }

    pub fn with_code_fragment_index(mut self) -> Self {
        self.requires_code_fragment_index = true;
        self
    }

    /// The same transition played backwards, stamped `dom_sub`.
    pub fn undo(&self, dom_sub: DomSubStamps) -> Self {
        Self {
            before: self.after.clone(),
            after: self.before.clone(),
            dom_sub,
            requires_code_fragment_index: false,
        }
    }
}
