use ethereum_types::{Address, U256};

use crate::call_stack::FrameId;
use crate::section::SectionId;

/// Internal-consistency violations.
///
/// Exceptions and aborts of the traced instructions are never reported through this type, they
/// are plain flags (see [`crate::signals`]). A `HubError` means the trace under construction is
/// malformed and must be discarded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    #[error("Debit of {amount} exceeds the balance {balance} of {address:#x}")]
    InsufficientBalance {
        address: Address,
        balance: U256,
        amount: U256,
    },
    #[error("Credit of {amount} overflows the balance of {address:#x}")]
    BalanceOverflow { address: Address, amount: U256 },
    #[error("Nonce overflow for {0:#x}")]
    NonceOverflow(Address),
    #[error("Section {section} exceeds its row budget of {budget}")]
    RowBudgetExceeded { section: SectionId, budget: usize },
    #[error("Section {0} has no successor to seal against")]
    MissingNextSection(SectionId),
    #[error("Call stack is empty")]
    EmptyCallStack,
    #[error("Context number {0} was already entered")]
    DuplicateContext(u32),
    #[error("Unknown frame {0}")]
    UnknownFrame(FrameId),
    #[error("Unknown section {0}")]
    UnknownSection(SectionId),
    #[error("Stack result of section {0} was already unlatched")]
    StackUnlatchedTwice(SectionId),
    #[error("Section {0} has no latched stack result")]
    StackNotLatched(SectionId),
    #[error("Unexpected {event} during {during}")]
    UnexpectedLifecycle {
        event: &'static str,
        during: &'static str,
    },
    #[error("No transaction in progress")]
    NoTransaction,
    #[error("No conflation in progress")]
    NoConflation,
    #[error("{0} is not sealed")]
    NotSealed(&'static str),
    #[error("{0} was already sealed")]
    AlreadySealed(&'static str),
    #[error("Section {section} is not a {expected} section")]
    UnexpectedSection {
        section: SectionId,
        expected: &'static str,
    },
    #[error("Frame stack has no item at depth {0}")]
    MissingStackItem(usize),
    #[error("Out-of-range arithmetic in {0}")]
    Arithmetic(&'static str),
}
