use serde::Serialize;

use crate::opcodes::{Opcode, OpcodeData};
use crate::rules::RuleSet;
use crate::signals::Exceptions;
use crate::utils::stack_word;
use crate::world::{MessageFrame, WorldView};

/// Conditions under which a CALL or CREATE completes without spawning a child context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Aborts {
    pub call_stack_overflow: bool,
    pub balance_too_low: bool,
}

impl Aborts {
    pub fn any(self) -> bool {
        self.call_stack_overflow || self.balance_too_low
    }

    pub fn none(self) -> bool {
        !self.any()
    }
}

/// Abort conditions of the pending instruction. Always empty when `exceptions` is not.
pub fn classify(
    data: &OpcodeData,
    frame: &dyn MessageFrame,
    world: &dyn WorldView,
    rules: &RuleSet,
    exceptions: Exceptions,
) -> Aborts {
    let opcode = data.opcode;
    if exceptions.any() || !(opcode.is_call() || opcode.is_create()) {
        return Aborts::default();
    }

    let value = match opcode {
        Opcode::CALL | Opcode::CALLCODE => stack_word(frame, 2),
        Opcode::CREATE | Opcode::CREATE2 => stack_word(frame, 0),
        _ => ethereum_types::U256::zero(),
    };
    let balance = world
        .account(frame.recipient())
        .map(|account| account.balance)
        .unwrap_or_default();

    Aborts {
        call_stack_overflow: frame.depth() >= rules.max_call_depth,
        balance_too_low: value > balance,
    }
}
