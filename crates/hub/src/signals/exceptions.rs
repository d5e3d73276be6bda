use serde::{Serialize, Serializer};

use crate::constants::{INVALID_CODE_PREFIX, MAX_MEMORY_OFFSET, STACK_LIMIT};
use crate::gas_cost::SSTORE_STIPEND;
use crate::opcodes::{Opcode, OpcodeData};
use crate::rules::RuleSet;
use crate::utils::{is_valid_jump_destination, stack_word, u256_to_u64_saturating, u256_to_usize_saturating};
use crate::world::{FrameType, MessageFrame, WorldView};

/// Exceptions an instruction can raise. At most one flag is ever set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Exceptions(u16);

impl Exceptions {
    pub const NONE: Self = Self(0);
    pub const INVALID_OPCODE: Self = Self(1);
    pub const STACK_UNDERFLOW: Self = Self(1 << 1);
    pub const STACK_OVERFLOW: Self = Self(1 << 2);
    pub const MEMORY_EXPANSION: Self = Self(1 << 3);
    pub const OUT_OF_GAS: Self = Self(1 << 4);
    pub const RETURN_DATA_COPY_FAULT: Self = Self(1 << 5);
    pub const JUMP_FAULT: Self = Self(1 << 6);
    pub const STATIC_FAULT: Self = Self(1 << 7);
    pub const OUT_OF_SSTORE_STIPEND: Self = Self(1 << 8);
    pub const INVALID_CODE_PREFIX: Self = Self(1 << 9);
    pub const MAX_CODE_SIZE: Self = Self(1 << 10);

    const NAMES: [(Self, &'static str); 11] = [
        (Self::INVALID_OPCODE, "INVALID_OPCODE"),
        (Self::STACK_UNDERFLOW, "STACK_UNDERFLOW"),
        (Self::STACK_OVERFLOW, "STACK_OVERFLOW"),
        (Self::MEMORY_EXPANSION, "MEMORY_EXPANSION"),
        (Self::OUT_OF_GAS, "OUT_OF_GAS"),
        (Self::RETURN_DATA_COPY_FAULT, "RETURN_DATA_COPY_FAULT"),
        (Self::JUMP_FAULT, "JUMP_FAULT"),
        (Self::STATIC_FAULT, "STATIC_FAULT"),
        (Self::OUT_OF_SSTORE_STIPEND, "OUT_OF_SSTORE_STIPEND"),
        (Self::INVALID_CODE_PREFIX, "INVALID_CODE_PREFIX"),
        (Self::MAX_CODE_SIZE, "MAX_CODE_SIZE"),
    ];

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn none(self) -> bool {
        self.0 == 0
    }

    pub fn any(self) -> bool {
        !self.none()
    }

    pub fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 != 0
    }

    pub fn invalid_opcode(self) -> bool {
        self.contains(Self::INVALID_OPCODE)
    }

    pub fn stack_underflow(self) -> bool {
        self.contains(Self::STACK_UNDERFLOW)
    }

    pub fn stack_overflow(self) -> bool {
        self.contains(Self::STACK_OVERFLOW)
    }

    pub fn stack_exception(self) -> bool {
        self.stack_underflow() || self.stack_overflow()
    }

    pub fn memory_expansion(self) -> bool {
        self.contains(Self::MEMORY_EXPANSION)
    }

    pub fn out_of_gas(self) -> bool {
        self.contains(Self::OUT_OF_GAS)
    }

    pub fn return_data_copy_fault(self) -> bool {
        self.contains(Self::RETURN_DATA_COPY_FAULT)
    }

    pub fn jump_fault(self) -> bool {
        self.contains(Self::JUMP_FAULT)
    }

    pub fn static_fault(self) -> bool {
        self.contains(Self::STATIC_FAULT)
    }

    pub fn out_of_sstore_stipend(self) -> bool {
        self.contains(Self::OUT_OF_SSTORE_STIPEND)
    }

    pub fn invalid_code_prefix(self) -> bool {
        self.contains(Self::INVALID_CODE_PREFIX)
    }

    pub fn max_code_size(self) -> bool {
        self.contains(Self::MAX_CODE_SIZE)
    }

    /// Name of the raised exception, `"NONE"` if there is none.
    pub fn name(self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(flag, _)| self.contains(*flag))
            .map_or("NONE", |(_, name)| name)
    }
}

impl Serialize for Exceptions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Characterizes the pending instruction of `frame`.
///
/// Checks run in priority order and stop at the first hit: an invalid opcode hides stack
/// checks, and a stack fault hides everything that needs stack arguments.
pub fn classify(
    data: &OpcodeData,
    frame: &dyn MessageFrame,
    world: &dyn WorldView,
    rules: &RuleSet,
) -> Exceptions {
    let opcode = data.opcode;
    if opcode == Opcode::INVALID || !rules.supports(opcode) {
        return Exceptions::INVALID_OPCODE;
    }

    let height = frame.stack_size();
    if height < data.alpha {
        return Exceptions::STACK_UNDERFLOW;
    }
    if height - data.alpha + data.delta > STACK_LIMIT {
        return Exceptions::STACK_OVERFLOW;
    }

    if frame.is_static() && static_violation(data, frame) {
        return Exceptions::STATIC_FAULT;
    }

    if opcode == Opcode::RETURNDATACOPY && return_data_copy_fault(frame) {
        return Exceptions::RETURN_DATA_COPY_FAULT;
    }

    if memory_expansion_fault(opcode, frame) {
        return Exceptions::MEMORY_EXPANSION;
    }

    if opcode == Opcode::SSTORE && frame.remaining_gas() <= SSTORE_STIPEND {
        return Exceptions::OUT_OF_SSTORE_STIPEND;
    }

    let upfront = rules.gas_projector().upfront_cost(opcode, frame, world);
    if frame.remaining_gas() < upfront {
        return Exceptions::OUT_OF_GAS;
    }

    if jump_fault(opcode, frame) {
        return Exceptions::JUMP_FAULT;
    }

    if opcode == Opcode::RETURN && frame.frame_type() == FrameType::ContractCreation {
        let size = u256_to_usize_saturating(stack_word(frame, 1));
        if size > rules.max_code_size {
            return Exceptions::MAX_CODE_SIZE;
        }
        if size > 0 {
            let offset = u256_to_usize_saturating(stack_word(frame, 0));
            let first = frame.read_memory(offset, 1);
            if first.first() == Some(&INVALID_CODE_PREFIX) {
                return Exceptions::INVALID_CODE_PREFIX;
            }
        }
    }

    Exceptions::NONE
}

fn static_violation(data: &OpcodeData, frame: &dyn MessageFrame) -> bool {
    data.forbidden_in_static_context
        || (data.opcode == Opcode::CALL && !stack_word(frame, 2).is_zero())
}

fn return_data_copy_fault(frame: &dyn MessageFrame) -> bool {
    let offset = stack_word(frame, 1);
    let size = stack_word(frame, 2);
    let available = ethereum_types::U256::from(frame.return_data().len());
    offset
        .checked_add(size)
        .is_none_or(|end| end > available)
}

fn range_faults(offset: ethereum_types::U256, size: ethereum_types::U256) -> bool {
    if size.is_zero() {
        return false;
    }
    let limit = ethereum_types::U256::from(MAX_MEMORY_OFFSET);
    offset >= limit || size >= limit
}

fn memory_expansion_fault(opcode: Opcode, frame: &dyn MessageFrame) -> bool {
    let word = |depth| stack_word(frame, depth);
    match opcode {
        Opcode::MLOAD | Opcode::MSTORE | Opcode::MSTORE8 => {
            range_faults(word(0), ethereum_types::U256::one())
        }
        Opcode::MCOPY => range_faults(word(0), word(2)) || range_faults(word(1), word(2)),
        Opcode::CALL | Opcode::CALLCODE => {
            range_faults(word(3), word(4)) || range_faults(word(5), word(6))
        }
        Opcode::DELEGATECALL | Opcode::STATICCALL => {
            range_faults(word(2), word(3)) || range_faults(word(4), word(5))
        }
        _ => opcode
            .memory_range_positions()
            .is_some_and(|(offset_at, size_at)| range_faults(word(offset_at), word(size_at))),
    }
}

fn jump_fault(opcode: Opcode, frame: &dyn MessageFrame) -> bool {
    let taken = match opcode {
        Opcode::JUMP => true,
        Opcode::JUMPI => !stack_word(frame, 1).is_zero(),
        _ => false,
    };
    if !taken {
        return false;
    }
    let destination = stack_word(frame, 0);
    let destination = u256_to_u64_saturating(destination);
    usize::try_from(destination)
        .map(|destination| !is_valid_jump_destination(frame.code(), destination))
        .unwrap_or(true)
}
