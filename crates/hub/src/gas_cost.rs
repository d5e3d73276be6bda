//! Gas constants and the arithmetic the [`crate::gas_projector`] builds on.
//!
//! Every helper saturates instead of failing: a projection that overflows `u64` is larger than
//! any gas budget, which is exactly what the out-of-gas check needs to see.

use ethereum_types::U256;

use crate::constants::WORD_SIZE;

pub const ZERO: u64 = 0;
pub const JUMPDEST: u64 = 1;
pub const BASE: u64 = 2;
pub const VERY_LOW: u64 = 3;
pub const LOW: u64 = 5;
pub const MID: u64 = 8;
pub const HIGH: u64 = 10;
pub const BLOCKHASH: u64 = 20;

pub const EXP_STATIC: u64 = 10;
pub const EXP_DYNAMIC_BASE: u64 = 50;
pub const KECCAK256_STATIC: u64 = 30;
pub const KECCAK256_DYNAMIC_BASE: u64 = 6;
pub const COPY_STATIC: u64 = 3;
pub const COPY_DYNAMIC_BASE: u64 = 3;

pub const LOGN_STATIC: u64 = 375;
pub const LOGN_DYNAMIC_BASE: u64 = 375;
pub const LOGN_DYNAMIC_BYTE_BASE: u64 = 8;

pub const WARM_ACCESS: u64 = 100;
pub const COLD_ACCOUNT_ACCESS: u64 = 2600;
pub const COLD_SLOAD: u64 = 2100;
pub const TRANSIENT_ACCESS: u64 = 100;

pub const SSTORE_SET: u64 = 20000;
pub const SSTORE_RESET: u64 = 2900;
pub const SSTORE_STIPEND: u64 = 2300;

pub const CALL_POSITIVE_VALUE: u64 = 9000;
pub const CALL_POSITIVE_VALUE_STIPEND: u64 = 2300;
pub const CALL_TO_EMPTY_ACCOUNT: u64 = 25000;

pub const CREATE_BASE_COST: u64 = 32000;
pub const INIT_CODE_WORD_COST: u64 = 2;
pub const CODE_DEPOSIT_COST: u64 = 200;

pub const SELFDESTRUCT_STATIC: u64 = 5000;
pub const SELFDESTRUCT_DYNAMIC: u64 = 25000;

pub const MEMORY_WORD_COST: u64 = 3;
pub const MEMORY_EXPANSION_QUOTIENT: u64 = 512;

/// Number of 32 byte words needed to hold `size` bytes.
pub fn words(size: u64) -> u64 {
    size.div_ceil(WORD_SIZE as u64)
}

/// Memory size in bytes after touching `[offset, offset + size)`.
pub fn memory_size(offset: u64, size: u64) -> u64 {
    if size == 0 {
        return 0;
    }
    offset
        .saturating_add(size)
        .checked_next_multiple_of(WORD_SIZE as u64)
        .unwrap_or(u64::MAX)
}

/// Total cost of a memory of `memory_size` bytes.
fn memory_cost(memory_size: u64) -> u64 {
    let memory_size_word = words(memory_size);
    (memory_size_word.saturating_mul(memory_size_word) / MEMORY_EXPANSION_QUOTIENT)
        .saturating_add(MEMORY_WORD_COST.saturating_mul(memory_size_word))
}

pub fn expansion_cost(new_memory_size: u64, current_memory_size: u64) -> u64 {
    if new_memory_size <= current_memory_size {
        0
    } else {
        memory_cost(new_memory_size).saturating_sub(memory_cost(current_memory_size))
    }
}

pub fn copy_cost(size: u64, dynamic_base: u64, static_cost: u64) -> u64 {
    static_cost.saturating_add(dynamic_base.saturating_mul(words(size)))
}

pub fn access_cost(was_warm: bool) -> u64 {
    if was_warm {
        WARM_ACCESS
    } else {
        COLD_ACCOUNT_ACCESS
    }
}

/// EIP-2200 / EIP-2929 SSTORE cost, without the refund side.
pub fn sstore(original: U256, current: U256, new: U256, was_warm: bool) -> u64 {
    let cold = if was_warm { 0 } else { COLD_SLOAD };
    let dynamic = if new == current || original != current {
        WARM_ACCESS
    } else if original.is_zero() {
        SSTORE_SET
    } else {
        SSTORE_RESET
    };
    cold.saturating_add(dynamic)
}
