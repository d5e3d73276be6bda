//! Upfront gas cost projection.
//!
//! The exception classifier needs the cost an instruction charges *before* it executes to decide
//! whether it runs out of gas. The VM owns the actual gas accounting, this is only a projection
//! of it, passed into the Hub through its [`crate::rules::RuleSet`].

use std::fmt::Debug;

use crate::constants::{
    TX_ACCESS_LIST_ADDRESS_GAS, TX_ACCESS_LIST_STORAGE_KEY_GAS, TX_BASE_COST, TX_CREATE_COST,
    TX_DATA_NON_ZERO_GAS, TX_DATA_ZERO_GAS,
};
use crate::gas_cost::{self, access_cost, copy_cost, expansion_cost, memory_size, words};
use crate::opcodes::Opcode;
use crate::rules::Fork;
use crate::utils::{stack_word, u256_to_u64_saturating, word_to_address};
use crate::world::{MessageFrame, Transaction, WorldView};

pub trait GasProjector: Debug + Send + Sync {
    /// Gas charged by `opcode` before any gas is forwarded to a child context.
    ///
    /// Only called when the stack holds enough items for `opcode`.
    fn upfront_cost(&self, opcode: Opcode, frame: &dyn MessageFrame, world: &dyn WorldView) -> u64;

    /// Gas charged by the transaction itself before execution starts.
    fn intrinsic_cost(&self, tx: &Transaction) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StandardGasProjector {
    fork: Fork,
}

impl StandardGasProjector {
    pub fn new(fork: Fork) -> Self {
        Self { fork }
    }

    pub fn fork(&self) -> Fork {
        self.fork
    }
}

/// Memory expansion cost of touching `[stack[offset_at], stack[offset_at] + stack[size_at])`.
fn memory_expansion(frame: &dyn MessageFrame, offset_at: usize, size_at: usize) -> u64 {
    let offset = u256_to_u64_saturating(stack_word(frame, offset_at));
    let size = u256_to_u64_saturating(stack_word(frame, size_at));
    expansion_cost(memory_size(offset, size), current_memory(frame))
}

fn current_memory(frame: &dyn MessageFrame) -> u64 {
    u64::try_from(frame.memory_size()).unwrap_or(u64::MAX)
}

fn static_cost(opcode: Opcode) -> u64 {
    use Opcode::*;
    match opcode {
        STOP | RETURN | REVERT | INVALID => gas_cost::ZERO,
        JUMPDEST => gas_cost::JUMPDEST,
        ADDRESS | ORIGIN | CALLER | CALLVALUE | CALLDATASIZE | CODESIZE | GASPRICE
        | RETURNDATASIZE | COINBASE | TIMESTAMP | NUMBER | PREVRANDAO | GASLIMIT | CHAINID
        | BASEFEE | BLOBBASEFEE | POP | PC | MSIZE | GAS | PUSH0 => gas_cost::BASE,
        ADD | SUB | NOT | LT | GT | SLT | SGT | EQ | ISZERO | AND | OR | XOR | BYTE | SHL
        | SHR | SAR | CALLDATALOAD | MLOAD | MSTORE | MSTORE8 | BLOBHASH => gas_cost::VERY_LOW,
        MUL | DIV | SDIV | MOD | SMOD | SIGNEXTEND | SELFBALANCE | CLZ => gas_cost::LOW,
        ADDMOD | MULMOD | JUMP => gas_cost::MID,
        JUMPI | EXP => gas_cost::HIGH,
        BLOCKHASH => gas_cost::BLOCKHASH,
        TLOAD | TSTORE => gas_cost::TRANSIENT_ACCESS,
        _ if opcode.push_size().is_some()
            || opcode.dup_depth().is_some()
            || opcode.swap_depth().is_some() =>
        {
            gas_cost::VERY_LOW
        }
        _ => gas_cost::ZERO,
    }
}

impl GasProjector for StandardGasProjector {
    fn upfront_cost(&self, opcode: Opcode, frame: &dyn MessageFrame, world: &dyn WorldView) -> u64 {
        use Opcode::*;
        let word = |depth| stack_word(frame, depth);
        let size_at = |depth| u256_to_u64_saturating(word(depth));
        let account_access = |depth| access_cost(frame.is_address_warm(word_to_address(word(depth))));

        match opcode {
            EXP => {
                let exponent_bytes = u64::try_from(word(1).bits().div_ceil(8)).unwrap_or(u64::MAX);
                gas_cost::EXP_STATIC
                    .saturating_add(gas_cost::EXP_DYNAMIC_BASE.saturating_mul(exponent_bytes))
            }
            KECCAK256 => copy_cost(
                size_at(1),
                gas_cost::KECCAK256_DYNAMIC_BASE,
                gas_cost::KECCAK256_STATIC,
            )
            .saturating_add(memory_expansion(frame, 0, 1)),
            CALLDATACOPY | CODECOPY | RETURNDATACOPY => copy_cost(
                size_at(2),
                gas_cost::COPY_DYNAMIC_BASE,
                gas_cost::COPY_STATIC,
            )
            .saturating_add(memory_expansion(frame, 0, 2)),
            MCOPY => {
                let size = size_at(2);
                let furthest = size_at(0).max(size_at(1));
                copy_cost(size, gas_cost::COPY_DYNAMIC_BASE, gas_cost::COPY_STATIC).saturating_add(
                    expansion_cost(memory_size(furthest, size), current_memory(frame)),
                )
            }
            EXTCODECOPY => account_access(0)
                .saturating_add(copy_cost(size_at(3), gas_cost::COPY_DYNAMIC_BASE, 0))
                .saturating_add(memory_expansion(frame, 1, 3)),
            MLOAD | MSTORE => static_cost(opcode).saturating_add(expansion_cost(
                memory_size(size_at(0), 32),
                current_memory(frame),
            )),
            MSTORE8 => static_cost(opcode).saturating_add(expansion_cost(
                memory_size(size_at(0), 1),
                current_memory(frame),
            )),
            BALANCE | EXTCODESIZE | EXTCODEHASH => account_access(0),
            SLOAD => {
                let warm = frame.is_storage_warm(frame.recipient(), word(0));
                if warm {
                    gas_cost::WARM_ACCESS
                } else {
                    gas_cost::COLD_SLOAD
                }
            }
            SSTORE => {
                let address = frame.recipient();
                let key = word(0);
                gas_cost::sstore(
                    world.original_storage(address, key),
                    world.storage(address, key),
                    word(1),
                    frame.is_storage_warm(address, key),
                )
            }
            LOG0 | LOG1 | LOG2 | LOG3 | LOG4 => {
                let topics = u64::try_from(opcode.log_topics().unwrap_or(0)).unwrap_or(0);
                gas_cost::LOGN_STATIC
                    .saturating_add(gas_cost::LOGN_DYNAMIC_BASE.saturating_mul(topics))
                    .saturating_add(gas_cost::LOGN_DYNAMIC_BYTE_BASE.saturating_mul(size_at(1)))
                    .saturating_add(memory_expansion(frame, 0, 1))
            }
            CALL | CALLCODE | DELEGATECALL | STATICCALL => {
                let (args_at, return_at) = if opcode.carries_value() {
                    (3, 5)
                } else {
                    (2, 4)
                };
                let args_end = memory_size(size_at(args_at), size_at(args_at + 1));
                let return_end = memory_size(size_at(return_at), size_at(return_at + 1));
                let expansion = expansion_cost(args_end.max(return_end), current_memory(frame));

                let callee = word_to_address(word(1));
                let value = if opcode.carries_value() {
                    word(2)
                } else {
                    Default::default()
                };
                let value_cost = if value.is_zero() {
                    0
                } else {
                    gas_cost::CALL_POSITIVE_VALUE
                };
                let callee_is_empty = world
                    .account(callee)
                    .is_none_or(|account| account.is_empty());
                let new_account_cost = if opcode == CALL && !value.is_zero() && callee_is_empty {
                    gas_cost::CALL_TO_EMPTY_ACCOUNT
                } else {
                    0
                };

                access_cost(frame.is_address_warm(callee))
                    .saturating_add(value_cost)
                    .saturating_add(new_account_cost)
                    .saturating_add(expansion)
            }
            CREATE | CREATE2 => {
                let init_code_words = words(size_at(2));
                let hash_cost = if opcode == CREATE2 {
                    gas_cost::KECCAK256_DYNAMIC_BASE.saturating_mul(init_code_words)
                } else {
                    0
                };
                gas_cost::CREATE_BASE_COST
                    .saturating_add(gas_cost::INIT_CODE_WORD_COST.saturating_mul(init_code_words))
                    .saturating_add(hash_cost)
                    .saturating_add(memory_expansion(frame, 1, 2))
            }
            RETURN | REVERT => memory_expansion(frame, 0, 1),
            SELFDESTRUCT => {
                let beneficiary = word_to_address(word(0));
                let cold = if frame.is_address_warm(beneficiary) {
                    0
                } else {
                    gas_cost::COLD_ACCOUNT_ACCESS
                };
                let balance = world
                    .account(frame.recipient())
                    .map(|account| account.balance)
                    .unwrap_or_default();
                let beneficiary_is_empty = world
                    .account(beneficiary)
                    .is_none_or(|account| account.is_empty());
                let new_account = if beneficiary_is_empty && !balance.is_zero() {
                    gas_cost::SELFDESTRUCT_DYNAMIC
                } else {
                    0
                };
                gas_cost::SELFDESTRUCT_STATIC
                    .saturating_add(cold)
                    .saturating_add(new_account)
            }
            _ => static_cost(opcode),
        }
    }

    fn intrinsic_cost(&self, tx: &Transaction) -> u64 {
        let data_cost = tx.data.iter().fold(0u64, |acc, byte| {
            acc.saturating_add(if *byte == 0 {
                TX_DATA_ZERO_GAS
            } else {
                TX_DATA_NON_ZERO_GAS
            })
        });

        let create_cost = if tx.is_deployment() {
            let init_code_words = words(u64::try_from(tx.data.len()).unwrap_or(u64::MAX));
            TX_CREATE_COST.saturating_add(gas_cost::INIT_CODE_WORD_COST.saturating_mul(init_code_words))
        } else {
            0
        };

        let access_list_cost = tx.access_list.iter().fold(0u64, |acc, (_, keys)| {
            let keys = u64::try_from(keys.len()).unwrap_or(u64::MAX);
            acc.saturating_add(TX_ACCESS_LIST_ADDRESS_GAS)
                .saturating_add(TX_ACCESS_LIST_STORAGE_KEY_GAS.saturating_mul(keys))
        });

        TX_BASE_COST
            .saturating_add(data_cost)
            .saturating_add(create_cost)
            .saturating_add(access_list_cost)
    }
}
