use ethereum_types::H256;

pub const WORD_SIZE: usize = 32;
pub const STACK_LIMIT: usize = 1024;
pub const STACK_ITEMS_PER_LINE: usize = 4;

pub const MAX_CALL_DEPTH: usize = 1024;
pub const MAX_CODE_SIZE: usize = 0x6000;
pub const MAX_INIT_CODE_SIZE: usize = 2 * MAX_CODE_SIZE;

/// Offsets and sizes at or beyond this bound trigger a memory expansion exception.
pub const MAX_MEMORY_OFFSET: u64 = 1 << 32;

/// EIP-3541: code starting with this byte cannot be deployed.
pub const INVALID_CODE_PREFIX: u8 = 0xEF;

// Dom/sub stamp arithmetic
pub const MULTIPLIER_DOM_SUB_STAMPS: u32 = 16;
pub const MULTIPLIER_STACK_STAMP: u32 = 8;
pub const DOM_SUB_STAMP_OFFSET_REVERT: u32 = 8;
pub const DOM_SUB_STAMP_OFFSET_FINALIZATION: u32 = 9;
pub const DOM_SUB_STAMP_OFFSET_SELFDESTRUCT: u32 = 10;

pub const EMPTY_CODE_HASH: H256 = H256([
    0xc5, 0xd2, 0x46, 0x01, 0x86, 0xf7, 0x23, 0x3c, 0x92, 0x7e, 0x7d, 0xb2, 0xdc, 0xc7, 0x03, 0xc0,
    0xe5, 0x00, 0xb6, 0x53, 0xca, 0x82, 0x27, 0x3b, 0x7b, 0xfa, 0xd8, 0x04, 0x5d, 0x85, 0xa4, 0x70,
]);

// Transaction-level gas
pub const TX_BASE_COST: u64 = 21000;
pub const TX_CREATE_COST: u64 = 32000;
pub const TX_DATA_ZERO_GAS: u64 = 4;
pub const TX_DATA_NON_ZERO_GAS: u64 = 16;
pub const TX_ACCESS_LIST_ADDRESS_GAS: u64 = 2400;
pub const TX_ACCESS_LIST_STORAGE_KEY_GAS: u64 = 1900;
pub const MAX_REFUND_QUOTIENT: u64 = 5;
