use serde::Serialize;
use strum::{Display, EnumString};

use crate::constants::STACK_ITEMS_PER_LINE;
use crate::rules::Fork;

#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Hash, EnumString, Display, Serialize)]
pub enum Opcode {
    // Stop and Arithmetic Operations
    STOP = 0x00,
    ADD = 0x01,
    MUL = 0x02,
    SUB = 0x03,
    DIV = 0x04,
    SDIV = 0x05,
    MOD = 0x06,
    SMOD = 0x07,
    ADDMOD = 0x08,
    MULMOD = 0x09,
    EXP = 0x0A,
    SIGNEXTEND = 0x0B,

    // Comparison & Bitwise Logic Operations
    LT = 0x10,
    GT = 0x11,
    SLT = 0x12,
    SGT = 0x13,
    EQ = 0x14,
    ISZERO = 0x15,
    AND = 0x16,
    OR = 0x17,
    XOR = 0x18,
    NOT = 0x19,
    BYTE = 0x1A,
    SHL = 0x1B,
    SHR = 0x1C,
    SAR = 0x1D,
    CLZ = 0x1E,

    // KECCAK256
    KECCAK256 = 0x20,

    // Environmental Information
    ADDRESS = 0x30,
    BALANCE = 0x31,
    ORIGIN = 0x32,
    CALLER = 0x33,
    CALLVALUE = 0x34,
    CALLDATALOAD = 0x35,
    CALLDATASIZE = 0x36,
    CALLDATACOPY = 0x37,
    CODESIZE = 0x38,
    CODECOPY = 0x39,
    GASPRICE = 0x3A,
    EXTCODESIZE = 0x3B,
    EXTCODECOPY = 0x3C,
    RETURNDATASIZE = 0x3D,
    RETURNDATACOPY = 0x3E,
    EXTCODEHASH = 0x3F,

    // Block Information
    BLOCKHASH = 0x40,
    COINBASE = 0x41,
    TIMESTAMP = 0x42,
    NUMBER = 0x43,
    PREVRANDAO = 0x44,
    GASLIMIT = 0x45,
    CHAINID = 0x46,
    SELFBALANCE = 0x47,
    BASEFEE = 0x48,
    BLOBHASH = 0x49,
    BLOBBASEFEE = 0x4A,

    // Stack, Memory, Storage, and Flow Operations
    POP = 0x50,
    MLOAD = 0x51,
    MSTORE = 0x52,
    MSTORE8 = 0x53,
    SLOAD = 0x54,
    SSTORE = 0x55,
    JUMP = 0x56,
    JUMPI = 0x57,
    PC = 0x58,
    MSIZE = 0x59,
    GAS = 0x5A,
    JUMPDEST = 0x5B,
    TLOAD = 0x5C,
    TSTORE = 0x5D,
    MCOPY = 0x5E,

    // Push Operations
    PUSH0 = 0x5F,
    PUSH1 = 0x60,
    PUSH2 = 0x61,
    PUSH3 = 0x62,
    PUSH4 = 0x63,
    PUSH5 = 0x64,
    PUSH6 = 0x65,
    PUSH7 = 0x66,
    PUSH8 = 0x67,
    PUSH9 = 0x68,
    PUSH10 = 0x69,
    PUSH11 = 0x6A,
    PUSH12 = 0x6B,
    PUSH13 = 0x6C,
    PUSH14 = 0x6D,
    PUSH15 = 0x6E,
    PUSH16 = 0x6F,
    PUSH17 = 0x70,
    PUSH18 = 0x71,
    PUSH19 = 0x72,
    PUSH20 = 0x73,
    PUSH21 = 0x74,
    PUSH22 = 0x75,
    PUSH23 = 0x76,
    PUSH24 = 0x77,
    PUSH25 = 0x78,
    PUSH26 = 0x79,
    PUSH27 = 0x7A,
    PUSH28 = 0x7B,
    PUSH29 = 0x7C,
    PUSH30 = 0x7D,
    PUSH31 = 0x7E,
    PUSH32 = 0x7F,

    // Duplication Operations
    DUP1 = 0x80,
    DUP2 = 0x81,
    DUP3 = 0x82,
    DUP4 = 0x83,
    DUP5 = 0x84,
    DUP6 = 0x85,
    DUP7 = 0x86,
    DUP8 = 0x87,
    DUP9 = 0x88,
    DUP10 = 0x89,
    DUP11 = 0x8A,
    DUP12 = 0x8B,
    DUP13 = 0x8C,
    DUP14 = 0x8D,
    DUP15 = 0x8E,
    DUP16 = 0x8F,

    // Swap Operations
    SWAP1 = 0x90,
    SWAP2 = 0x91,
    SWAP3 = 0x92,
    SWAP4 = 0x93,
    SWAP5 = 0x94,
    SWAP6 = 0x95,
    SWAP7 = 0x96,
    SWAP8 = 0x97,
    SWAP9 = 0x98,
    SWAP10 = 0x99,
    SWAP11 = 0x9A,
    SWAP12 = 0x9B,
    SWAP13 = 0x9C,
    SWAP14 = 0x9D,
    SWAP15 = 0x9E,
    SWAP16 = 0x9F,

    // Logging Operations
    LOG0 = 0xA0,
    LOG1 = 0xA1,
    LOG2 = 0xA2,
    LOG3 = 0xA3,
    LOG4 = 0xA4,

    // System Operations
    CREATE = 0xF0,
    CALL = 0xF1,
    CALLCODE = 0xF2,
    RETURN = 0xF3,
    DELEGATECALL = 0xF4,
    CREATE2 = 0xF5,
    STATICCALL = 0xFA,
    REVERT = 0xFD,
    INVALID = 0xFE,
    SELFDESTRUCT = 0xFF,
}

/// Assigned opcodes, used to fill [`OPCODE_TABLE`]; every other byte decodes as `INVALID`.
#[rustfmt::skip]
const ASSIGNED: [Opcode; 150] = {
    use Opcode::*;
    [
        STOP, ADD, MUL, SUB, DIV, SDIV, MOD, SMOD, ADDMOD, MULMOD, EXP, SIGNEXTEND,
        LT, GT, SLT, SGT, EQ, ISZERO, AND, OR, XOR, NOT, BYTE, SHL, SHR, SAR, CLZ,
        KECCAK256,
        ADDRESS, BALANCE, ORIGIN, CALLER, CALLVALUE, CALLDATALOAD, CALLDATASIZE, CALLDATACOPY,
        CODESIZE, CODECOPY, GASPRICE, EXTCODESIZE, EXTCODECOPY, RETURNDATASIZE, RETURNDATACOPY,
        EXTCODEHASH,
        BLOCKHASH, COINBASE, TIMESTAMP, NUMBER, PREVRANDAO, GASLIMIT, CHAINID, SELFBALANCE,
        BASEFEE, BLOBHASH, BLOBBASEFEE,
        POP, MLOAD, MSTORE, MSTORE8, SLOAD, SSTORE, JUMP, JUMPI, PC, MSIZE, GAS, JUMPDEST,
        TLOAD, TSTORE, MCOPY,
        PUSH0, PUSH1, PUSH2, PUSH3, PUSH4, PUSH5, PUSH6, PUSH7, PUSH8, PUSH9, PUSH10, PUSH11,
        PUSH12, PUSH13, PUSH14, PUSH15, PUSH16, PUSH17, PUSH18, PUSH19, PUSH20, PUSH21, PUSH22,
        PUSH23, PUSH24, PUSH25, PUSH26, PUSH27, PUSH28, PUSH29, PUSH30, PUSH31, PUSH32,
        DUP1, DUP2, DUP3, DUP4, DUP5, DUP6, DUP7, DUP8, DUP9, DUP10, DUP11, DUP12, DUP13, DUP14,
        DUP15, DUP16,
        SWAP1, SWAP2, SWAP3, SWAP4, SWAP5, SWAP6, SWAP7, SWAP8, SWAP9, SWAP10, SWAP11, SWAP12,
        SWAP13, SWAP14, SWAP15, SWAP16,
        LOG0, LOG1, LOG2, LOG3, LOG4,
        CREATE, CALL, CALLCODE, RETURN, DELEGATECALL, CREATE2, STATICCALL, REVERT, INVALID,
        SELFDESTRUCT,
    ]
};

#[allow(clippy::as_conversions)]
const OPCODE_TABLE: [Opcode; 256] = {
    let mut table = [Opcode::INVALID; 256];
    let mut i = 0;
    while i < ASSIGNED.len() {
        table[ASSIGNED[i] as usize] = ASSIGNED[i];
        i += 1;
    }
    table
};

impl From<u8> for Opcode {
    fn from(byte: u8) -> Self {
        OPCODE_TABLE[usize::from(byte)]
    }
}

impl From<Opcode> for u8 {
    #[allow(clippy::as_conversions)]
    fn from(opcode: Opcode) -> Self {
        opcode as u8
    }
}

/// Instruction families, i.e. the shape of the section an instruction produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
pub enum InstructionFamily {
    Add,
    Mul,
    Exp,
    Mod,
    Ext,
    Wcp,
    Bin,
    Shf,
    Keccak,
    Context,
    Account,
    Copy,
    Transaction,
    Batch,
    StackRam,
    Storage,
    Transient,
    Jump,
    MachineState,
    PushPop,
    Dup,
    Swap,
    Log,
    Create,
    Call,
    Halt,
    Invalid,
}

/// Static per-opcode information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeData {
    pub opcode: Opcode,
    pub family: InstructionFamily,
    /// Items removed from the stack.
    pub alpha: usize,
    /// Items added to the stack.
    pub delta: usize,
    pub forbidden_in_static_context: bool,
    pub introduced_in: Fork,
}

impl OpcodeData {
    /// Rows of stack fragments the instruction occupies.
    pub fn stack_lines(&self) -> usize {
        match self.family {
            InstructionFamily::Dup | InstructionFamily::Swap => 1,
            _ if self.alpha + self.delta > STACK_ITEMS_PER_LINE => 2,
            _ => 1,
        }
    }
}

impl Serialize for OpcodeData {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.opcode.serialize(serializer)
    }
}

impl Opcode {
    pub fn data(self) -> OpcodeData {
        use InstructionFamily as F;
        use Opcode::*;

        let (family, alpha, delta) = match self {
            ADD | SUB => (F::Add, 2, 1),
            MUL => (F::Mul, 2, 1),
            EXP => (F::Exp, 2, 1),
            DIV | SDIV | MOD | SMOD => (F::Mod, 2, 1),
            ADDMOD | MULMOD => (F::Ext, 3, 1),
            LT | GT | SLT | SGT | EQ => (F::Wcp, 2, 1),
            ISZERO => (F::Wcp, 1, 1),
            AND | OR | XOR | BYTE | SIGNEXTEND => (F::Bin, 2, 1),
            NOT => (F::Bin, 1, 1),
            SHL | SHR | SAR => (F::Shf, 2, 1),
            CLZ => (F::Bin, 1, 1),
            KECCAK256 => (F::Keccak, 2, 1),
            ADDRESS | CALLER | CALLVALUE | CALLDATASIZE | RETURNDATASIZE => (F::Context, 0, 1),
            BALANCE | EXTCODESIZE | EXTCODEHASH => (F::Account, 1, 1),
            CODESIZE | SELFBALANCE => (F::Account, 0, 1),
            CALLDATACOPY | CODECOPY | RETURNDATACOPY => (F::Copy, 3, 0),
            EXTCODECOPY => (F::Copy, 4, 0),
            MCOPY => (F::Copy, 3, 0),
            ORIGIN | GASPRICE => (F::Transaction, 0, 1),
            BLOCKHASH => (F::Batch, 1, 1),
            BLOBHASH => (F::Batch, 1, 1),
            COINBASE | TIMESTAMP | NUMBER | PREVRANDAO | GASLIMIT | CHAINID | BASEFEE
            | BLOBBASEFEE => (F::Batch, 0, 1),
            MLOAD | CALLDATALOAD => (F::StackRam, 1, 1),
            MSTORE | MSTORE8 => (F::StackRam, 2, 0),
            SLOAD => (F::Storage, 1, 1),
            SSTORE => (F::Storage, 2, 0),
            TLOAD => (F::Transient, 1, 1),
            TSTORE => (F::Transient, 2, 0),
            JUMP => (F::Jump, 1, 0),
            JUMPI => (F::Jump, 2, 0),
            PC | MSIZE | GAS => (F::MachineState, 0, 1),
            JUMPDEST => (F::MachineState, 0, 0),
            POP => (F::PushPop, 1, 0),
            DUP1 | DUP2 | DUP3 | DUP4 | DUP5 | DUP6 | DUP7 | DUP8 | DUP9 | DUP10 | DUP11
            | DUP12 | DUP13 | DUP14 | DUP15 | DUP16 => {
                let n = self.dup_depth().unwrap_or(1);
                (F::Dup, n, n + 1)
            }
            SWAP1 | SWAP2 | SWAP3 | SWAP4 | SWAP5 | SWAP6 | SWAP7 | SWAP8 | SWAP9 | SWAP10
            | SWAP11 | SWAP12 | SWAP13 | SWAP14 | SWAP15 | SWAP16 => {
                let n = self.swap_depth().unwrap_or(1);
                (F::Swap, n + 1, n + 1)
            }
            LOG0 | LOG1 | LOG2 | LOG3 | LOG4 => (F::Log, 2 + self.log_topics().unwrap_or(0), 0),
            CREATE => (F::Create, 3, 1),
            CREATE2 => (F::Create, 4, 1),
            CALL | CALLCODE => (F::Call, 7, 1),
            DELEGATECALL | STATICCALL => (F::Call, 6, 1),
            STOP => (F::Halt, 0, 0),
            RETURN | REVERT => (F::Halt, 2, 0),
            SELFDESTRUCT => (F::Halt, 1, 0),
            INVALID => (F::Invalid, 0, 0),
            _ => (F::PushPop, 0, 1),
        };

        OpcodeData {
            opcode: self,
            family,
            alpha,
            delta,
            forbidden_in_static_context: matches!(
                self,
                SSTORE | TSTORE | LOG0 | LOG1 | LOG2 | LOG3 | LOG4 | CREATE | CREATE2 | SELFDESTRUCT
            ),
            introduced_in: match self {
                CLZ => Fork::Osaka,
                _ => Fork::Cancun,
            },
        }
    }

    pub fn is_call(self) -> bool {
        matches!(
            self,
            Opcode::CALL | Opcode::CALLCODE | Opcode::DELEGATECALL | Opcode::STATICCALL
        )
    }

    pub fn is_create(self) -> bool {
        matches!(self, Opcode::CREATE | Opcode::CREATE2)
    }

    /// Whether the instruction transfers value taken from the stack.
    pub fn carries_value(self) -> bool {
        matches!(self, Opcode::CALL | Opcode::CALLCODE)
    }

    /// Position of the memory arguments `(offset, size)` on the stack, if the instruction
    /// reads or writes a single memory range.
    pub fn memory_range_positions(self) -> Option<(usize, usize)> {
        use Opcode::*;
        match self {
            KECCAK256 | RETURN | REVERT | LOG0 | LOG1 | LOG2 | LOG3 | LOG4 => Some((0, 1)),
            CALLDATACOPY | CODECOPY | RETURNDATACOPY | MCOPY => Some((0, 2)),
            EXTCODECOPY => Some((1, 3)),
            CREATE | CREATE2 => Some((1, 2)),
            _ => None,
        }
    }

    pub fn push_size(self) -> Option<usize> {
        let byte = u8::from(self);
        (0x5F..=0x7F)
            .contains(&byte)
            .then(|| usize::from(byte - 0x5F))
    }

    pub fn dup_depth(self) -> Option<usize> {
        let byte = u8::from(self);
        (0x80..=0x8F)
            .contains(&byte)
            .then(|| usize::from(byte - 0x80 + 1))
    }

    pub fn swap_depth(self) -> Option<usize> {
        let byte = u8::from(self);
        (0x90..=0x9F)
            .contains(&byte)
            .then(|| usize::from(byte - 0x90 + 1))
    }

    pub fn log_topics(self) -> Option<usize> {
        let byte = u8::from(self);
        (0xA0..=0xA4)
            .contains(&byte)
            .then(|| usize::from(byte - 0xA0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unassigned_bytes_decode_as_invalid() {
        assert_eq!(Opcode::from(0x0C), Opcode::INVALID);
        assert_eq!(Opcode::from(0xEF), Opcode::INVALID);
        assert_eq!(Opcode::from(0xF1), Opcode::CALL);
        assert_eq!(Opcode::from(0x7F), Opcode::PUSH32);
    }

    #[test]
    fn assigned_table_round_trips() {
        for opcode in ASSIGNED {
            assert_eq!(Opcode::from(u8::from(opcode)), opcode);
        }
    }

    #[test]
    fn stack_patterns() {
        let call = Opcode::CALL.data();
        assert_eq!((call.alpha, call.delta), (7, 1));
        assert_eq!(call.stack_lines(), 2);

        let dup = Opcode::DUP3.data();
        assert_eq!((dup.alpha, dup.delta), (3, 4));
        assert_eq!(dup.stack_lines(), 1);

        assert_eq!(Opcode::LOG4.data().alpha, 6);
        assert!(Opcode::SSTORE.data().forbidden_in_static_context);
        assert!(!Opcode::CALL.data().forbidden_in_static_context);
    }
}
