//! Per-instruction classification: exceptions, aborts, and the satellite modules an instruction
//! must invoke.
//!
//! Everything in here is a pure function of the frame, the world view and the rule set. The
//! [`crate::hub::Hub`] evaluates it exactly once per instruction, in `pre_opcode`.

pub mod aborts;
pub mod exceptions;

pub use aborts::Aborts;
pub use exceptions::Exceptions;

use serde::Serialize;

use crate::module::ModuleId;
use crate::opcodes::{InstructionFamily, Opcode, OpcodeData};
use crate::rules::RuleSet;
use crate::utils::{stack_word, word_to_address};
use crate::world::{FrameType, MessageFrame, WorldView};

/// Satellite modules the current instruction must invoke.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Signals {
    pub add: bool,
    pub mul: bool,
    pub exp: bool,
    pub modulo: bool,
    pub ext: bool,
    pub wcp: bool,
    pub bin: bool,
    pub shf: bool,
    pub mxp: bool,
    pub oob: bool,
    pub stp: bool,
    pub mmu: bool,
    pub trm: bool,
    pub rlp_addr: bool,
    pub hash_info: bool,
    pub rom_lex: bool,
    pub log_info: bool,
    pub log_data: bool,
    pub block_hash: bool,
    pub block_data: bool,
}

/// Outcome of classifying one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub data: OpcodeData,
    pub exceptions: Exceptions,
    pub aborts: Aborts,
    pub signals: Signals,
}

impl Classification {
    pub fn of(
        frame: &dyn MessageFrame,
        world: &dyn WorldView,
        rules: &RuleSet,
    ) -> Classification {
        let data = Opcode::from(frame.current_opcode()).data();
        let exceptions = exceptions::classify(&data, frame, world, rules);
        let aborts = aborts::classify(&data, frame, world, rules, exceptions);
        let signals = Signals::for_instruction(&data, exceptions, aborts, frame, world);
        Classification {
            data,
            exceptions,
            aborts,
            signals,
        }
    }
}

fn size_is_nonzero(frame: &dyn MessageFrame, depth: usize) -> bool {
    !stack_word(frame, depth).is_zero()
}

impl Signals {
    pub fn for_instruction(
        data: &OpcodeData,
        exceptions: Exceptions,
        aborts: Aborts,
        frame: &dyn MessageFrame,
        world: &dyn WorldView,
    ) -> Self {
        let mut signals = Self::default();
        if exceptions.invalid_opcode() || exceptions.stack_exception() {
            return signals;
        }

        let none = exceptions.none();
        let static_ok = !exceptions.static_fault();
        let opcode = data.opcode;

        match data.family {
            InstructionFamily::Add => signals.add = none,
            InstructionFamily::Mul => signals.mul = none,
            // EXP byte size decides the gas cost, so it is proven even on OOGX.
            InstructionFamily::Exp => {
                signals.exp = true;
                signals.mul = none;
            }
            InstructionFamily::Mod => signals.modulo = none,
            InstructionFamily::Ext => signals.ext = none,
            InstructionFamily::Wcp => signals.wcp = none,
            InstructionFamily::Bin => signals.bin = none,
            InstructionFamily::Shf => signals.shf = none,
            InstructionFamily::Keccak => {
                signals.mxp = true;
                let nonempty = none && size_is_nonzero(frame, 1);
                signals.mmu = nonempty;
                signals.hash_info = nonempty;
            }
            InstructionFamily::Batch => match opcode {
                Opcode::BLOCKHASH => signals.block_hash = none,
                _ => signals.block_data = none,
            },
            InstructionFamily::Account => {
                signals.trm = matches!(
                    opcode,
                    Opcode::BALANCE | Opcode::EXTCODESIZE | Opcode::EXTCODEHASH
                );
            }
            InstructionFamily::Copy => Self::copy(&mut signals, opcode, exceptions, frame, world),
            InstructionFamily::StackRam => match opcode {
                Opcode::CALLDATALOAD => {
                    signals.oob = true;
                    signals.mmu = none && !frame.call_data().is_empty();
                }
                _ => {
                    signals.mxp = true;
                    signals.mmu = none;
                }
            },
            InstructionFamily::Storage => {
                signals.oob = opcode == Opcode::SSTORE && static_ok;
            }
            InstructionFamily::Jump => signals.oob = !exceptions.out_of_gas(),
            InstructionFamily::Log => {
                signals.mxp = static_ok;
                signals.log_info = none;
                signals.log_data = none && size_is_nonzero(frame, 1);
                signals.mmu = signals.log_data;
            }
            InstructionFamily::Create => {
                let sized = static_ok && !exceptions.memory_expansion();
                signals.mxp = static_ok;
                signals.stp = sized;
                signals.oob = none;
                let proceeds = none && aborts.none();
                let nonempty = proceeds && size_is_nonzero(frame, 2);
                signals.rlp_addr = proceeds && opcode == Opcode::CREATE;
                signals.hash_info = nonempty && opcode == Opcode::CREATE2;
                signals.mmu = nonempty;
                signals.rom_lex = nonempty;
            }
            InstructionFamily::Call => {
                let sized = static_ok && !exceptions.memory_expansion();
                signals.mxp = static_ok;
                signals.stp = sized;
                signals.oob = sized;
                signals.trm = static_ok;
                if none && aborts.none() {
                    let callee = word_to_address(stack_word(frame, 1));
                    signals.rom_lex = world
                        .account(callee)
                        .is_some_and(|account| account.has_code());
                }
            }
            InstructionFamily::Halt => match opcode {
                Opcode::RETURN => {
                    let deploying = frame.frame_type() == FrameType::ContractCreation;
                    let nonempty = size_is_nonzero(frame, 1);
                    signals.mxp = true;
                    signals.oob = deploying && !exceptions.memory_expansion();
                    signals.mmu = none && nonempty;
                    signals.rom_lex = none && deploying && nonempty;
                    signals.hash_info = none && deploying && nonempty;
                }
                Opcode::REVERT => {
                    signals.mxp = true;
                    signals.mmu = none && size_is_nonzero(frame, 1);
                }
                Opcode::SELFDESTRUCT => signals.trm = static_ok,
                _ => {}
            },
            InstructionFamily::Context
            | InstructionFamily::Transaction
            | InstructionFamily::Transient
            | InstructionFamily::MachineState
            | InstructionFamily::PushPop
            | InstructionFamily::Dup
            | InstructionFamily::Swap
            | InstructionFamily::Invalid => {}
        }

        signals
    }

    fn copy(
        signals: &mut Self,
        opcode: Opcode,
        exceptions: Exceptions,
        frame: &dyn MessageFrame,
        world: &dyn WorldView,
    ) {
        let none = exceptions.none();
        let nonempty = none && size_is_nonzero(frame, if opcode == Opcode::EXTCODECOPY { 3 } else { 2 });
        match opcode {
            Opcode::RETURNDATACOPY => {
                signals.oob = true;
                signals.mxp = !exceptions.return_data_copy_fault();
                signals.mmu = nonempty;
            }
            Opcode::EXTCODECOPY => {
                signals.mxp = true;
                signals.trm = !exceptions.memory_expansion();
                signals.mmu = nonempty;
                let target = word_to_address(stack_word(frame, 0));
                signals.rom_lex = nonempty
                    && world
                        .account(target)
                        .is_some_and(|account| account.has_code());
            }
            _ => {
                signals.mxp = true;
                signals.mmu = nonempty;
            }
        }
    }

    /// Modules to invoke, in invocation order.
    pub fn modules(&self) -> Vec<ModuleId> {
        [
            (self.add, ModuleId::Add),
            (self.mul, ModuleId::Mul),
            (self.exp, ModuleId::Exp),
            (self.modulo, ModuleId::Mod),
            (self.ext, ModuleId::Ext),
            (self.wcp, ModuleId::Wcp),
            (self.bin, ModuleId::Bin),
            (self.shf, ModuleId::Shf),
            (self.mxp, ModuleId::Mxp),
            (self.oob, ModuleId::Oob),
            (self.stp, ModuleId::Stp),
            (self.trm, ModuleId::Trm),
            (self.rlp_addr, ModuleId::RlpAddr),
            (self.hash_info, ModuleId::HashInfo),
            (self.rom_lex, ModuleId::RomLex),
            (self.mmu, ModuleId::Mmu),
            (self.log_info, ModuleId::LogInfo),
            (self.log_data, ModuleId::LogData),
            (self.block_hash, ModuleId::BlockHash),
            (self.block_data, ModuleId::BlockData),
        ]
        .into_iter()
        .filter_map(|(wanted, id)| wanted.then_some(id))
        .collect()
    }

    pub fn none(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use ethereum_types::{Address, U256};

    use super::*;
    use crate::world::{AccountState, FrameState, InMemoryWorld};

    fn frame(code: &[u8], stack: &[u64]) -> FrameState {
        let mut frame = FrameState::message_call(
            0,
            Address::from_low_u64_be(1),
            Address::from_low_u64_be(2),
            Bytes::copy_from_slice(code),
            100_000,
        );
        frame.stack = stack.iter().rev().map(|v| U256::from(*v)).collect();
        frame
    }

    #[test]
    fn call_to_eoa_requests_minimal_modules() {
        // CALL gas=0 to=0xbb value=0 in=(0,0) out=(0,0)
        let frame = frame(&[0xF1], &[0, 0xbb, 0, 0, 0, 0, 0]);
        let world = InMemoryWorld::new().with_account(
            Address::from_low_u64_be(0xbb),
            AccountState {
                nonce: 0,
                balance: U256::from(5),
                code: Bytes::new(),
            },
        );
        let c = Classification::of(&frame, &world, &RuleSet::default());
        assert!(c.exceptions.none());
        assert!(c.aborts.none());
        assert_eq!(
            c.signals.modules(),
            vec![ModuleId::Mxp, ModuleId::Oob, ModuleId::Stp, ModuleId::Trm]
        );
    }

    #[test]
    fn exp_is_proven_even_out_of_gas() {
        let mut frame = frame(&[0x0A], &[2, 0xffff]);
        frame.remaining_gas = 1;
        let c = Classification::of(&frame, &InMemoryWorld::new(), &RuleSet::default());
        assert!(c.exceptions.out_of_gas());
        assert_eq!(c.signals.modules(), vec![ModuleId::Exp]);
    }

    #[test]
    fn stack_faults_invoke_nothing() {
        let frame = frame(&[0x01], &[1]);
        let c = Classification::of(&frame, &InMemoryWorld::new(), &RuleSet::default());
        assert!(c.exceptions.stack_underflow());
        assert!(c.signals.none());
    }
}
