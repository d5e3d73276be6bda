//! Sections of instructions that only touch the stack, memory, or nothing the Hub tracks.

use crate::errors::HubError;
use crate::hub::{Hub, Instruction};
use crate::opcodes::Opcode;
use crate::section::{SectionId, SectionKind};
use crate::world::MessageFrame;

impl Hub {
    pub(crate) fn trace_stack_only(&mut self, ins: &Instruction<'_>) -> Result<SectionId, HubError> {
        self.open_instruction(ins, SectionKind::StackOnly, ins.lines() + 1, false)
    }

    /// EXP, KECCAK256 and jumps: stack rows and the satellite calls.
    pub(crate) fn trace_with_imc(
        &mut self,
        ins: &Instruction<'_>,
        kind: SectionKind,
    ) -> Result<SectionId, HubError> {
        self.open_instruction(ins, kind, ins.lines() + 2, true)
    }

    /// Invalid opcodes and stack faults. Nothing of the instruction is known beyond its byte.
    pub(crate) fn trace_early_exception(
        &mut self,
        ins: &Instruction<'_>,
    ) -> Result<SectionId, HubError> {
        self.open_instruction(ins, SectionKind::EarlyException, ins.lines() + 1, false)
    }

    pub(crate) fn trace_stack_ram(&mut self, ins: &Instruction<'_>) -> Result<SectionId, HubError> {
        let id = self.open_instruction(ins, SectionKind::StackRam, ins.lines() + 3, true)?;
        if ins.opcode() == Opcode::CALLDATALOAD {
            let context = self.read_current_context(ins.frame_id)?;
            self.state.append(id, context)?;
        }
        Ok(id)
    }

    /// Fills the latched result of `section` with the top of `frame`'s stack.
    pub(crate) fn unlatch_from_stack(
        &mut self,
        id: SectionId,
        frame: &dyn MessageFrame,
    ) -> Result<(), HubError> {
        let value = frame.stack_item(0).ok_or(HubError::MissingStackItem(0))?;
        self.state.section_mut(id)?.unlatch_stack(value)
    }
}
