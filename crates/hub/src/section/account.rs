//! Instructions that read one account: BALANCE, EXTCODESIZE, EXTCODEHASH, SELFBALANCE and
//! CODESIZE, plus the copy family, of which EXTCODECOPY reads an account too.

use ethereum_types::Address;

use crate::account_snapshot::AccountSnapshot;
use crate::defer::{PendingAction, Phase};
use crate::errors::HubError;
use crate::hub::{Hub, Instruction};
use crate::opcodes::Opcode;
use crate::section::{SectionId, SectionKind};
use crate::utils::word_to_address;

impl Hub {
    pub(crate) fn trace_account(&mut self, ins: &Instruction<'_>) -> Result<SectionId, HubError> {
        let id = self.open_instruction(ins, SectionKind::Account, ins.lines() + 3, false)?;
        let target = match ins.opcode() {
            Opcode::SELFBALANCE => ins.frame.recipient(),
            Opcode::CODESIZE => ins.frame.code_address(),
            _ => word_to_address(ins.stack(0)),
        };
        self.touch_account(ins, id, target)?;
        Ok(id)
    }

    /// CALLDATACOPY, CODECOPY, RETURNDATACOPY, MCOPY and EXTCODECOPY.
    pub(crate) fn trace_copy(&mut self, ins: &Instruction<'_>) -> Result<SectionId, HubError> {
        let id = self.open_instruction(ins, SectionKind::Copy, ins.lines() + 5, true)?;
        let context = self.read_current_context(ins.frame_id)?;
        self.state.append(id, context)?;
        if ins.opcode() == Opcode::EXTCODECOPY {
            self.touch_account(ins, id, word_to_address(ins.stack(0)))?;
        }
        Ok(id)
    }

    /// Appends the row of an account the instruction reads, which warms it, and schedules its
    /// undoing. Running out of gas still reads the account; no other exception gets that far.
    fn touch_account(
        &mut self,
        ins: &Instruction<'_>,
        id: SectionId,
        address: Address,
    ) -> Result<(), HubError> {
        let exceptions = ins.exceptions();
        if exceptions.any() && !exceptions.out_of_gas() {
            return Ok(());
        }

        let before = AccountSnapshot::canonical(ins.world, ins.frame, &self.deployments, address);
        let after = before.turn_on_warmth();
        let fragment = self.push_account(id, before, after)?;
        // Also due when out of gas: the frame then reverts at this very stamp.
        self.defers.schedule(
            Phase::PostRollback,
            Some(ins.frame_id),
            PendingAction::UndoAccount {
                section: id,
                fragment,
            },
        );
        Ok(())
    }
}
