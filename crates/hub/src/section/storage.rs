use crate::defer::{PendingAction, Phase};
use crate::errors::HubError;
use crate::fragment::{DomSubStamps, StorageFragment};
use crate::hub::{Hub, Instruction};
use crate::opcodes::Opcode;
use crate::section::{SectionId, SectionKind, next_row};

impl Hub {
    /// SLOAD and SSTORE.
    ///
    /// A storage row is only appended if the slot is actually accessed: an SSTORE in a static
    /// context or without the stipend never gets there, running out of gas does.
    pub(crate) fn trace_storage(&mut self, ins: &Instruction<'_>) -> Result<SectionId, HubError> {
        let id = self.open_instruction(ins, SectionKind::Storage, ins.lines() + 4, false)?;
        let context = self.read_current_context(ins.frame_id)?;
        self.state.append(id, context)?;

        let exceptions = ins.exceptions();
        if exceptions.any() && !exceptions.out_of_gas() {
            return Ok(id);
        }

        let is_sstore = ins.opcode() == Opcode::SSTORE;
        let address = ins.frame.recipient();
        let key = ins.stack(0);
        let value_current = ins.world.storage(address, key);
        let value_next = if is_sstore && exceptions.none() {
            ins.stack(1)
        } else {
            value_current
        };

        let section = self.state.section(id)?;
        let fragment = StorageFragment {
            address,
            deployment_number: self.deployments.deployment_number(address),
            key,
            value_original: ins.world.original_storage(address, key),
            value_current,
            value_next,
            warm_before: ins.frame.is_storage_warm(address, key),
            warm_after: true,
            dom_sub: DomSubStamps::standard(ins.stamp, next_row(section)?),
            is_sstore,
        };
        let index = self.state.append(id, fragment)?;

        // Also due when out of gas: the slot stays warm until the frame's rollback.
        self.defers.schedule(
            Phase::PostRollback,
            Some(ins.frame_id),
            PendingAction::UndoStorage {
                section: id,
                fragment: index,
            },
        );
        Ok(id)
    }

    pub(crate) fn undo_storage(
        &mut self,
        id: SectionId,
        fragment: usize,
        revert: u32,
    ) -> Result<(), HubError> {
        let section = self.state.section(id)?;
        let storage = section
            .fragment(fragment)?
            .as_storage()
            .ok_or(HubError::UnexpectedSection {
                section: id,
                expected: "storage",
            })?;
        let dom_sub =
            DomSubStamps::revert_with_current(section.common.hub_stamp, revert, next_row(section)?);
        let undo = storage.undo(dom_sub);
        self.state.append(id, undo)?;
        Ok(())
    }
}
