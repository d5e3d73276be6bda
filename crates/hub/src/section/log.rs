use crate::defer::{PendingAction, Phase};
use crate::errors::HubError;
use crate::hub::{Hub, Instruction};
use crate::section::{SectionId, SectionKind};

impl Hub {
    /// LOG0 to LOG4. The log counts towards the log stamp unless its frame reverts.
    pub(crate) fn trace_log(&mut self, ins: &Instruction<'_>) -> Result<SectionId, HubError> {
        let id = self.open_instruction(ins, SectionKind::Log, ins.lines() + 3, true)?;
        let context = self.read_current_context(ins.frame_id)?;
        self.state.append(id, context)?;

        if ins.exceptions().none() {
            self.state.section_mut(id)?.emits_log = true;
            self.defers.schedule(
                Phase::PostRollback,
                Some(ins.frame_id),
                PendingAction::LogRollback { section: id },
            );
        }
        Ok(id)
    }

    pub(crate) fn log_rollback(&mut self, id: SectionId) -> Result<(), HubError> {
        self.state.section_mut(id)?.emits_log = false;
        Ok(())
    }
}
