use crate::errors::HubError;
use crate::fragment::{TransactionFragment, TxPhase};
use crate::hub::{Hub, Instruction};
use crate::section::{SectionId, SectionKind};

impl Hub {
    /// ADDRESS, CALLER, CALLVALUE, CALLDATASIZE and RETURNDATASIZE read the current context.
    pub(crate) fn trace_context(&mut self, ins: &Instruction<'_>) -> Result<SectionId, HubError> {
        let id = self.open_instruction(ins, SectionKind::Context, ins.lines() + 2, false)?;
        if ins.exceptions().none() {
            let context = self.read_current_context(ins.frame_id)?;
            self.state.append(id, context)?;
        }
        Ok(id)
    }

    /// ORIGIN and GASPRICE read the transaction.
    pub(crate) fn trace_transaction_reading(
        &mut self,
        ins: &Instruction<'_>,
    ) -> Result<SectionId, HubError> {
        let id = self.open_instruction(ins, SectionKind::Transaction, ins.lines() + 2, false)?;
        if ins.exceptions().none() {
            self.state
                .append(id, TransactionFragment::new(TxPhase::Execution))?;
        }
        Ok(id)
    }
}
