//! Trace sections: the rows one instruction (or one transaction phase) contributes.
//!
//! Sections are opened with a row budget that is never exceeded. They are filled while the
//! instruction executes and completed by deferred actions; values that depend on the following
//! section are back-filled when the transaction is sealed (see [`crate::state::TxTrace::seal`]).
//!
//! Builders for each instruction family live in the submodules, as `impl Hub` blocks.

mod account;
mod call;
mod context;
mod create;
mod halt;
mod log;
mod stack;
mod storage;
mod tx;

use ethereum_types::{Address, U256};
use serde::Serialize;
use strum::Display;

use crate::account_snapshot::AccountSnapshot;
use crate::call_stack::FrameId;
use crate::defer::{PendingAction, Phase};
use crate::errors::HubError;
use crate::fragment::{
    AccountFragment, ContextFragment, DomSubStamps, Fragment, ImcFragment, MemorySpan, Scenario,
    StackResult, stack::stack_rows,
};
use crate::hub::{Hub, Instruction};
use crate::module::ModuleId;
use crate::opcodes::Opcode;
use crate::signals::{Aborts, Exceptions};
use crate::utils::u256_to_u64_saturating;

/// Position of a section: transaction index in the conflation, then section index in the
/// transaction.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    derive_more::Display,
)]
#[display("{tx}.{index}")]
pub struct SectionId {
    pub tx: usize,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SectionKind {
    TxSkip,
    TxInit,
    TxFinalization,
    StackOnly,
    Exp,
    Keccak,
    StackRam,
    Context,
    Transaction,
    Account,
    Copy,
    Storage,
    Jump,
    Log,
    Halt,
    Call,
    Create,
    EarlyException,
}

impl SectionKind {
    pub fn is_tx_phase(self) -> bool {
        matches!(
            self,
            SectionKind::TxSkip | SectionKind::TxInit | SectionKind::TxFinalization
        )
    }
}

/// Values shared by every row of a section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommonValues {
    pub hub_stamp: u32,
    #[serde(skip)]
    pub frame: Option<FrameId>,
    pub context_number: u32,
    /// Context number of the following section, back-filled on seal.
    pub context_number_new: u32,
    pub caller_context_number: u32,
    pub depth: usize,
    pub pc: usize,
    pub code_address: Address,
    pub code_deployment_number: u32,
    pub code_deployment_status: bool,
    pub gas_actual: u64,
    pub gas_cost: u64,
    pub gas_next: u64,
    /// Refund counter before the section, back-filled on seal.
    pub refund: i64,
    pub refund_new: i64,
    pub refund_delta: i64,
    /// Refund counter the engine reported after the instruction, if any.
    #[serde(skip)]
    pub observed_refund: Option<i64>,
    pub log_stamp: u32,
    pub exceptions: Exceptions,
    pub aborts: Aborts,
    pub self_reverts: bool,
    pub gets_reverted: bool,
    pub revert_stamp: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceSection {
    pub id: SectionId,
    pub kind: SectionKind,
    pub common: CommonValues,
    pub scenario: Option<Scenario>,
    pub fragments: Vec<Fragment>,
    pub max_rows: usize,
    /// Modules invoked in `pre_opcode`, told about the outcome in `post_execution`.
    pub modules: Vec<ModuleId>,
    /// Frame spawned by the section's CALL or CREATE, if any.
    pub child_frame: Option<FrameId>,
    /// Whether the section emits a log that survives.
    pub emits_log: bool,
    pub sealed: bool,
}

impl TraceSection {
    pub fn new(id: SectionId, kind: SectionKind, common: CommonValues, max_rows: usize) -> Self {
        Self {
            id,
            kind,
            common,
            scenario: None,
            fragments: Vec::with_capacity(max_rows),
            max_rows,
            modules: Vec::new(),
            child_frame: None,
            emits_log: false,
            sealed: false,
        }
    }

    pub fn row_count(&self) -> usize {
        self.fragments.len()
    }

    /// Appends `fragment`, returning its index within the section.
    pub fn add_fragment(&mut self, fragment: impl Into<Fragment>) -> Result<usize, HubError> {
        if self.sealed {
            return Err(HubError::AlreadySealed("section"));
        }
        if self.fragments.len() >= self.max_rows {
            return Err(HubError::RowBudgetExceeded {
                section: self.id,
                budget: self.max_rows,
            });
        }
        self.fragments.push(fragment.into());
        Ok(self.fragments.len() - 1)
    }

    pub fn fragment(&self, index: usize) -> Result<&Fragment, HubError> {
        self.fragments
            .get(index)
            .ok_or(HubError::UnknownSection(self.id))
    }

    pub fn has_latched_stack(&self) -> bool {
        self.fragments.iter().any(|fragment| {
            matches!(fragment, Fragment::Stack(stack) if stack.result == StackResult::Latched)
        })
    }

    /// Fills the latched result slot with `value`.
    pub fn unlatch_stack(&mut self, value: U256) -> Result<(), HubError> {
        let mut slots = self.fragments.iter_mut().filter_map(|fragment| match fragment {
            Fragment::Stack(stack) if stack.result != StackResult::None => Some(stack),
            _ => None,
        });
        let slot = slots.next().ok_or(HubError::StackNotLatched(self.id))?;
        if slot.result != StackResult::Latched {
            return Err(HubError::StackUnlatchedTwice(self.id));
        }
        slot.result = StackResult::Unlatched(value);
        Ok(())
    }

    pub fn scenario(&self) -> Result<Scenario, HubError> {
        self.scenario.ok_or(HubError::UnexpectedSection {
            section: self.id,
            expected: "scenario",
        })
    }

    /// Every account the section touches, in order of first appearance, as
    /// `(state before the first row, state after the last row)`.
    pub fn account_transitions(&self) -> Vec<(AccountSnapshot, AccountSnapshot)> {
        let mut transitions: Vec<(AccountSnapshot, AccountSnapshot)> = Vec::new();
        for account in self.fragments.iter().filter_map(Fragment::as_account) {
            match transitions
                .iter_mut()
                .find(|(first, _)| first.address == account.before.address)
            {
                Some((_, last)) => *last = account.after.clone(),
                None => transitions.push((account.before.clone(), account.after.clone())),
            }
        }
        transitions
    }
}

/// Index the next fragment of `section` will get, as used by dom/sub stamps.
fn next_row(section: &TraceSection) -> Result<u32, HubError> {
    u32::try_from(section.row_count()).map_err(|_| HubError::Arithmetic("row index"))
}

impl Hub {
    fn instruction_common(&self, ins: &Instruction<'_>) -> Result<CommonValues, HubError> {
        let frame = self.call_stack.get(ins.frame_id)?;
        let descriptor = &frame.descriptor;
        let exceptions = ins.exceptions();
        let gas_actual = ins.frame.remaining_gas();
        let gas_cost = if exceptions.invalid_opcode() || exceptions.stack_exception() {
            0
        } else {
            self.rules
                .gas_projector()
                .upfront_cost(ins.opcode(), ins.frame, ins.world)
        };
        let gas_next = if exceptions.any() {
            0
        } else {
            gas_actual.saturating_sub(gas_cost)
        };

        Ok(CommonValues {
            hub_stamp: ins.stamp,
            frame: Some(ins.frame_id),
            context_number: frame.context_number(),
            caller_context_number: self.caller_context_number(ins.frame_id)?,
            depth: frame.depth,
            pc: ins.frame.pc(),
            code_address: descriptor.byte_code_address,
            code_deployment_number: descriptor.byte_code_deployment_number,
            code_deployment_status: descriptor.byte_code_deployment_status,
            gas_actual,
            gas_cost,
            gas_next,
            exceptions,
            aborts: ins.aborts(),
            ..Default::default()
        })
    }

    /// Opens the section of `ins` and appends its stack rows. Satellite stamps go to an IMC row
    /// when `with_imc`, to the first stack row otherwise.
    pub(crate) fn open_instruction(
        &mut self,
        ins: &Instruction<'_>,
        kind: SectionKind,
        max_rows: usize,
        with_imc: bool,
    ) -> Result<SectionId, HubError> {
        let common = self.instruction_common(ins)?;
        let static_gas = common.gas_cost;
        let id = self.state.open_section(kind, common, max_rows)?;
        self.state.section_mut(id)?.modules = ins.classification.signals.modules();

        let mut rows = stack_rows(
            ins.classification.data,
            ins.frame,
            ins.exceptions(),
            ins.aborts(),
            static_gas,
        );
        if !with_imc {
            if let Some(first) = rows.first_mut() {
                first.module_calls = ins.module_calls.clone();
            }
        }
        let latched = rows
            .iter()
            .any(|row| row.result == StackResult::Latched);
        for row in rows {
            self.state.append(id, row)?;
        }
        if with_imc {
            self.state
                .append(id, ImcFragment::new(ins.module_calls.clone()))?;
        }

        // CALL and CREATE unlatch on their own schedule.
        let opcode = ins.opcode();
        if latched && !opcode.is_call() && !opcode.is_create() {
            self.defers.schedule(
                Phase::PostExecution,
                Some(ins.frame_id),
                PendingAction::UnlatchStack { section: id },
            );
        }
        Ok(id)
    }

    /// Rows every exceptional instruction ends with, and the revert of its frame.
    pub(crate) fn finish_instruction(
        &mut self,
        ins: &Instruction<'_>,
        id: SectionId,
    ) -> Result<(), HubError> {
        let exceptions = ins.exceptions();
        if exceptions.any() {
            if let Some(row) = self.return_data_row(ins.frame_id, None)? {
                self.state.append(id, row)?;
            }
        }
        if exceptions.any() || ins.opcode() == Opcode::REVERT {
            self.call_stack.revert(ins.stamp)?;
        }
        Ok(())
    }

    pub(crate) fn read_current_context(&self, frame: FrameId) -> Result<ContextFragment, HubError> {
        Ok(ContextFragment::read_current(
            self.call_stack.get(frame)?,
            self.caller_context_number(frame)?,
        ))
    }

    /// Sets the return data of the parent of `frame` to `span` of `frame`'s memory, or to
    /// nothing. `None` for the root.
    pub(crate) fn return_data_row(
        &self,
        frame: FrameId,
        span: Option<MemorySpan>,
    ) -> Result<Option<ContextFragment>, HubError> {
        let returner = self.call_stack.get(frame)?;
        let Some(parent) = returner.parent else {
            return Ok(None);
        };
        let caller_context_number = self.caller_context_number(parent)?;
        let parent = self.call_stack.get(parent)?;
        Ok(Some(match span.filter(|span| !span.is_empty()) {
            Some(span) => ContextFragment::provide_return_data(
                parent,
                caller_context_number,
                returner.context_number(),
                span,
            ),
            None => ContextFragment::empty_return_data(parent, caller_context_number),
        }))
    }

    pub(crate) fn set_scenario(&mut self, id: SectionId, scenario: Scenario) -> Result<(), HubError> {
        self.state.section_mut(id)?.scenario = Some(scenario);
        Ok(())
    }

    /// Appends a speculative account row of `section`.
    pub(crate) fn push_account(
        &mut self,
        id: SectionId,
        before: AccountSnapshot,
        after: AccountSnapshot,
    ) -> Result<usize, HubError> {
        let section = self.state.section(id)?;
        let dom_sub = DomSubStamps::standard(section.common.hub_stamp, next_row(section)?);
        self.state
            .append(id, AccountFragment::new(before, after, dom_sub))
    }

    /// Like [`Hub::push_account`], for an account whose code is about to run.
    pub(crate) fn push_account_with_code(
        &mut self,
        id: SectionId,
        before: AccountSnapshot,
        after: AccountSnapshot,
    ) -> Result<usize, HubError> {
        let section = self.state.section(id)?;
        let dom_sub = DomSubStamps::standard(section.common.hub_stamp, next_row(section)?);
        self.state.append(
            id,
            AccountFragment::new(before, after, dom_sub).with_code_fragment_index(),
        )
    }

    /// Appends, for every account whose state the section changed, a row that takes it back to
    /// its state before the section. `dom_sub` maps `(hub stamp, row index)` to the row's stamps.
    pub(crate) fn undo_transitions(
        &mut self,
        id: SectionId,
        dom_sub: impl Fn(u32, u32) -> DomSubStamps,
    ) -> Result<(), HubError> {
        let transitions = self.state.section(id)?.account_transitions();
        for (first, last) in transitions {
            let restored = first.with_deployment_info(&self.deployments);
            if restored == last {
                continue;
            }
            let section = self.state.section(id)?;
            let stamps = dom_sub(section.common.hub_stamp, next_row(section)?);
            self.state
                .append(id, AccountFragment::new(last, restored, stamps))?;
        }
        Ok(())
    }

    /// Appends, for every account whose balance the section changed, a row restoring that
    /// balance. Everything else, warmth included, stays.
    pub(crate) fn undo_balances(
        &mut self,
        id: SectionId,
        dom_sub: impl Fn(u32, u32) -> DomSubStamps,
    ) -> Result<(), HubError> {
        let transitions = self.state.section(id)?.account_transitions();
        for (first, last) in transitions {
            if first.balance == last.balance {
                continue;
            }
            let restored = last.with_balance(first.balance);
            let section = self.state.section(id)?;
            let stamps = dom_sub(section.common.hub_stamp, next_row(section)?);
            self.state
                .append(id, AccountFragment::new(last, restored, stamps))?;
        }
        Ok(())
    }

    /// Undoes the account row at `fragment` of `section`, its frame reverting at `revert`.
    pub(crate) fn undo_account(
        &mut self,
        id: SectionId,
        fragment: usize,
        revert: u32,
    ) -> Result<(), HubError> {
        let section = self.state.section(id)?;
        let account = section
            .fragment(fragment)?
            .as_account()
            .ok_or(HubError::UnexpectedSection {
                section: id,
                expected: "account",
            })?;
        let dom_sub =
            DomSubStamps::revert_with_current(section.common.hub_stamp, revert, next_row(section)?);
        let undo = account.undo(dom_sub);
        self.state.append(id, undo)?;
        Ok(())
    }
}

/// `[offset, offset + size)` from two stack words.
pub(crate) fn memory_span(offset: U256, size: U256) -> MemorySpan {
    MemorySpan::new(u256_to_u64_saturating(offset), u256_to_u64_saturating(size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::{ScenarioFragment, StackFragment};

    fn section(max_rows: usize) -> TraceSection {
        TraceSection::new(
            SectionId { tx: 0, index: 3 },
            SectionKind::StackOnly,
            CommonValues::default(),
            max_rows,
        )
    }

    fn latched() -> StackFragment {
        StackFragment {
            instruction: Opcode::ADD.data(),
            line: 1,
            lines: 1,
            height: 2,
            height_new: 1,
            items: Vec::new(),
            result: StackResult::Latched,
            exceptions: Exceptions::NONE,
            aborts: Aborts::default(),
            module_calls: Vec::new(),
            static_gas: 3,
        }
    }

    #[test]
    fn budget_is_enforced() -> Result<(), HubError> {
        let mut section = section(1);
        section.add_fragment(ScenarioFragment)?;
        assert_eq!(
            section.add_fragment(ScenarioFragment),
            Err(HubError::RowBudgetExceeded {
                section: SectionId { tx: 0, index: 3 },
                budget: 1,
            })
        );
        assert_eq!(section.row_count(), 1);
        Ok(())
    }

    #[test]
    fn stack_unlatches_exactly_once() -> Result<(), HubError> {
        let mut section = section(2);
        section.add_fragment(latched())?;
        assert!(section.has_latched_stack());

        section.unlatch_stack(U256::from(7))?;
        assert!(!section.has_latched_stack());
        assert_eq!(
            section.unlatch_stack(U256::from(8)),
            Err(HubError::StackUnlatchedTwice(section.id))
        );
        Ok(())
    }

    #[test]
    fn unlatching_without_slot_fails() {
        let mut section = section(1);
        assert_eq!(
            section.unlatch_stack(U256::zero()),
            Err(HubError::StackNotLatched(section.id))
        );
    }
}
