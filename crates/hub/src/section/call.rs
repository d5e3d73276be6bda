//! CALL, CALLCODE, DELEGATECALL and STATICCALL.
//!
//! The section is built in up to four steps: when the instruction is classified, when the
//! callee's context is entered, when control returns to the caller, and when the caller's frame
//! is rolled back.

use ethereum_types::U256;

use crate::account_snapshot::AccountSnapshot;
use crate::call_stack::FrameDescriptor;
use crate::defer::{PendingAction, Phase};
use crate::errors::HubError;
use crate::fragment::{
    CallScenario, ContextFragment, DomSubStamps, MemorySpan, Scenario, ScenarioFragment,
};
use crate::hub::{Hub, Instruction, PendingContext};
use crate::opcodes::Opcode;
use crate::section::{SectionId, SectionKind, memory_span};
use crate::utils::word_to_address;
use crate::world::{FrameType, MessageFrame};

const CALL_EXCEPTION_ROWS: usize = 8;
const CALL_ABORT_ROWS: usize = 9;
const CALL_ROWS: usize = 12;

fn call_scenario(id: SectionId, scenario: Scenario) -> Result<CallScenario, HubError> {
    match scenario {
        Scenario::Call(call) => Ok(call),
        _ => Err(HubError::UnexpectedSection {
            section: id,
            expected: "CALL",
        }),
    }
}

impl Hub {
    pub(crate) fn trace_call(&mut self, ins: &Instruction<'_>) -> Result<SectionId, HubError> {
        let exceptions = ins.exceptions();
        let aborts = ins.aborts();
        let max_rows = if exceptions.any() {
            CALL_EXCEPTION_ROWS
        } else if aborts.any() {
            CALL_ABORT_ROWS
        } else {
            CALL_ROWS
        };
        let id = self.open_instruction(ins, SectionKind::Call, max_rows, true)?;
        self.state.append(id, ScenarioFragment)?;
        let context = self.read_current_context(ins.frame_id)?;
        self.state.append(id, context)?;

        let opcode = ins.opcode();
        let caller_address = ins.frame.recipient();
        let callee_address = word_to_address(ins.stack(1));
        let caller =
            AccountSnapshot::canonical(ins.world, ins.frame, &self.deployments, caller_address);
        let callee =
            AccountSnapshot::canonical(ins.world, ins.frame, &self.deployments, callee_address);

        if exceptions.any() {
            self.set_scenario(id, Scenario::Call(CallScenario::Exception))?;
            // Running out of gas never gets to warming the callee.
            if exceptions.out_of_gas() {
                self.push_account(id, caller.clone(), caller)?;
                self.push_account(id, callee.clone(), callee)?;
            }
            return Ok(id);
        }

        if aborts.any() {
            self.set_scenario(id, Scenario::Call(CallScenario::AbortWontRevert))?;
            self.push_account(id, caller.clone(), caller)?;
            self.push_account(id, callee.clone(), callee.turn_on_warmth())?;
            let empty = ContextFragment::empty_return_data(
                self.call_stack.get(ins.frame_id)?,
                self.caller_context_number(ins.frame_id)?,
            );
            self.state.append(id, empty)?;
            self.defers.schedule(
                Phase::PostExecution,
                Some(ins.frame_id),
                PendingAction::UnlatchStack { section: id },
            );
            self.defers.schedule(
                Phase::PostRollback,
                Some(ins.frame_id),
                PendingAction::CallRollback { section: id },
            );
            return Ok(id);
        }

        let value = if opcode.carries_value() {
            ins.stack(2)
        } else {
            U256::zero()
        };
        // Only CALL moves value between accounts, CALLCODE sends it to the caller itself.
        let transfer = if opcode == Opcode::CALL {
            value
        } else {
            U256::zero()
        };
        let caller_after = caller.debit(transfer)?;
        let callee_before = if callee_address == caller_address {
            caller_after.clone()
        } else {
            callee
        };
        let callee_after = callee_before.credit(transfer)?.turn_on_warmth();
        let callee_has_code = callee_before.has_code();
        self.push_account(id, caller, caller_after)?;

        let scenario = if self.rules.is_precompile(callee_address) {
            self.push_account(id, callee_before, callee_after)?;
            CallScenario::PrcUndefined
        } else if callee_has_code {
            self.push_account_with_code(id, callee_before, callee_after)?;
            CallScenario::SmcUndefined
        } else {
            self.push_account(id, callee_before, callee_after)?;
            let empty = ContextFragment::empty_return_data(
                self.call_stack.get(ins.frame_id)?,
                self.caller_context_number(ins.frame_id)?,
            );
            self.state.append(id, empty)?;
            CallScenario::EoaSuccessWontRevert
        };
        self.set_scenario(id, Scenario::Call(scenario))?;

        let ((args_offset, args_size), (return_offset, return_size)) = if opcode.carries_value() {
            ((3, 4), (5, 6))
        } else {
            ((2, 3), (4, 5))
        };
        let (account_address, child_caller, child_value) = match opcode {
            Opcode::CALLCODE => (caller_address, caller_address, value),
            Opcode::DELEGATECALL => (caller_address, ins.frame.sender(), ins.frame.value()),
            _ => (callee_address, caller_address, value),
        };
        let descriptor = FrameDescriptor {
            context_number: ins
                .stamp
                .checked_add(1)
                .ok_or(HubError::Arithmetic("context number"))?,
            frame_type: FrameType::MessageCall,
            is_static: ins.frame.is_static() || opcode == Opcode::STATICCALL,
            caller_address: child_caller,
            account_address,
            account_deployment_number: self.deployments.deployment_number(account_address),
            byte_code_address: callee_address,
            byte_code_deployment_number: self.deployments.deployment_number(callee_address),
            byte_code_deployment_status: self.deployments.deployment_status(callee_address),
            value: child_value,
            call_data: memory_span(ins.stack(args_offset), ins.stack(args_size)),
            return_at: memory_span(ins.stack(return_offset), ins.stack(return_size)),
        };
        self.pending_context = Some(PendingContext {
            descriptor,
            entry_stamp: ins.stamp,
        });
        self.call_stack.get_mut(ins.frame_id)?.child_spanning_section = Some(id);

        self.defers.schedule(
            Phase::NextContext,
            None,
            PendingAction::CallContextEntry { section: id },
        );
        self.defers.schedule(
            Phase::ReEntry,
            Some(ins.frame_id),
            PendingAction::CallReEntry { section: id },
        );
        self.defers.schedule(
            Phase::PostRollback,
            Some(ins.frame_id),
            PendingAction::CallRollback { section: id },
        );
        Ok(id)
    }

    /// The callee's context exists now; a smart contract callee gets its context initialized.
    pub(crate) fn call_context_entry(&mut self, id: SectionId) -> Result<(), HubError> {
        let child = self.call_stack.current()?;
        let child_id = child.id;
        let initialize = ContextFragment::initialize(child, self.caller_context_number(child_id)?);

        let section = self.state.section_mut(id)?;
        section.child_frame = Some(child_id);
        if call_scenario(id, section.scenario()?)? == CallScenario::SmcUndefined {
            self.state.append(id, initialize)?;
        }
        Ok(())
    }

    /// The callee returned: its success flag is on top of the caller's stack.
    pub(crate) fn call_re_entry(
        &mut self,
        id: SectionId,
        frame: &dyn MessageFrame,
    ) -> Result<(), HubError> {
        let result = frame.stack_item(0).ok_or(HubError::MissingStackItem(0))?;
        let succeeded = !result.is_zero();

        let section = self.state.section_mut(id)?;
        section.unlatch_stack(result)?;
        let scenario = call_scenario(id, section.scenario()?)?;
        let resolved = scenario.resolve(succeeded);
        section.scenario = Some(Scenario::Call(resolved));
        let child = section.child_frame;

        if !scenario.is_undefined() {
            return Ok(());
        }

        if scenario == CallScenario::PrcUndefined {
            let caller_id = self.call_stack.current_id()?;
            let caller_context_number = self.caller_context_number(caller_id)?;
            let caller = self.call_stack.current()?;
            let row = match (succeeded, child) {
                (true, Some(child)) if !frame.return_data().is_empty() => {
                    ContextFragment::provide_return_data(
                        caller,
                        caller_context_number,
                        self.call_stack.get(child)?.context_number(),
                        MemorySpan::new(0, frame.return_data().len() as u64),
                    )
                }
                _ => ContextFragment::empty_return_data(caller, caller_context_number),
            };
            self.state.append(id, row)?;
        }

        if !succeeded {
            let child_revert = match child {
                Some(child) => self.call_stack.get(child)?.revert_stamp,
                None => None,
            }
            .unwrap_or(self.hub_stamp);
            self.undo_balances(id, |hub, n| {
                DomSubStamps::reverts_with_child(hub, child_revert, n)
            })?;
        }
        Ok(())
    }

    pub(crate) fn call_rollback(&mut self, id: SectionId, revert: u32) -> Result<(), HubError> {
        let section = self.state.section_mut(id)?;
        let scenario = section.scenario()?;
        section.scenario = Some(scenario.will_revert());
        self.undo_transitions(id, |hub, n| DomSubStamps::revert_with_current(hub, revert, n))
    }
}
