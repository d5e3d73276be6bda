//! CREATE and CREATE2.

use crate::account_snapshot::AccountSnapshot;
use crate::call_stack::FrameDescriptor;
use crate::defer::{PendingAction, Phase};
use crate::errors::HubError;
use crate::fragment::{
    AccountFragment, ContextFragment, CreateScenario, DomSubStamps, MemorySpan, Scenario,
    ScenarioFragment,
};
use crate::hub::{Hub, Instruction, PendingContext};
use crate::opcodes::Opcode;
use crate::section::{SectionId, SectionKind, next_row};
use crate::utils::{
    calculate_create_address, calculate_create2_address, u256_to_usize_saturating,
};
use crate::world::{FrameType, MessageFrame};

const CREATE_EXCEPTION_ROWS: usize = 6;
const CREATE_ABORT_ROWS: usize = 7;
const CREATE_ROWS: usize = 11;

fn create_scenario(id: SectionId, scenario: Scenario) -> Result<CreateScenario, HubError> {
    match scenario {
        Scenario::Create(create) => Ok(create),
        _ => Err(HubError::UnexpectedSection {
            section: id,
            expected: "CREATE",
        }),
    }
}

impl Hub {
    pub(crate) fn trace_create(&mut self, ins: &Instruction<'_>) -> Result<SectionId, HubError> {
        let exceptions = ins.exceptions();
        let aborts = ins.aborts();
        let max_rows = if exceptions.any() {
            CREATE_EXCEPTION_ROWS
        } else if aborts.any() {
            CREATE_ABORT_ROWS
        } else {
            CREATE_ROWS
        };
        let id = self.open_instruction(ins, SectionKind::Create, max_rows, true)?;
        self.state.append(id, ScenarioFragment)?;
        let context = self.read_current_context(ins.frame_id)?;
        self.state.append(id, context)?;

        if exceptions.any() {
            return self
                .set_scenario(id, Scenario::Create(CreateScenario::Exception))
                .map(|()| id);
        }

        let creator_address = ins.frame.recipient();
        let creator =
            AccountSnapshot::canonical(ins.world, ins.frame, &self.deployments, creator_address);
        let empty_return_data = ContextFragment::empty_return_data(
            self.call_stack.get(ins.frame_id)?,
            self.caller_context_number(ins.frame_id)?,
        );

        if aborts.any() {
            self.set_scenario(id, Scenario::Create(CreateScenario::Abort))?;
            self.push_account(id, creator.clone(), creator)?;
            self.state.append(id, empty_return_data)?;
            self.defers.schedule(
                Phase::PostExecution,
                Some(ins.frame_id),
                PendingAction::UnlatchStack { section: id },
            );
            return Ok(id);
        }

        let value = ins.stack(0);
        let init_code = ins.frame.read_memory(
            u256_to_usize_saturating(ins.stack(1)),
            u256_to_usize_saturating(ins.stack(2)),
        );
        let createe_address = match ins.opcode() {
            Opcode::CREATE2 => {
                calculate_create2_address(creator_address, &init_code, ins.stack(3))
            }
            _ => calculate_create_address(creator_address, creator.nonce),
        };
        let createe =
            AccountSnapshot::canonical(ins.world, ins.frame, &self.deployments, createe_address);

        let collides = ins
            .world
            .account(createe_address)
            .is_some_and(|account| account.create_would_collide());
        if collides {
            let creator_after = creator.raise_nonce()?;
            self.push_account(id, creator, creator_after)?;
            self.push_account(id, createe.clone(), createe.turn_on_warmth())?;
            self.state.append(id, empty_return_data)?;
            self.set_scenario(
                id,
                Scenario::Create(CreateScenario::FailureConditionWontRevert),
            )?;
            self.defers.schedule(
                Phase::PostExecution,
                Some(ins.frame_id),
                PendingAction::UnlatchStack { section: id },
            );
            self.defers.schedule(
                Phase::PostRollback,
                Some(ins.frame_id),
                PendingAction::CreateRollback { section: id },
            );
            return Ok(id);
        }

        let creator_after = creator.raise_nonce()?.debit(value)?;
        self.push_account(id, creator, creator_after)?;

        let scenario = if init_code.is_empty() {
            self.deployments
                .new_deployment_sans_execution_at(createe_address);
            let createe_after = createe
                .credit(value)?
                .with_nonce(1)
                .turn_on_warmth()
                .with_deployment_info(&self.deployments);
            self.push_account(id, createe, createe_after)?;
            self.state.append(id, empty_return_data)?;
            CreateScenario::EmptyInitCodeWontRevert
        } else {
            self.deployments
                .new_deployment_with_execution_at(createe_address);
            let createe_after = createe
                .credit(value)?
                .with_nonce(1)
                .turn_on_warmth()
                .with_byte_code(init_code)
                .with_deployment_info(&self.deployments);
            self.push_account_with_code(id, createe, createe_after)?;
            CreateScenario::NonEmptyInitCodeUndefined
        };
        self.set_scenario(id, Scenario::Create(scenario))?;
        self.tx.created.insert(createe_address);

        let descriptor = FrameDescriptor {
            context_number: ins
                .stamp
                .checked_add(1)
                .ok_or(HubError::Arithmetic("context number"))?,
            frame_type: FrameType::ContractCreation,
            is_static: false,
            caller_address: creator_address,
            account_address: createe_address,
            account_deployment_number: self.deployments.deployment_number(createe_address),
            byte_code_address: createe_address,
            byte_code_deployment_number: self.deployments.deployment_number(createe_address),
            byte_code_deployment_status: self.deployments.deployment_status(createe_address),
            value,
            call_data: MemorySpan::default(),
            return_at: MemorySpan::default(),
        };
        self.pending_context = Some(PendingContext {
            descriptor,
            entry_stamp: ins.stamp,
        });
        self.call_stack.get_mut(ins.frame_id)?.child_spanning_section = Some(id);

        self.defers.schedule(
            Phase::NextContext,
            None,
            PendingAction::CreateContextEntry { section: id },
        );
        self.defers.schedule(
            Phase::ReEntry,
            Some(ins.frame_id),
            PendingAction::CreateReEntry { section: id },
        );
        self.defers.schedule(
            Phase::PostRollback,
            Some(ins.frame_id),
            PendingAction::CreateRollback { section: id },
        );
        Ok(id)
    }

    pub(crate) fn create_context_entry(&mut self, id: SectionId) -> Result<(), HubError> {
        let child = self.call_stack.current_id()?;
        self.state.section_mut(id)?.child_frame = Some(child);
        Ok(())
    }

    /// The deployment finished: the new address, or zero on failure, is on top of the stack.
    ///
    /// A failed deployment gives the value back to the creator, whose nonce stays raised, and
    /// leaves the createe warm but otherwise untouched.
    pub(crate) fn create_re_entry(
        &mut self,
        id: SectionId,
        frame: &dyn MessageFrame,
    ) -> Result<(), HubError> {
        let result = frame.stack_item(0).ok_or(HubError::MissingStackItem(0))?;
        let succeeded = !result.is_zero();

        let section = self.state.section_mut(id)?;
        section.unlatch_stack(result)?;
        let scenario = create_scenario(id, section.scenario()?)?;
        section.scenario = Some(Scenario::Create(scenario.resolve(succeeded)));
        let child = section.child_frame;
        if !scenario.is_undefined() || succeeded {
            return Ok(());
        }

        let child_revert = match child {
            Some(child) => self.call_stack.get(child)?.revert_stamp,
            None => None,
        }
        .unwrap_or(self.hub_stamp);
        let section = self.state.section(id)?;
        let hub_stamp = section.common.hub_stamp;
        let transitions = section.account_transitions();
        let mut transitions = transitions.into_iter();
        let (Some((creator_first, creator_last)), Some((createe_first, createe_last))) =
            (transitions.next(), transitions.next())
        else {
            return Err(HubError::UnexpectedSection {
                section: id,
                expected: "creator and createe",
            });
        };

        let creator_restored = creator_last.with_balance(creator_first.balance);
        let createe_restored = createe_first
            .with_deployment_info(&self.deployments)
            .turn_on_warmth();
        for (last, restored) in [
            (creator_last, creator_restored),
            (createe_last, createe_restored),
        ] {
            let n = next_row(self.state.section(id)?)?;
            let dom_sub = DomSubStamps::reverts_with_child(hub_stamp, child_revert, n);
            self.state
                .append(id, AccountFragment::new(last, restored, dom_sub))?;
        }
        Ok(())
    }

    pub(crate) fn create_rollback(&mut self, id: SectionId, revert: u32) -> Result<(), HubError> {
        let section = self.state.section_mut(id)?;
        let scenario = section.scenario()?;
        section.scenario = Some(scenario.will_revert());
        self.undo_transitions(id, |hub, n| DomSubStamps::revert_with_current(hub, revert, n))
    }
}
