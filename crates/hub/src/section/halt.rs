//! STOP, RETURN, REVERT and SELFDESTRUCT.
//!
//! Besides its own rows, a halting instruction sets the return data of the caller's context.

use ethereum_types::{Address, U256};

use crate::account_snapshot::AccountSnapshot;
use crate::defer::{PendingAction, Phase};
use crate::errors::HubError;
use crate::fragment::{
    AccountFragment, DomSubStamps, Fragment, ReturnScenario, Scenario, ScenarioFragment,
    SelfdestructScenario,
};
use crate::hub::{Hub, Instruction};
use crate::opcodes::Opcode;
use crate::section::{SectionId, SectionKind, memory_span};
use crate::utils::{u256_to_usize_saturating, word_to_address};
use crate::world::{FrameType, WorldView};

impl Hub {
    pub(crate) fn trace_halt(&mut self, ins: &Instruction<'_>) -> Result<SectionId, HubError> {
        match ins.opcode() {
            Opcode::RETURN => self.trace_return(ins),
            Opcode::REVERT => self.trace_revert(ins),
            Opcode::SELFDESTRUCT => self.trace_selfdestruct(ins),
            _ => self.trace_stop(ins),
        }
    }

    fn trace_stop(&mut self, ins: &Instruction<'_>) -> Result<SectionId, HubError> {
        let id = self.open_instruction(ins, SectionKind::Halt, ins.lines() + 1, false)?;
        if let Some(row) = self.return_data_row(ins.frame_id, None)? {
            self.state.append(id, row)?;
        }
        Ok(id)
    }

    fn trace_revert(&mut self, ins: &Instruction<'_>) -> Result<SectionId, HubError> {
        let id = self.open_instruction(ins, SectionKind::Halt, ins.lines() + 3, true)?;
        let context = self.read_current_context(ins.frame_id)?;
        self.state.append(id, context)?;

        if ins.exceptions().none() {
            let span = memory_span(ins.stack(0), ins.stack(1));
            if let Some(row) = self.return_data_row(ins.frame_id, Some(span))? {
                self.state.append(id, row)?;
            }
        }
        Ok(id)
    }

    fn trace_return(&mut self, ins: &Instruction<'_>) -> Result<SectionId, HubError> {
        let id = self.open_instruction(ins, SectionKind::Halt, ins.lines() + 6, true)?;
        self.state.append(id, ScenarioFragment)?;
        let context = self.read_current_context(ins.frame_id)?;
        self.state.append(id, context)?;

        if ins.exceptions().any() {
            return self
                .set_scenario(id, Scenario::Return(ReturnScenario::Exception))
                .map(|()| id);
        }

        let span = memory_span(ins.stack(0), ins.stack(1));
        let empty = span.is_empty();
        if ins.frame.frame_type() != FrameType::ContractCreation {
            let scenario = if empty {
                ReturnScenario::FromMessageCallEmpty
            } else {
                ReturnScenario::FromMessageCallNonempty
            };
            self.set_scenario(id, Scenario::Return(scenario))?;
            if let Some(row) = self.return_data_row(ins.frame_id, Some(span))? {
                self.state.append(id, row)?;
            }
            return Ok(id);
        }

        // Code deposit: the deployed account now holds the returned bytes.
        let address = ins.frame.recipient();
        let code = ins.frame.read_memory(
            u256_to_usize_saturating(ins.stack(0)),
            u256_to_usize_saturating(ins.stack(1)),
        );
        let before = AccountSnapshot::canonical(ins.world, ins.frame, &self.deployments, address)
            .with_byte_code(ins.frame.code().clone());
        let after = before
            .with_byte_code(code)
            .with_deployment(self.deployments.deployment_number(address), false);
        if empty {
            self.push_account(id, before, after)?;
        } else {
            self.push_account_with_code(id, before, after)?;
        }

        let scenario = if empty {
            ReturnScenario::FromDeploymentEmptyWontRevert
        } else {
            ReturnScenario::FromDeploymentNonemptyWontRevert
        };
        self.set_scenario(id, Scenario::Return(scenario))?;
        self.defers.schedule(
            Phase::PostRollback,
            Some(ins.frame_id),
            PendingAction::ReturnRollback { section: id },
        );
        // Deployments hand no return data to their creator.
        if let Some(row) = self.return_data_row(ins.frame_id, None)? {
            self.state.append(id, row)?;
        }
        Ok(id)
    }

    pub(crate) fn return_rollback(&mut self, id: SectionId, revert: u32) -> Result<(), HubError> {
        let section = self.state.section_mut(id)?;
        let scenario = section.scenario()?;
        section.scenario = Some(scenario.will_revert());
        let deposit = section
            .fragments
            .iter()
            .position(|fragment| matches!(fragment, Fragment::Account(_)))
            .ok_or(HubError::UnexpectedSection {
                section: id,
                expected: "code deposit",
            })?;
        self.undo_account(id, deposit, revert)
    }

    fn trace_selfdestruct(&mut self, ins: &Instruction<'_>) -> Result<SectionId, HubError> {
        let id = self.open_instruction(ins, SectionKind::Halt, ins.lines() + 8, false)?;
        self.state.append(id, ScenarioFragment)?;
        let context = self.read_current_context(ins.frame_id)?;
        self.state.append(id, context)?;

        let exceptions = ins.exceptions();
        let address = ins.frame.recipient();
        let beneficiary = word_to_address(ins.stack(0));
        let me = AccountSnapshot::canonical(ins.world, ins.frame, &self.deployments, address);

        if exceptions.any() {
            self.set_scenario(id, Scenario::Selfdestruct(SelfdestructScenario::Exception))?;
            if exceptions.out_of_gas() {
                let heir = AccountSnapshot::canonical(
                    ins.world,
                    ins.frame,
                    &self.deployments,
                    beneficiary,
                );
                self.push_account(id, me.clone(), me)?;
                self.push_account(id, heir.clone(), heir)?;
            }
            return Ok(id);
        }

        // Sending the balance to oneself only burns it for accounts created in the transaction.
        if beneficiary == address {
            let after = if self.tx.created.contains(&address) {
                me.with_balance(U256::zero())
            } else {
                me.clone()
            };
            self.push_account(id, me, after)?;
        } else {
            let heir =
                AccountSnapshot::canonical(ins.world, ins.frame, &self.deployments, beneficiary);
            let heir_after = heir.credit(me.balance)?.turn_on_warmth();
            self.push_account(id, me.clone(), me.with_balance(U256::zero()))?;
            self.push_account(id, heir, heir_after)?;
        }

        let scenario = if self.tx.selfdestructs.contains_key(&address) {
            SelfdestructScenario::WontRevertAlreadyMarked
        } else {
            self.tx.selfdestructs.insert(address, id);
            self.defers.schedule(
                Phase::EndTransaction,
                None,
                PendingAction::SelfdestructEndTransaction {
                    section: id,
                    address,
                },
            );
            SelfdestructScenario::WontRevertNotYetMarked
        };
        self.set_scenario(id, Scenario::Selfdestruct(scenario))?;
        self.defers.schedule(
            Phase::PostRollback,
            Some(ins.frame_id),
            PendingAction::SelfdestructRollback { section: id },
        );
        if let Some(row) = self.return_data_row(ins.frame_id, None)? {
            self.state.append(id, row)?;
        }
        Ok(id)
    }

    pub(crate) fn selfdestruct_rollback(
        &mut self,
        id: SectionId,
        revert: u32,
    ) -> Result<(), HubError> {
        let section = self.state.section_mut(id)?;
        let scenario = section.scenario()?;
        section.scenario = Some(scenario.will_revert());
        let address = section
            .fragments
            .iter()
            .find_map(Fragment::as_account)
            .map(|account| account.before.address);

        if let Some(address) = address {
            if self.tx.selfdestructs.get(&address) == Some(&id) {
                self.tx.selfdestructs.remove(&address);
            }
        }
        self.undo_transitions(id, |hub, n| DomSubStamps::revert_with_current(hub, revert, n))
    }

    /// Wipes an account created in this transaction whose SELFDESTRUCT survived.
    pub(crate) fn selfdestruct_end_transaction(
        &mut self,
        id: SectionId,
        address: Address,
        world: &dyn WorldView,
    ) -> Result<(), HubError> {
        let section = self.state.section(id)?;
        let survived = section.scenario()?
            == Scenario::Selfdestruct(SelfdestructScenario::WontRevertNotYetMarked);
        if !survived || !self.tx.created.contains(&address) {
            return Ok(());
        }

        let last_seen = section
            .account_transitions()
            .into_iter()
            .find(|(first, _)| first.address == address)
            .map(|(_, last)| last);
        let before = match (world.account(address), last_seen) {
            (Some(_), _) | (None, None) => {
                AccountSnapshot::from_world(world, &self.deployments, address, true)
            }
            (None, Some(last)) => last,
        };
        let dom_sub = DomSubStamps::selfdestruct(section.common.hub_stamp, self.hub_stamp);
        self.deployments.freshen_after_selfdestruct(address);
        let after = AccountSnapshot::empty(address, true, &self.deployments);
        self.state
            .append(id, AccountFragment::new(before, after, dom_sub))?;
        Ok(())
    }
}
