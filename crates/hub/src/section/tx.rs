//! Transaction phase sections: TX_SKIP for transactions that run no code, TX_INIT and TX_FINL
//! around the execution of those that do.
//!
//! These sections have no context of their own (context number 0) and carry no stack rows.

use ethereum_types::U256;

use crate::account_snapshot::AccountSnapshot;
use crate::call_stack::FrameDescriptor;
use crate::defer::{PendingAction, Phase};
use crate::errors::HubError;
use crate::fragment::{
    AccountFragment, ContextFragment, ContextPurpose, DomSubStamps, Fragment, MemorySpan,
    TransactionFragment, TxPhase,
};
use crate::hub::{Hub, PendingContext, SkipSnapshots};
use crate::section::{CommonValues, SectionId, SectionKind, next_row};
use crate::world::{FrameType, Transaction, WorldView};

const TX_SKIP_ROWS: usize = 4;
const TX_INIT_ROWS: usize = 6;
const TX_FINL_ROWS: usize = 3;

impl Hub {
    fn open_tx_phase(&mut self, kind: SectionKind, max_rows: usize) -> Result<SectionId, HubError> {
        let stamp = self.next_stamp()?;
        let frame = (kind == SectionKind::TxInit).then(|| self.call_stack.future_id());
        let common = CommonValues {
            hub_stamp: stamp,
            frame,
            ..Default::default()
        };
        self.state.open_section(kind, common, max_rows)
    }

    /// Charges the sender the gas limit up front, transfers the value and announces the root
    /// context.
    pub(crate) fn trace_tx_init(
        &mut self,
        world: &dyn WorldView,
        tx: &Transaction,
    ) -> Result<(), HubError> {
        let id = self.open_tx_phase(SectionKind::TxInit, TX_INIT_ROWS)?;
        let stamp = self.state.section(id)?.common.hub_stamp;
        self.state
            .append(id, TransactionFragment::new(TxPhase::Init))?;

        let upfront = U256::from(tx.gas_limit)
            .checked_mul(tx.gas_price)
            .and_then(|gas| gas.checked_add(tx.value))
            .ok_or(HubError::Arithmetic("upfront cost"))?;
        let sender = AccountSnapshot::from_world(world, &self.deployments, tx.sender, false);
        let sender_after = sender.debit(upfront)?.raise_nonce()?.turn_on_warmth();

        let recipient_address = self.state.current_tx()?.metadata.effective_recipient;
        let recipient = if recipient_address == tx.sender {
            sender_after.clone()
        } else {
            AccountSnapshot::from_world(world, &self.deployments, recipient_address, false)
        };
        let mut recipient_after = recipient.credit(tx.value)?.turn_on_warmth();
        if tx.is_deployment() {
            self.deployments
                .new_deployment_with_execution_at(recipient_address);
            self.tx.created.insert(recipient_address);
            recipient_after = recipient_after
                .with_nonce(1)
                .with_byte_code(tx.data.clone())
                .with_deployment_info(&self.deployments);
        }
        self.push_account(id, sender, sender_after)?;
        self.push_account_with_code(id, recipient, recipient_after)?;

        let (frame_type, call_data) = if tx.is_deployment() {
            (FrameType::ContractCreation, MemorySpan::default())
        } else {
            (
                FrameType::MessageCall,
                MemorySpan::new(0, tx.data.len() as u64),
            )
        };
        let descriptor = FrameDescriptor {
            context_number: stamp
                .checked_add(1)
                .ok_or(HubError::Arithmetic("context number"))?,
            frame_type,
            is_static: false,
            caller_address: tx.sender,
            account_address: recipient_address,
            account_deployment_number: self.deployments.deployment_number(recipient_address),
            byte_code_address: recipient_address,
            byte_code_deployment_number: self.deployments.deployment_number(recipient_address),
            byte_code_deployment_status: self.deployments.deployment_status(recipient_address),
            value: tx.value,
            call_data,
            return_at: MemorySpan::default(),
        };
        self.state.append(
            id,
            ContextFragment::from_descriptor(ContextPurpose::Initialize, &descriptor, 0, 0),
        )?;
        self.pending_context = Some(PendingContext {
            descriptor,
            entry_stamp: stamp,
        });

        let root = self.call_stack.future_id();
        self.defers.schedule(
            Phase::PostRollback,
            Some(root),
            PendingAction::InitRollback { section: id },
        );
        Ok(())
    }

    /// The root context reverted: the value goes back to the sender. Gas stays paid.
    pub(crate) fn init_rollback(&mut self, id: SectionId, revert: u32) -> Result<(), HubError> {
        let metadata = &self.state.current_tx()?.metadata;
        let (value, is_deployment) = (metadata.value, metadata.is_deployment);
        let section = self.state.section(id)?;
        let hub_stamp = section.common.hub_stamp;
        let accounts: Vec<AccountFragment> = section
            .fragments
            .iter()
            .filter_map(Fragment::as_account)
            .cloned()
            .collect();
        let [sender, recipient] = accounts.as_slice() else {
            return Err(HubError::UnexpectedSection {
                section: id,
                expected: "TX_INIT",
            });
        };
        if sender.after.address == recipient.after.address {
            return Ok(());
        }

        let sender_restored = sender.after.credit(value)?;
        let recipient_restored = if is_deployment {
            recipient
                .before
                .with_deployment_info(&self.deployments)
                .turn_on_warmth()
        } else {
            recipient.after.debit(value)?
        };
        for (last, restored) in [
            (sender.after.clone(), sender_restored),
            (recipient.after.clone(), recipient_restored),
        ] {
            let n = next_row(self.state.section(id)?)?;
            let dom_sub = DomSubStamps::revert_with_current(hub_stamp, revert, n);
            self.state
                .append(id, AccountFragment::new(last, restored, dom_sub))?;
        }
        Ok(())
    }

    /// Opens the TX_SKIP section. Its account rows depend on the gas the transaction used and
    /// are only appended once it ended.
    pub(crate) fn trace_tx_skip(
        &mut self,
        world: &dyn WorldView,
        tx: &Transaction,
    ) -> Result<(), HubError> {
        let id = self.open_tx_phase(SectionKind::TxSkip, TX_SKIP_ROWS)?;
        self.state
            .append(id, TransactionFragment::new(TxPhase::Skip))?;

        let recipient = self.state.current_tx()?.metadata.effective_recipient;
        self.tx.skip = Some(SkipSnapshots {
            sender: AccountSnapshot::from_world(world, &self.deployments, tx.sender, false),
            recipient: AccountSnapshot::from_world(world, &self.deployments, recipient, false),
            coinbase: AccountSnapshot::from_world(
                world,
                &self.deployments,
                self.block.coinbase,
                false,
            ),
        });
        self.defers.schedule(
            Phase::EndTransaction,
            None,
            PendingAction::TxSkipCompletion { section: id },
        );
        Ok(())
    }

    pub(crate) fn tx_skip_completion(&mut self, id: SectionId) -> Result<(), HubError> {
        let SkipSnapshots {
            sender,
            recipient,
            coinbase,
        } = self.tx.skip.take().ok_or(HubError::UnexpectedSection {
            section: id,
            expected: "TX_SKIP",
        })?;
        let metadata = self.state.current_tx()?.metadata.clone();

        let charged = metadata
            .gas_price
            .checked_mul(U256::from(metadata.gas_used))
            .and_then(|gas| gas.checked_add(metadata.value))
            .ok_or(HubError::Arithmetic("transaction cost"))?;
        let sender_after = sender.debit(charged)?.raise_nonce()?;

        let recipient_before = if recipient.address == sender.address {
            sender_after.clone()
        } else {
            recipient
        };
        let mut recipient_after = recipient_before.credit(metadata.value)?;
        if metadata.is_deployment {
            self.deployments
                .new_deployment_sans_execution_at(recipient_before.address);
            self.tx.created.insert(recipient_before.address);
            recipient_after = recipient_after
                .with_nonce(1)
                .with_deployment_info(&self.deployments);
        }

        let coinbase_before = if coinbase.address == recipient_before.address {
            recipient_after.clone()
        } else if coinbase.address == sender.address {
            sender_after.clone()
        } else {
            coinbase
        };
        let coinbase_after = coinbase_before.credit(metadata.coinbase_reward())?;

        self.push_account(id, sender, sender_after)?;
        self.push_account(id, recipient_before, recipient_after)?;
        self.push_account(id, coinbase_before, coinbase_after)?;
        Ok(())
    }

    /// Refunds the sender its unused gas and pays the coinbase its priority fees.
    pub(crate) fn trace_tx_finalization(&mut self, world: &dyn WorldView) -> Result<(), HubError> {
        let id = self.open_tx_phase(SectionKind::TxFinalization, TX_FINL_ROWS)?;
        let stamp = self.state.section(id)?.common.hub_stamp;
        let metadata = self.state.current_tx()?.metadata.clone();

        let sender = AccountSnapshot::from_world(world, &self.deployments, metadata.sender, true);
        let sender_after = sender.credit(metadata.sender_refund())?;
        let coinbase = if metadata.coinbase == metadata.sender {
            sender_after.clone()
        } else {
            AccountSnapshot::from_world(world, &self.deployments, metadata.coinbase, true)
        };
        let coinbase_after = coinbase.credit(metadata.coinbase_reward())?;

        for (before, after) in [(sender, sender_after), (coinbase, coinbase_after)] {
            let n = next_row(self.state.section(id)?)?;
            self.state.append(
                id,
                AccountFragment::new(before, after, DomSubStamps::finalization(stamp, n)),
            )?;
        }
        self.state
            .append(id, TransactionFragment::new(TxPhase::Finalization))?;
        Ok(())
    }
}
