//! The Hub: turns the lifecycle events of a host engine into trace sections.
//!
//! Every instruction is classified once in `pre_opcode`, gets a fresh hub stamp and a section
//! built by the builder of its family (see [`crate::section`]). Whatever cannot be known yet is
//! scheduled in the [`DeferRegistry`] and resolved at the checkpoint it depends on.

use ethereum_types::{Address, U256};
use rustc_hash::{FxHashMap, FxHashSet};
use strum::IntoStaticStr;
use tracing::{debug, trace, warn};

use crate::account_snapshot::AccountSnapshot;
use crate::call_stack::{CallStack, FrameDescriptor, FrameId};
use crate::columns::{ColumnHeader, TraceRow, column_headers};
use crate::constants::MAX_REFUND_QUOTIENT;
use crate::defer::{DeferRegistry, PendingAction, Phase, Scheduled};
use crate::deployment_info::DeploymentInfo;
use crate::errors::HubError;
use crate::module::{ModuleCall, ModuleId, Satellites};
use crate::opcodes::{InstructionFamily, Opcode};
use crate::rules::RuleSet;
use crate::section::{SectionId, SectionKind};
use crate::signals::{Aborts, Classification, Exceptions};
use crate::state::{State, TxMetadata};
use crate::tracer::Tracer;
use crate::utils::{calculate_create_address, stack_word};
use crate::world::{
    BlockHeader, MessageFrame, OperationOutcome, Transaction, TxOutcome, WorldView,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum Lifecycle {
    Idle,
    Conflation,
    Block,
    Transaction,
}

/// Snapshots a TX_SKIP section is completed from, taken before the transaction ran.
#[derive(Debug, Clone)]
pub(crate) struct SkipSnapshots {
    pub sender: AccountSnapshot,
    pub recipient: AccountSnapshot,
    pub coinbase: AccountSnapshot,
}

/// Bookkeeping that lives for one transaction.
#[derive(Debug, Default)]
pub(crate) struct TxContext {
    pub skip: Option<SkipSnapshots>,
    /// Accounts deployed by the transaction.
    pub created: FxHashSet<Address>,
    /// Accounts marked for deletion, with the SELFDESTRUCT section that marked them first.
    pub selfdestructs: FxHashMap<Address, SectionId>,
}

/// A context the Hub announced and expects the engine to enter next.
#[derive(Debug, Clone)]
pub(crate) struct PendingContext {
    pub descriptor: FrameDescriptor,
    pub entry_stamp: u32,
}

/// The instruction about to execute, as seen by the section builders.
pub(crate) struct Instruction<'a> {
    pub world: &'a dyn WorldView,
    pub frame: &'a dyn MessageFrame,
    pub frame_id: FrameId,
    pub stamp: u32,
    pub classification: Classification,
    pub module_calls: Vec<ModuleCall>,
}

impl Instruction<'_> {
    pub fn opcode(&self) -> Opcode {
        self.classification.data.opcode
    }

    pub fn exceptions(&self) -> Exceptions {
        self.classification.exceptions
    }

    pub fn aborts(&self) -> Aborts {
        self.classification.aborts
    }

    /// Stack rows the instruction occupies.
    pub fn lines(&self) -> usize {
        self.classification.data.stack_lines()
    }

    /// Stack item `depth` positions below the top, zero when missing.
    pub fn stack(&self, depth: usize) -> U256 {
        stack_word(self.frame, depth)
    }
}

#[derive(Debug)]
pub struct Hub {
    pub(crate) rules: RuleSet,
    pub(crate) satellites: Satellites,
    pub(crate) state: State,
    pub(crate) deployments: DeploymentInfo,
    pub(crate) call_stack: CallStack,
    pub(crate) defers: DeferRegistry,
    pub(crate) hub_stamp: u32,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) block: BlockHeader,
    pub(crate) tx: TxContext,
    pub(crate) pending_instruction: Option<SectionId>,
    pub(crate) pending_context: Option<PendingContext>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(RuleSet::default())
    }
}

impl Hub {
    pub fn new(rules: RuleSet) -> Self {
        let satellites = rules.build_satellites();
        Self {
            rules,
            satellites,
            state: State::new(),
            deployments: DeploymentInfo::new(),
            call_stack: CallStack::new(),
            defers: DeferRegistry::new(),
            hub_stamp: 0,
            lifecycle: Lifecycle::Idle,
            block: BlockHeader::default(),
            tx: TxContext::default(),
            pending_instruction: None,
            pending_context: None,
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn deployments(&self) -> &DeploymentInfo {
        &self.deployments
    }

    pub fn call_stack(&self) -> &CallStack {
        &self.call_stack
    }

    /// Rows of the Hub's own trace.
    pub fn line_count(&self) -> usize {
        self.state.line_count()
    }

    /// Actions still queued for `phase`.
    pub fn pending(&self, phase: Phase) -> usize {
        self.defers.pending(phase)
    }

    /// Rows of every plugged satellite module.
    pub fn module_line_counts(&self) -> Vec<(ModuleId, usize)> {
        self.satellites.line_counts()
    }

    pub fn column_headers(&self) -> Vec<ColumnHeader> {
        column_headers()
    }

    /// Materializes the rows of the last conflation. Only valid once it ended.
    pub fn commit<F>(&self, sink: F) -> Result<usize, HubError>
    where
        F: FnMut(TraceRow),
    {
        if self.lifecycle != Lifecycle::Idle {
            return Err(HubError::NotSealed("conflation"));
        }
        self.state.commit(sink)
    }

    fn expect_lifecycle(&self, event: &'static str, expected: Lifecycle) -> Result<(), HubError> {
        if self.lifecycle != expected {
            return Err(HubError::UnexpectedLifecycle {
                event,
                during: self.lifecycle.into(),
            });
        }
        Ok(())
    }

    pub(crate) fn next_stamp(&mut self) -> Result<u32, HubError> {
        self.hub_stamp = self
            .hub_stamp
            .checked_add(1)
            .ok_or(HubError::Arithmetic("hub stamp"))?;
        Ok(self.hub_stamp)
    }

    /// Context number of the parent of `frame`, 0 for the root.
    pub(crate) fn caller_context_number(&self, frame: FrameId) -> Result<u32, HubError> {
        match self.call_stack.get(frame)?.parent {
            Some(parent) => Ok(self.call_stack.get(parent)?.context_number()),
            None => Ok(0),
        }
    }

    fn trace_instruction(&mut self, ins: &Instruction<'_>) -> Result<SectionId, HubError> {
        use InstructionFamily as F;

        let exceptions = ins.exceptions();
        let id = if exceptions.invalid_opcode() || exceptions.stack_exception() {
            self.trace_early_exception(ins)?
        } else {
            match ins.classification.data.family {
                F::Add
                | F::Mul
                | F::Mod
                | F::Ext
                | F::Wcp
                | F::Bin
                | F::Shf
                | F::Batch
                | F::Transient
                | F::MachineState
                | F::PushPop
                | F::Dup
                | F::Swap => self.trace_stack_only(ins)?,
                F::Exp => self.trace_with_imc(ins, SectionKind::Exp)?,
                F::Keccak => self.trace_with_imc(ins, SectionKind::Keccak)?,
                F::Jump => self.trace_with_imc(ins, SectionKind::Jump)?,
                F::StackRam => self.trace_stack_ram(ins)?,
                F::Context => self.trace_context(ins)?,
                F::Transaction => self.trace_transaction_reading(ins)?,
                F::Account => self.trace_account(ins)?,
                F::Copy => self.trace_copy(ins)?,
                F::Storage => self.trace_storage(ins)?,
                F::Log => self.trace_log(ins)?,
                F::Halt => self.trace_halt(ins)?,
                F::Call => self.trace_call(ins)?,
                F::Create => self.trace_create(ins)?,
                F::Invalid => self.trace_early_exception(ins)?,
            }
        };
        self.finish_instruction(ins, id)?;
        Ok(id)
    }

    /// Back-fills the revert flags of every section of the transaction from its frame.
    fn fill_revert_data(&mut self) -> Result<(), HubError> {
        let call_stack = &self.call_stack;
        for section in self.state.current_tx_mut()?.sections_mut() {
            if let Some(frame) = section.common.frame {
                let frame = call_stack.get(frame)?;
                section.common.self_reverts = frame.self_reverts;
                section.common.gets_reverted = frame.gets_reverted;
                section.common.revert_stamp = frame.revert_stamp.unwrap_or_default();
            }
        }
        Ok(())
    }

    /// Gas refund counter the engine reported last in the transaction.
    fn final_refund_counter(&self) -> Result<u64, HubError> {
        let refund = self
            .state
            .current_tx()?
            .sections()
            .iter()
            .rev()
            .find_map(|section| section.common.observed_refund)
            .unwrap_or_default();
        u64::try_from(refund).map_err(|_| HubError::Arithmetic("refund counter"))
    }

    fn revert_stamp_of(&self, frame: Option<FrameId>) -> Result<u32, HubError> {
        let frame = frame.ok_or(HubError::UnexpectedLifecycle {
            event: "rollback",
            during: "action without frame",
        })?;
        let frame = self.call_stack.get(frame)?;
        frame.revert_stamp.ok_or(HubError::UnexpectedLifecycle {
            event: "rollback",
            during: "frame that never reverted",
        })
    }

    fn resolve_all(
        &mut self,
        due: Vec<Scheduled>,
        world: &dyn WorldView,
        frame: Option<&dyn MessageFrame>,
    ) -> Result<(), HubError> {
        for scheduled in due {
            self.resolve(scheduled, world, frame)?;
        }
        Ok(())
    }

    fn resolve(
        &mut self,
        scheduled: Scheduled,
        world: &dyn WorldView,
        frame: Option<&dyn MessageFrame>,
    ) -> Result<(), HubError> {
        trace!(action = ?scheduled.action, phase = %scheduled.phase, "Resolving deferred action");
        let require_frame = || {
            frame.ok_or(HubError::UnexpectedLifecycle {
                event: "deferred action",
                during: "checkpoint without frame",
            })
        };

        match scheduled.action {
            PendingAction::CallContextEntry { section } => self.call_context_entry(section),
            PendingAction::CallReEntry { section } => self.call_re_entry(section, require_frame()?),
            PendingAction::CallRollback { section } => {
                let revert = self.revert_stamp_of(scheduled.frame)?;
                self.call_rollback(section, revert)
            }
            PendingAction::CreateContextEntry { section } => self.create_context_entry(section),
            PendingAction::CreateReEntry { section } => {
                self.create_re_entry(section, require_frame()?)
            }
            PendingAction::CreateRollback { section } => {
                let revert = self.revert_stamp_of(scheduled.frame)?;
                self.create_rollback(section, revert)
            }
            PendingAction::UnlatchStack { section } => {
                self.unlatch_from_stack(section, require_frame()?)
            }
            PendingAction::UndoAccount { section, fragment } => {
                let revert = self.revert_stamp_of(scheduled.frame)?;
                self.undo_account(section, fragment, revert)
            }
            PendingAction::UndoStorage { section, fragment } => {
                let revert = self.revert_stamp_of(scheduled.frame)?;
                self.undo_storage(section, fragment, revert)
            }
            PendingAction::InitRollback { section } => {
                let revert = self.revert_stamp_of(scheduled.frame)?;
                self.init_rollback(section, revert)
            }
            PendingAction::LogRollback { section } => self.log_rollback(section),
            PendingAction::ReturnRollback { section } => {
                let revert = self.revert_stamp_of(scheduled.frame)?;
                self.return_rollback(section, revert)
            }
            PendingAction::SelfdestructRollback { section } => {
                let revert = self.revert_stamp_of(scheduled.frame)?;
                self.selfdestruct_rollback(section, revert)
            }
            PendingAction::SelfdestructEndTransaction { section, address } => {
                self.selfdestruct_end_transaction(section, address, world)
            }
            PendingAction::TxSkipCompletion { section } => self.tx_skip_completion(section),
            PendingAction::SealTransaction { tx } => self.state.seal_tx(tx),
            PendingAction::AssignCodeFragmentIndices => self.state.assign_code_fragment_indices(),
        }
    }
}

impl Tracer for Hub {
    fn start_conflation(&mut self, batch_size: usize) -> Result<(), HubError> {
        self.expect_lifecycle("start_conflation", Lifecycle::Idle)?;
        self.state = State::new();
        self.deployments = DeploymentInfo::new();
        self.defers.clear();
        self.satellites = self.rules.build_satellites();
        self.hub_stamp = 0;
        self.defers
            .schedule(Phase::PostConflation, None, PendingAction::AssignCodeFragmentIndices);
        self.lifecycle = Lifecycle::Conflation;
        debug!(batch_size, fork = %self.rules.fork, "Starting conflation");
        Ok(())
    }

    fn start_block(&mut self, header: &BlockHeader) -> Result<(), HubError> {
        self.expect_lifecycle("start_block", Lifecycle::Conflation)?;
        self.block = header.clone();
        self.lifecycle = Lifecycle::Block;
        debug!(number = header.number, "Starting block");
        Ok(())
    }

    fn start_transaction(
        &mut self,
        world: &dyn WorldView,
        tx: &Transaction,
    ) -> Result<(), HubError> {
        self.expect_lifecycle("start_transaction", Lifecycle::Block)?;
        self.call_stack = CallStack::new();
        self.tx = TxContext::default();
        self.pending_instruction = None;
        self.pending_context = None;

        let effective_recipient = match tx.to {
            Some(to) => to,
            None => calculate_create_address(tx.sender, tx.nonce),
        };
        let requires_evm_execution = match tx.to {
            Some(to) => world.account(to).is_some_and(|account| account.has_code()),
            None => !tx.data.is_empty(),
        };
        let intrinsic_cost = self.rules.gas_projector().intrinsic_cost(tx);
        let metadata = TxMetadata {
            block_number: self.block.number,
            sender: tx.sender,
            effective_recipient,
            coinbase: self.block.coinbase,
            is_deployment: tx.is_deployment(),
            requires_evm_execution,
            value: tx.value,
            gas_limit: tx.gas_limit,
            gas_price: tx.gas_price,
            priority_fee_per_gas: tx.priority_fee_per_gas,
            intrinsic_cost,
            initially_available_gas: tx.gas_limit.saturating_sub(intrinsic_cost),
            ..Default::default()
        };
        let index = self.state.start_tx(metadata);
        self.lifecycle = Lifecycle::Transaction;
        debug!(
            tx = index + 1,
            sender = ?tx.sender,
            recipient = ?effective_recipient,
            requires_evm_execution,
            "Starting transaction"
        );

        if requires_evm_execution {
            self.trace_tx_init(world, tx)?;
        } else {
            self.trace_tx_skip(world, tx)?;
        }
        self.defers.schedule(
            Phase::PostTransaction,
            None,
            PendingAction::SealTransaction { tx: index },
        );
        Ok(())
    }

    fn context_enter(
        &mut self,
        world: &dyn WorldView,
        frame: &dyn MessageFrame,
    ) -> Result<(), HubError> {
        self.expect_lifecycle("context_enter", Lifecycle::Transaction)?;
        let pending = self
            .pending_context
            .take()
            .ok_or(HubError::UnexpectedLifecycle {
                event: "context_enter",
                during: "no announced context",
            })?;
        let context_number = pending.descriptor.context_number;
        let id = self.call_stack.enter(pending.descriptor, pending.entry_stamp)?;
        let depth = self.call_stack.get(id)?.depth;
        if frame.depth() != depth {
            warn!(
                engine = frame.depth(),
                hub = depth,
                "Engine and call stack disagree on the depth of the entered context"
            );
        }
        debug!(frame = %id, context_number, depth, "Entered context");

        let due = self.defers.take(Phase::NextContext);
        self.resolve_all(due, world, Some(frame))
    }

    fn pre_opcode(&mut self, world: &dyn WorldView, frame: &dyn MessageFrame) -> Result<(), HubError> {
        self.expect_lifecycle("pre_opcode", Lifecycle::Transaction)?;
        if self.pending_instruction.is_some() {
            return Err(HubError::UnexpectedLifecycle {
                event: "pre_opcode",
                during: "unfinished instruction",
            });
        }

        let classification = Classification::of(frame, world, &self.rules);
        trace!(
            pc = frame.pc(),
            opcode = ?classification.data.opcode,
            exception = classification.exceptions.name(),
            abort = classification.aborts.any(),
            "Classified instruction"
        );
        let module_calls = self
            .satellites
            .trace_pre_opcode(&classification.signals.modules(), frame);
        let instruction = Instruction {
            world,
            frame,
            frame_id: self.call_stack.current_id()?,
            stamp: self.next_stamp()?,
            classification,
            module_calls,
        };
        let id = self.trace_instruction(&instruction)?;
        self.pending_instruction = Some(id);
        Ok(())
    }

    fn post_execution(
        &mut self,
        world: &dyn WorldView,
        frame: &dyn MessageFrame,
        outcome: OperationOutcome,
    ) -> Result<(), HubError> {
        self.expect_lifecycle("post_execution", Lifecycle::Transaction)?;
        let id = self
            .pending_instruction
            .take()
            .ok_or(HubError::UnexpectedLifecycle {
                event: "post_execution",
                during: "no pending instruction",
            })?;

        let section = self.state.section_mut(id)?;
        if section.common.exceptions.none() {
            section.common.gas_next = frame.remaining_gas();
            section.common.observed_refund = Some(frame.gas_refund());
        }
        if outcome.halted_exceptionally != section.common.exceptions.any() {
            warn!(
                section = %id,
                exception = section.common.exceptions.name(),
                "Engine and classifier disagree on exceptional halting"
            );
        }
        let modules = section.modules.clone();
        self.satellites.trace_post_opcode(&modules, frame);

        let due = self.defers.take(Phase::PostExecution);
        self.resolve_all(due, world, Some(frame))
    }

    fn context_re_enter(
        &mut self,
        world: &dyn WorldView,
        frame: &dyn MessageFrame,
    ) -> Result<(), HubError> {
        self.expect_lifecycle("context_re_enter", Lifecycle::Transaction)?;
        let current = self.call_stack.current_id()?;
        let due = self.defers.take_for_frame(Phase::ReEntry, current);
        trace!(frame = %current, actions = due.len(), "Re-entered context");
        self.resolve_all(due, world, Some(frame))
    }

    fn context_exit(
        &mut self,
        world: &dyn WorldView,
        frame: &dyn MessageFrame,
    ) -> Result<(), HubError> {
        self.expect_lifecycle("context_exit", Lifecycle::Transaction)?;
        // Exceptional halts may skip `post_execution`.
        self.pending_instruction = None;

        let id = self.call_stack.current_id()?;
        let exiting = self.call_stack.get(id)?;
        let self_reverts = exiting.self_reverts;
        let deployed = exiting
            .is_deployment()
            .then_some(exiting.descriptor.account_address);

        if let Some(address) = deployed {
            self.deployments.mark_as_not_under_deployment(address);
        }
        if self_reverts {
            let order = self.call_stack.rollback_order(id)?;
            let due = self.defers.take_rollbacks(&order);
            debug!(frame = %id, frames = order.len(), actions = due.len(), "Rolling back context");
            self.resolve_all(due, world, Some(frame))?;
        }
        self.call_stack.exit()?;
        debug!(frame = %id, self_reverts, "Exited context");
        Ok(())
    }

    fn end_transaction(
        &mut self,
        world: &dyn WorldView,
        _tx: &Transaction,
        outcome: &TxOutcome,
    ) -> Result<(), HubError> {
        self.expect_lifecycle("end_transaction", Lifecycle::Transaction)?;
        if !self.call_stack.is_empty() {
            return Err(HubError::UnexpectedLifecycle {
                event: "end_transaction",
                during: "open context",
            });
        }
        if self.pending_context.is_some() {
            return Err(HubError::UnexpectedLifecycle {
                event: "end_transaction",
                during: "announced context never entered",
            });
        }

        let refund_counter = self.final_refund_counter()?;
        let metadata = &mut self.state.current_tx_mut()?.metadata;
        metadata.gas_used = outcome.gas_used;
        metadata.leftover_gas = metadata.gas_limit.saturating_sub(outcome.gas_used);
        metadata.refund_counter = refund_counter;
        metadata.refund_effective =
            refund_counter.min(outcome.gas_used / (MAX_REFUND_QUOTIENT - 1));
        metadata.status = Some(outcome.success);
        let requires_evm_execution = metadata.requires_evm_execution;

        self.fill_revert_data()?;
        if requires_evm_execution {
            self.trace_tx_finalization(world)?;
        }

        let due = self.defers.take(Phase::EndTransaction);
        self.resolve_all(due, world, None)?;
        self.defers.discard_rollbacks();
        let due = self.defers.take(Phase::PostTransaction);
        self.resolve_all(due, world, None)?;

        self.lifecycle = Lifecycle::Block;
        let tx = self.state.current_tx()?;
        debug!(
            tx = tx.metadata.absolute_number,
            success = outcome.success,
            lines = tx.line_count(),
            "Finished transaction"
        );
        Ok(())
    }

    fn end_block(&mut self, header: &BlockHeader, body: &[Transaction]) -> Result<(), HubError> {
        self.expect_lifecycle("end_block", Lifecycle::Block)?;
        self.lifecycle = Lifecycle::Conflation;
        debug!(number = header.number, txs = body.len(), "Finished block");
        Ok(())
    }

    fn end_conflation(&mut self, world: &dyn WorldView) -> Result<(), HubError> {
        self.expect_lifecycle("end_conflation", Lifecycle::Conflation)?;
        let due = self.defers.take(Phase::PostConflation);
        self.resolve_all(due, world, None)?;
        self.lifecycle = Lifecycle::Idle;
        debug!(
            txs = self.state.txs().len(),
            lines = self.state.line_count(),
            code_fragments = self.state.code_fragment_index().len(),
            "Finished conflation"
        );
        Ok(())
    }
}
