//! Lifecycle hooks a host execution engine drives the tracer with.
//!
//! Hooks must be called in this order, nesting respected:
//!
//! ```text
//! start_conflation
//!   start_block
//!     start_transaction
//!       context_enter
//!         pre_opcode / post_execution      (once per instruction)
//!         context_enter ... context_exit   (child contexts)
//!         context_re_enter                 (after every child)
//!       context_exit
//!     end_transaction
//!   end_block
//! end_conflation
//! ```
//!
//! A transaction that requires no EVM execution enters no context at all.

use crate::errors::HubError;
use crate::world::{
    BlockHeader, MessageFrame, OperationOutcome, Transaction, TxOutcome, WorldView,
};

pub trait Tracer {
    fn start_conflation(&mut self, _batch_size: usize) -> Result<(), HubError> {
        Ok(())
    }

    fn start_block(&mut self, _header: &BlockHeader) -> Result<(), HubError> {
        Ok(())
    }

    /// Called before the sender is charged, with the world as it was before the transaction.
    fn start_transaction(
        &mut self,
        _world: &dyn WorldView,
        _tx: &Transaction,
    ) -> Result<(), HubError> {
        Ok(())
    }

    /// Called once `frame` is set up, before its first instruction.
    fn context_enter(
        &mut self,
        _world: &dyn WorldView,
        _frame: &dyn MessageFrame,
    ) -> Result<(), HubError> {
        Ok(())
    }

    /// Called before the instruction at `frame.pc()` executes.
    fn pre_opcode(
        &mut self,
        _world: &dyn WorldView,
        _frame: &dyn MessageFrame,
    ) -> Result<(), HubError> {
        Ok(())
    }

    /// Called once the instruction's effect is visible in `frame`. For a CALL or CREATE that
    /// spawns a child, this happens before the child is entered.
    fn post_execution(
        &mut self,
        _world: &dyn WorldView,
        _frame: &dyn MessageFrame,
        _outcome: OperationOutcome,
    ) -> Result<(), HubError> {
        Ok(())
    }

    /// Called when control returns to `frame` from a child, with the child's result on the stack.
    fn context_re_enter(
        &mut self,
        _world: &dyn WorldView,
        _frame: &dyn MessageFrame,
    ) -> Result<(), HubError> {
        Ok(())
    }

    fn context_exit(
        &mut self,
        _world: &dyn WorldView,
        _frame: &dyn MessageFrame,
    ) -> Result<(), HubError> {
        Ok(())
    }

    fn end_transaction(
        &mut self,
        _world: &dyn WorldView,
        _tx: &Transaction,
        _outcome: &TxOutcome,
    ) -> Result<(), HubError> {
        Ok(())
    }

    fn end_block(&mut self, _header: &BlockHeader, _body: &[Transaction]) -> Result<(), HubError> {
        Ok(())
    }

    fn end_conflation(&mut self, _world: &dyn WorldView) -> Result<(), HubError> {
        Ok(())
    }
}

pub struct NoOpTracer;

impl Tracer for NoOpTracer {}
