//! Sections of every transaction of the conflation, and what is derived from them once they
//! are complete.

use std::collections::{BTreeMap, BTreeSet};

use ethereum_types::{Address, U256};
use serde::Serialize;
use tracing::debug;

use crate::columns::TraceRow;
use crate::errors::HubError;
use crate::fragment::{Fragment, Scenario};
use crate::section::{CommonValues, SectionId, SectionKind, TraceSection};

/// What the Hub knows about a transaction beyond its sections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TxMetadata {
    /// 1-based position of the transaction in the conflation.
    pub absolute_number: usize,
    pub block_number: u64,
    pub sender: Address,
    /// Recipient, or address of the deployed contract.
    pub effective_recipient: Address,
    pub coinbase: Address,
    pub is_deployment: bool,
    pub requires_evm_execution: bool,
    pub value: U256,
    pub gas_limit: u64,
    pub gas_price: U256,
    pub priority_fee_per_gas: U256,
    pub intrinsic_cost: u64,
    pub initially_available_gas: u64,
    pub gas_used: u64,
    pub leftover_gas: u64,
    pub refund_counter: u64,
    pub refund_effective: u64,
    pub status: Option<bool>,
}

impl TxMetadata {
    /// Wei returned to the sender. `leftover_gas` already includes the effective refund.
    pub fn sender_refund(&self) -> U256 {
        self.gas_price.saturating_mul(U256::from(self.leftover_gas))
    }

    pub fn coinbase_reward(&self) -> U256 {
        self.priority_fee_per_gas
            .saturating_mul(U256::from(self.gas_used))
    }
}

#[derive(Debug, Clone, Default)]
pub struct TxTrace {
    pub metadata: TxMetadata,
    sections: Vec<TraceSection>,
    sealed: bool,
}

impl TxTrace {
    pub fn new(metadata: TxMetadata) -> Self {
        Self {
            metadata,
            sections: Vec::new(),
            sealed: false,
        }
    }

    pub fn sections(&self) -> &[TraceSection] {
        &self.sections
    }

    pub fn sections_mut(&mut self) -> &mut [TraceSection] {
        &mut self.sections
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn line_count(&self) -> usize {
        self.sections.iter().map(TraceSection::row_count).sum()
    }

    pub fn last_section(&self) -> Option<&TraceSection> {
        self.sections.last()
    }

    fn open(
        &mut self,
        tx: usize,
        kind: SectionKind,
        common: CommonValues,
        max_rows: usize,
    ) -> Result<SectionId, HubError> {
        if self.sealed {
            return Err(HubError::AlreadySealed("transaction"));
        }
        let id = SectionId {
            tx,
            index: self.sections.len(),
        };
        self.sections
            .push(TraceSection::new(id, kind, common, max_rows));
        Ok(id)
    }

    /// Back-fills the running values of every section: the refund counter, the log stamp and
    /// the next context number. `log_stamp` is the stamp of the last log before the transaction;
    /// the stamp of the transaction's last log is returned.
    pub fn seal(&mut self, log_stamp: u32) -> Result<u32, HubError> {
        if self.sealed {
            return Err(HubError::AlreadySealed("transaction"));
        }

        let next_context_numbers: Vec<Option<u32>> = self
            .sections
            .iter()
            .skip(1)
            .map(|section| Some(section.common.context_number))
            .chain(std::iter::once(None))
            .collect();

        let mut refund = 0i64;
        let mut log_stamp = log_stamp;
        for (section, next_context_number) in self.sections.iter_mut().zip(next_context_numbers) {
            if section.has_latched_stack() {
                return Err(HubError::StackNotLatched(section.id));
            }
            if section.scenario.is_some_and(Scenario::is_undefined) {
                return Err(HubError::UnexpectedSection {
                    section: section.id,
                    expected: "resolved scenario",
                });
            }

            let common = &mut section.common;
            common.refund = refund;
            common.refund_new = common.observed_refund.unwrap_or(refund);
            common.refund_delta = common.refund_new.saturating_sub(refund);
            refund = common.refund_new;

            if section.emits_log {
                log_stamp = log_stamp
                    .checked_add(1)
                    .ok_or(HubError::Arithmetic("log stamp"))?;
            }
            common.log_stamp = log_stamp;

            common.context_number_new = match next_context_number {
                Some(number) => number,
                None if matches!(
                    section.kind,
                    SectionKind::TxFinalization | SectionKind::TxSkip
                ) =>
                {
                    common.context_number
                }
                None => return Err(HubError::MissingNextSection(section.id)),
            };
            section.sealed = true;
        }

        self.sealed = true;
        Ok(log_stamp)
    }
}

/// Code fragment indices: the position of every `(address, deployment number, deployment
/// status)` whose code some row points at, in sorted order.
#[derive(Debug, Clone, Default)]
pub struct CodeFragmentIndex {
    registered: BTreeSet<(Address, u32, bool)>,
    assigned: Option<BTreeMap<(Address, u32, bool), u32>>,
}

impl CodeFragmentIndex {
    pub fn register(&mut self, address: Address, deployment_number: u32, deployment_status: bool) {
        self.registered
            .insert((address, deployment_number, deployment_status));
    }

    /// Assigns indices, starting at 1, in sorted order.
    pub fn assign(&mut self) -> Result<(), HubError> {
        if self.assigned.is_some() {
            return Err(HubError::AlreadySealed("code fragment index"));
        }
        let assigned = self
            .registered
            .iter()
            .zip(1u32..)
            .map(|(key, index)| (*key, index))
            .collect();
        self.assigned = Some(assigned);
        Ok(())
    }

    pub fn get(
        &self,
        address: Address,
        deployment_number: u32,
        deployment_status: bool,
    ) -> Result<u32, HubError> {
        let assigned = self
            .assigned
            .as_ref()
            .ok_or(HubError::NotSealed("code fragment index"))?;
        Ok(assigned
            .get(&(address, deployment_number, deployment_status))
            .copied()
            .unwrap_or_default())
    }

    pub fn len(&self) -> usize {
        self.registered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }
}

/// Every transaction of the conflation.
#[derive(Debug, Clone, Default)]
pub struct State {
    txs: Vec<TxTrace>,
    code_fragment_index: CodeFragmentIndex,
    log_stamp: u32,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn txs(&self) -> &[TxTrace] {
        &self.txs
    }

    pub fn current_tx_index(&self) -> Result<usize, HubError> {
        self.txs
            .len()
            .checked_sub(1)
            .ok_or(HubError::NoTransaction)
    }

    pub fn current_tx(&self) -> Result<&TxTrace, HubError> {
        self.txs.last().ok_or(HubError::NoTransaction)
    }

    pub fn current_tx_mut(&mut self) -> Result<&mut TxTrace, HubError> {
        self.txs.last_mut().ok_or(HubError::NoTransaction)
    }

    pub fn tx(&self, index: usize) -> Result<&TxTrace, HubError> {
        self.txs.get(index).ok_or(HubError::NoTransaction)
    }

    pub fn start_tx(&mut self, mut metadata: TxMetadata) -> usize {
        metadata.absolute_number = self.txs.len() + 1;
        self.txs.push(TxTrace::new(metadata));
        self.txs.len() - 1
    }

    /// Opens a new section in the current transaction.
    pub fn open_section(
        &mut self,
        kind: SectionKind,
        common: CommonValues,
        max_rows: usize,
    ) -> Result<SectionId, HubError> {
        let tx = self.current_tx_index()?;
        self.current_tx_mut()?.open(tx, kind, common, max_rows)
    }

    pub fn section(&self, id: SectionId) -> Result<&TraceSection, HubError> {
        self.txs
            .get(id.tx)
            .and_then(|tx| tx.sections.get(id.index))
            .ok_or(HubError::UnknownSection(id))
    }

    pub fn section_mut(&mut self, id: SectionId) -> Result<&mut TraceSection, HubError> {
        self.txs
            .get_mut(id.tx)
            .and_then(|tx| tx.sections.get_mut(id.index))
            .ok_or(HubError::UnknownSection(id))
    }

    /// Appends `fragment` to section `id`, registering the code it points at if needed.
    pub fn append(&mut self, id: SectionId, fragment: impl Into<Fragment>) -> Result<usize, HubError> {
        let fragment = fragment.into();
        if let Fragment::Account(account) = &fragment {
            if account.requires_code_fragment_index {
                self.code_fragment_index.register(
                    account.after.address,
                    account.after.deployment_number,
                    account.after.deployment_status,
                );
            }
        }
        self.section_mut(id)?.add_fragment(fragment)
    }

    /// Seals transaction `index`, carrying the log stamp over from previous transactions.
    pub fn seal_tx(&mut self, index: usize) -> Result<(), HubError> {
        let log_stamp = self.log_stamp;
        let tx = self.txs.get_mut(index).ok_or(HubError::NoTransaction)?;
        self.log_stamp = tx.seal(log_stamp)?;
        debug!(
            tx = tx.metadata.absolute_number,
            sections = tx.sections.len(),
            lines = tx.line_count(),
            "Sealed transaction"
        );
        Ok(())
    }

    pub fn code_fragment_index(&self) -> &CodeFragmentIndex {
        &self.code_fragment_index
    }

    pub fn assign_code_fragment_indices(&mut self) -> Result<(), HubError> {
        self.code_fragment_index.assign()
    }

    pub fn line_count(&self) -> usize {
        self.txs.iter().map(TxTrace::line_count).sum()
    }

    /// Materializes one row per fragment, in section order, into `sink`. Returns the number of
    /// rows produced.
    pub fn commit<F>(&self, mut sink: F) -> Result<usize, HubError>
    where
        F: FnMut(TraceRow),
    {
        let mut rows = 0;
        for tx in &self.txs {
            if !tx.sealed {
                return Err(HubError::NotSealed("transaction"));
            }
            for section in &tx.sections {
                for fragment in &section.fragments {
                    sink(TraceRow::materialize(
                        &tx.metadata,
                        section,
                        fragment,
                        &self.code_fragment_index,
                    )?);
                    rows += 1;
                }
            }
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::{TransactionFragment, TxPhase};

    fn common(context_number: u32, observed_refund: Option<i64>) -> CommonValues {
        CommonValues {
            context_number,
            observed_refund,
            ..Default::default()
        }
    }

    #[test]
    fn seal_back_fills_running_values() -> Result<(), HubError> {
        let mut state = State::new();
        state.start_tx(TxMetadata::default());
        let init = state.open_section(SectionKind::TxInit, common(0, None), 1)?;
        let log = state.open_section(SectionKind::Log, common(2, Some(4800)), 1)?;
        let finl = state.open_section(SectionKind::TxFinalization, common(0, None), 1)?;
        state.append(init, TransactionFragment::new(TxPhase::Init))?;
        state.section_mut(log)?.emits_log = true;

        state.seal_tx(0)?;

        let init = state.section(init)?;
        assert_eq!(init.common.context_number_new, 2);
        assert_eq!(init.common.log_stamp, 0);

        let log = state.section(log)?;
        assert_eq!((log.common.refund, log.common.refund_new), (0, 4800));
        assert_eq!(log.common.refund_delta, 4800);
        assert_eq!(log.common.log_stamp, 1);
        assert_eq!(log.common.context_number_new, 0);

        let finl = state.section(finl)?;
        assert_eq!(finl.common.refund, 4800);
        assert_eq!(finl.common.refund_delta, 0);
        assert_eq!(finl.common.log_stamp, 1);
        assert_eq!(finl.common.context_number_new, 0);
        assert_eq!(state.current_tx()?.line_count(), 1);
        Ok(())
    }

    #[test]
    fn seal_requires_a_successor_for_instructions() -> Result<(), HubError> {
        let mut state = State::new();
        state.start_tx(TxMetadata::default());
        let id = state.open_section(SectionKind::StackOnly, common(1, None), 1)?;
        assert_eq!(state.seal_tx(0), Err(HubError::MissingNextSection(id)));
        Ok(())
    }

    #[test]
    fn code_fragment_indices_follow_sorted_order() -> Result<(), HubError> {
        let mut index = CodeFragmentIndex::default();
        let (low, high) = (Address::from_low_u64_be(1), Address::from_low_u64_be(2));
        index.register(high, 0, false);
        index.register(low, 1, true);
        index.register(low, 1, false);
        assert_eq!(index.get(low, 1, false), Err(HubError::NotSealed("code fragment index")));

        index.assign()?;
        assert_eq!(index.get(low, 1, false)?, 1);
        assert_eq!(index.get(low, 1, true)?, 2);
        assert_eq!(index.get(high, 0, false)?, 3);
        Ok(())
    }
}
