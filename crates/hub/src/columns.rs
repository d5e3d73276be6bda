//! The row format handed to the downstream proof system.
//!
//! The physical encoding of the columns is out of scope here: rows are exposed as serde values,
//! and [`column_headers`] describes the columns the shared part of every row maps to.

use serde::Serialize;

use crate::account_snapshot::AccountSnapshot;
use crate::constants::MULTIPLIER_STACK_STAMP;
use crate::errors::HubError;
use crate::fragment::{
    ContextFragment, Fragment, ImcFragment, Scenario, StackFragment, StorageFragment, TxPhase,
};
use crate::section::{SectionKind, TraceSection};
use crate::state::{CodeFragmentIndex, TxMetadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColumnHeader {
    pub name: &'static str,
    /// Width of one value, in bytes.
    pub bytes: usize,
}

const COLUMNS: &[(&str, usize)] = &[
    ("ABSOLUTE_TRANSACTION_NUMBER", 2),
    ("HUB_STAMP", 4),
    ("SECTION_KIND", 1),
    ("PERSPECTIVE", 1),
    ("CONTEXT_NUMBER", 4),
    ("CONTEXT_NUMBER_NEW", 4),
    ("CALLER_CONTEXT_NUMBER", 4),
    ("CONTEXT_SELF_REVERTS", 1),
    ("CONTEXT_GETS_REVERTED", 1),
    ("CONTEXT_REVERT_STAMP", 4),
    ("CALL_STACK_DEPTH", 2),
    ("PROGRAM_COUNTER", 4),
    ("CODE_ADDRESS", 20),
    ("CODE_DEPLOYMENT_NUMBER", 4),
    ("CODE_DEPLOYMENT_STATUS", 1),
    ("CODE_FRAGMENT_INDEX", 4),
    ("GAS_ACTUAL", 8),
    ("GAS_COST", 8),
    ("GAS_NEXT", 8),
    ("REFUND_COUNTER", 8),
    ("REFUND_COUNTER_NEW", 8),
    ("LOG_INFO_STAMP", 4),
    ("STACK_STAMP", 8),
    ("DOM_STAMP", 8),
    ("SUB_STAMP", 8),
    ("EXCEPTION", 2),
    ("ABORT", 1),
];

/// The columns shared by every row, in order.
pub fn column_headers() -> Vec<ColumnHeader> {
    COLUMNS
        .iter()
        .map(|(name, bytes)| ColumnHeader {
            name,
            bytes: *bytes,
        })
        .collect()
}

/// Transaction metadata as shown by a transaction row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionView {
    pub phase: TxPhase,
    #[serde(flatten)]
    pub metadata: TxMetadata,
}

/// The perspective-specific part of a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "perspective", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RowPayload {
    Stack(StackFragment),
    Account {
        before: AccountSnapshot,
        after: AccountSnapshot,
        requires_code_fragment_index: bool,
    },
    Context(ContextFragment),
    Storage(StorageFragment),
    Imc(ImcFragment),
    Scenario(Scenario),
    Transaction(TransactionView),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceRow {
    pub absolute_transaction_number: usize,
    pub hub_stamp: u32,
    pub section_kind: SectionKind,
    pub context_number: u32,
    pub context_number_new: u32,
    pub caller_context_number: u32,
    pub context_self_reverts: bool,
    pub context_gets_reverted: bool,
    pub context_revert_stamp: u32,
    pub call_stack_depth: usize,
    pub program_counter: usize,
    pub code_address: ethereum_types::Address,
    pub code_deployment_number: u32,
    pub code_deployment_status: bool,
    pub code_fragment_index: u32,
    pub gas_actual: u64,
    pub gas_cost: u64,
    pub gas_next: u64,
    pub refund_counter: i64,
    pub refund_counter_new: i64,
    pub log_info_stamp: u32,
    pub stack_stamp: u64,
    pub dom_stamp: u64,
    pub sub_stamp: u64,
    pub exception: String,
    pub abort: bool,
    #[serde(flatten)]
    pub payload: RowPayload,
}

impl TraceRow {
    pub fn materialize(
        metadata: &TxMetadata,
        section: &TraceSection,
        fragment: &Fragment,
        code_fragment_index: &CodeFragmentIndex,
    ) -> Result<Self, HubError> {
        let common = &section.common;
        let mut dom_sub = None;
        let mut stack_stamp = 0;

        let payload = match fragment {
            Fragment::Stack(stack) => {
                stack_stamp = u64::from(common.hub_stamp) * u64::from(MULTIPLIER_STACK_STAMP)
                    + u64::try_from(stack.line).unwrap_or_default();
                RowPayload::Stack(stack.clone())
            }
            Fragment::Account(account) => {
                dom_sub = Some(account.dom_sub);
                RowPayload::Account {
                    before: account.before.clone(),
                    after: account.after.clone(),
                    requires_code_fragment_index: account.requires_code_fragment_index,
                }
            }
            Fragment::Context(context) => RowPayload::Context(context.clone()),
            Fragment::Storage(storage) => {
                dom_sub = Some(storage.dom_sub);
                RowPayload::Storage(storage.clone())
            }
            Fragment::Imc(imc) => RowPayload::Imc(imc.clone()),
            Fragment::Scenario(_) => RowPayload::Scenario(section.scenario()?),
            Fragment::Transaction(transaction) => RowPayload::Transaction(TransactionView {
                phase: transaction.phase,
                metadata: metadata.clone(),
            }),
        };

        let code_fragment_index = match fragment {
            Fragment::Account(account) if account.requires_code_fragment_index => {
                code_fragment_index.get(
                    account.after.address,
                    account.after.deployment_number,
                    account.after.deployment_status,
                )?
            }
            _ if section.kind.is_tx_phase() => 0,
            _ => code_fragment_index.get(
                common.code_address,
                common.code_deployment_number,
                common.code_deployment_status,
            )?,
        };

        let dom_sub = dom_sub.unwrap_or_default();
        Ok(Self {
            absolute_transaction_number: metadata.absolute_number,
            hub_stamp: common.hub_stamp,
            section_kind: section.kind,
            context_number: common.context_number,
            context_number_new: common.context_number_new,
            caller_context_number: common.caller_context_number,
            context_self_reverts: common.self_reverts,
            context_gets_reverted: common.gets_reverted,
            context_revert_stamp: common.revert_stamp,
            call_stack_depth: common.depth,
            program_counter: common.pc,
            code_address: common.code_address,
            code_deployment_number: common.code_deployment_number,
            code_deployment_status: common.code_deployment_status,
            code_fragment_index,
            gas_actual: common.gas_actual,
            gas_cost: common.gas_cost,
            gas_next: common.gas_next,
            refund_counter: common.refund,
            refund_counter_new: common.refund_new,
            log_info_stamp: common.log_stamp,
            stack_stamp,
            dom_stamp: dom_sub.dom,
            sub_stamp: dom_sub.sub,
            exception: common.exceptions.name().to_owned(),
            abort: common.aborts.any(),
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_unique() {
        let headers = column_headers();
        let mut names: Vec<_> = headers.iter().map(|header| header.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), headers.len());
        assert!(headers.iter().all(|header| header.bytes > 0));
    }
}
