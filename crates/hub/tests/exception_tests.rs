//! Exceptional halts: which exception an instruction raises, and what the Hub traces for it.

mod common;

use std::sync::Arc;

use common::*;
use ethereum_types::U256;
use zktracer_hub::{
    Fork, Hub, HubError, MessageFrame, RuleSet, Transaction, WorldView,
    fragment::{DomSubStamps, Fragment},
    gas_projector::{GasProjector, StandardGasProjector},
    opcodes::Opcode,
    section::SectionKind,
    signals::Exceptions,
};

const ADD: u8 = 0x01;
const CLZ: u8 = 0x1E;
const BALANCE: u8 = 0x31;
const SLOAD: u8 = 0x54;
const SSTORE: u8 = 0x55;
const JUMP: u8 = 0x56;
const CALL: u8 = 0xF1;
const INVALID: u8 = 0xFE;
const SELFDESTRUCT: u8 = 0xFF;

/// Runs the root frame straight into the exceptional halt of its first instruction.
fn halt_on(hub: Hub, code: &[u8], stack: &[U256], gas: u64) -> Result<Hub, HubError> {
    let mut run = Run::with_hub(hub, world_with_contract(code, 0), tx_to(contract(), 0))?;
    let mut root = root_frame(contract(), code);
    root.remaining_gas = gas;
    run.enter(&root)?;
    run.fail(&with_stack(root, stack))?;
    run.finish(false, TX_GAS_LIMIT)
}

fn raised(hub: &Hub) -> Result<(SectionKind, Exceptions), HubError> {
    let section = &sections(hub)?[1];
    Ok((section.kind, section.common.exceptions))
}

// ==================== Priorities ====================

#[test]
fn test_invalid_opcode_hides_stack_underflow() -> Result<(), HubError> {
    // INVALID pops nothing, but the classifier never gets to the stack.
    let hub = halt_on(Hub::default(), &[INVALID], &[], FRAME_GAS)?;
    assert_eq!(
        raised(&hub)?,
        (SectionKind::EarlyException, Exceptions::INVALID_OPCODE)
    );
    Ok(())
}

#[test]
fn test_stack_underflow_hides_out_of_gas() -> Result<(), HubError> {
    let hub = halt_on(Hub::default(), &[ADD], &[word(1)], 0)?;
    assert_eq!(
        raised(&hub)?,
        (SectionKind::EarlyException, Exceptions::STACK_UNDERFLOW)
    );
    let section = &sections(&hub)?[1];
    assert_eq!(section.common.gas_cost, 0);
    Ok(())
}

#[test]
fn test_sstore_stipend_comes_before_out_of_gas() -> Result<(), HubError> {
    let hub = halt_on(Hub::default(), &[SSTORE], &[word(1), word(1)], 2_300)?;
    assert_eq!(
        raised(&hub)?,
        (SectionKind::Storage, Exceptions::OUT_OF_SSTORE_STIPEND)
    );
    Ok(())
}

#[test]
fn test_out_of_gas() -> Result<(), HubError> {
    let hub = halt_on(Hub::default(), &[ADD], &[word(1), word(2)], 2)?;
    assert_eq!(
        raised(&hub)?,
        (SectionKind::StackOnly, Exceptions::OUT_OF_GAS)
    );
    let section = &sections(&hub)?[1];
    assert_eq!(section.common.gas_actual, 2);
    assert_eq!(section.common.gas_cost, 3);
    assert_eq!(section.common.gas_next, 0);
    Ok(())
}

#[test]
fn test_jump_to_non_jumpdest() -> Result<(), HubError> {
    let hub = halt_on(Hub::default(), &[JUMP], &[word(0)], FRAME_GAS)?;
    assert_eq!(raised(&hub)?, (SectionKind::Jump, Exceptions::JUMP_FAULT));
    Ok(())
}

#[test]
fn test_cold_sload_out_of_gas_still_reads_the_slot() -> Result<(), HubError> {
    let hub = halt_on(Hub::default(), &[SLOAD], &[word(1)], 100)?;
    assert_eq!(
        raised(&hub)?,
        (SectionKind::Storage, Exceptions::OUT_OF_GAS)
    );
    let section = &sections(&hub)?[1];
    let slots: Vec<_> = section
        .fragments
        .iter()
        .filter_map(Fragment::as_storage)
        .collect();
    assert_eq!(slots.len(), 2);
    assert!(!slots[0].warm_before);
    assert!(slots[0].warm_after);
    // The frame reverts at the SLOAD's own stamp and cools the slot down again.
    assert!(!slots[1].warm_after);
    assert_eq!(slots[1].dom_sub, DomSubStamps::revert_with_current(2, 2, 3));
    Ok(())
}

// ==================== Warmth on out of gas ====================

#[test]
fn test_out_of_gas_balance_cools_the_account_down() -> Result<(), HubError> {
    let hub = halt_on(Hub::default(), &[BALANCE], &[address_word(eoa())], 100)?;
    assert_eq!(
        raised(&hub)?,
        (SectionKind::Account, Exceptions::OUT_OF_GAS)
    );

    let section = &sections(&hub)?[1];
    let rows = accounts(section);
    assert_eq!(rows.len(), 2);
    assert!(!rows[0].before.is_warm);
    assert!(rows[0].after.is_warm);
    assert_eq!(rows[1].before, rows[0].after);
    assert_eq!(rows[1].after, rows[0].before);
    assert_eq!(rows[1].dom_sub, DomSubStamps::revert_with_current(2, 2, 2));
    Ok(())
}

/// Every row of `eoa()` in the transaction, whatever the section.
fn eoa_warmth(hub: &Hub) -> Result<Vec<(SectionKind, bool, bool)>, HubError> {
    Ok(sections(hub)?
        .iter()
        .flat_map(|section| {
            accounts(section)
                .into_iter()
                .filter(|row| row.before.address == eoa())
                .map(|row| (section.kind, row.before.is_warm, row.after.is_warm))
        })
        .collect())
}

#[test]
fn test_out_of_gas_call_leaves_the_callee_cold() -> Result<(), HubError> {
    let stack = [
        word(50_000),
        address_word(eoa()),
        U256::zero(),
        U256::zero(),
        U256::zero(),
        U256::zero(),
        U256::zero(),
    ];
    let hub = halt_on(Hub::default(), &[CALL], &stack, 100)?;
    assert_eq!(raised(&hub)?, (SectionKind::Call, Exceptions::OUT_OF_GAS));
    assert_eq!(eoa_warmth(&hub)?, vec![(SectionKind::Call, false, false)]);
    Ok(())
}

#[test]
fn test_out_of_gas_selfdestruct_leaves_the_heir_cold() -> Result<(), HubError> {
    let hub = halt_on(
        Hub::default(),
        &[SELFDESTRUCT],
        &[address_word(eoa())],
        100,
    )?;
    assert_eq!(raised(&hub)?, (SectionKind::Halt, Exceptions::OUT_OF_GAS));
    assert_eq!(eoa_warmth(&hub)?, vec![(SectionKind::Halt, false, false)]);
    Ok(())
}

// ==================== Effects ====================

#[test]
fn test_exceptional_root_reverts_the_transaction() -> Result<(), HubError> {
    let hub = halt_on(Hub::default(), &[INVALID], &[], FRAME_GAS)?;

    assert_eq!(
        kinds(&hub)?,
        vec![
            SectionKind::TxInit,
            SectionKind::EarlyException,
            SectionKind::TxFinalization
        ]
    );
    let section = &sections(&hub)?[1];
    assert!(section.common.self_reverts);
    assert_eq!(section.common.revert_stamp, section.common.hub_stamp);
    assert_eq!(section.common.gas_next, 0);

    // Sender and recipient are both rolled back.
    let init = section_of(&hub, SectionKind::TxInit)?;
    assert_eq!(accounts(init).len(), 4);
    Ok(())
}

// ==================== Gas projection ====================

/// Makes every instruction unaffordable.
#[derive(Debug)]
struct Unaffordable;

impl GasProjector for Unaffordable {
    fn upfront_cost(&self, _: Opcode, _: &dyn MessageFrame, _: &dyn WorldView) -> u64 {
        u64::MAX
    }

    fn intrinsic_cost(&self, tx: &Transaction) -> u64 {
        StandardGasProjector::new(Fork::Cancun).intrinsic_cost(tx)
    }
}

#[test]
fn test_out_of_gas_follows_the_gas_projector() -> Result<(), HubError> {
    let rules = RuleSet::for_fork(Fork::Cancun).with_gas_projector(Arc::new(Unaffordable));
    let hub = halt_on(Hub::new(rules), &[ADD], &[word(1), word(2)], FRAME_GAS)?;
    assert_eq!(
        raised(&hub)?,
        (SectionKind::StackOnly, Exceptions::OUT_OF_GAS)
    );
    Ok(())
}

#[test]
fn test_opcodes_follow_the_fork() -> Result<(), HubError> {
    let cancun = halt_on(Hub::default(), &[CLZ], &[word(1)], FRAME_GAS)?;
    assert_eq!(
        raised(&cancun)?,
        (SectionKind::EarlyException, Exceptions::INVALID_OPCODE)
    );

    let osaka = halt_on(
        Hub::new(RuleSet::for_fork(Fork::Osaka)),
        &[CLZ],
        &[word(1)],
        2,
    )?;
    assert_eq!(
        raised(&osaka)?,
        (SectionKind::StackOnly, Exceptions::OUT_OF_GAS)
    );
    Ok(())
}
