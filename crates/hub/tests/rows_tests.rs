//! Whole-conflation properties: lifecycle checks, skipped transactions, stamps across
//! transactions and the rows a committed trace materializes to.

mod common;

use common::*;
use ethereum_types::U256;
use zktracer_hub::{
    Hub, HubError, InMemoryWorld, ModuleId, Tracer, TxOutcome,
    section::SectionKind,
};

const ADD: u8 = 0x01;

fn transfer_world() -> InMemoryWorld {
    InMemoryWorld::new()
        .with_account(sender(), account(0, 1_000_000_000_000, &[]))
        .with_account(eoa(), account(0, 0, &[]))
}

/// Runs `contract()`'s `ADD` on `1 + 2`, then the implicit STOP.
fn run_add() -> Result<Hub, HubError> {
    let mut run = Run::start(world_with_contract(&[ADD], 0), tx_to(contract(), 0))?;
    let root = root_frame(contract(), &[ADD]);
    run.enter(&root)?;

    let before = with_stack(root.clone(), &[word(1), word(2)]);
    let mut after = with_stack(root, &[word(3)]);
    after.remaining_gas -= 3;
    after.pc = 1;
    run.step(&before, &after)?;
    run.step(&after, &after)?;
    run.exit(&after)?;
    run.finish(true, 21_003)
}

// ==================== Lifecycle ====================

#[test]
fn test_hooks_outside_their_scope_are_rejected() -> Result<(), HubError> {
    let world = transfer_world();
    let mut hub = Hub::default();

    assert!(matches!(
        hub.start_block(&header()),
        Err(HubError::UnexpectedLifecycle { .. })
    ));
    hub.start_conflation(1)?;
    assert!(matches!(
        hub.start_transaction(&world, &tx_to(eoa(), 1)),
        Err(HubError::UnexpectedLifecycle { .. })
    ));
    hub.start_block(&header())?;
    assert!(matches!(
        hub.pre_opcode(&world, &root_frame(eoa(), &[])),
        Err(HubError::UnexpectedLifecycle { .. })
    ));
    assert!(matches!(
        hub.commit(|_| {}),
        Err(HubError::NotSealed("conflation"))
    ));
    Ok(())
}

#[test]
fn test_context_must_be_announced() -> Result<(), HubError> {
    let world = transfer_world();
    let mut hub = Hub::default();
    hub.start_conflation(1)?;
    hub.start_block(&header())?;
    // A plain transfer never enters the EVM.
    hub.start_transaction(&world, &tx_to(eoa(), 1))?;
    assert!(matches!(
        hub.context_enter(&world, &root_frame(eoa(), &[])),
        Err(HubError::UnexpectedLifecycle { .. })
    ));
    Ok(())
}

#[test]
fn test_negative_refund_counter_is_rejected() -> Result<(), HubError> {
    let mut run = Run::start(world_with_contract(&[ADD], 0), tx_to(contract(), 0))?;
    let root = root_frame(contract(), &[ADD]);
    run.enter(&root)?;

    let before = with_stack(root.clone(), &[word(1), word(2)]);
    let mut after = at_pc(with_stack(root, &[word(3)]), 1);
    after.remaining_gas -= 3;
    after.gas_refund = -1;
    run.step(&before, &after)?;
    run.step(&after, &after)?;
    run.exit(&after)?;

    assert!(matches!(
        run.finish(true, 21_003),
        Err(HubError::Arithmetic("refund counter"))
    ));
    Ok(())
}

// ==================== Skipped transactions ====================

#[test]
fn test_transfer_is_skipped() -> Result<(), HubError> {
    let run = Run::start(transfer_world(), tx_to(eoa(), 1_000))?;
    let hub = run.finish(true, 21_000)?;

    assert_eq!(kinds(&hub)?, vec![SectionKind::TxSkip]);
    let skip = section_of(&hub, SectionKind::TxSkip)?;
    let accounts = accounts(skip);
    assert_eq!(accounts.len(), 3);

    let (from, to, miner) = (accounts[0], accounts[1], accounts[2]);
    let charged = U256::from(GAS_PRICE * 21_000 + 1_000);
    assert_eq!(from.before.balance - from.after.balance, charged);
    assert_eq!(from.after.nonce, 1);
    assert_eq!(to.after.balance, U256::from(1_000));
    assert_eq!(miner.before.address, coinbase());
    assert_eq!(miner.after.balance, U256::from((GAS_PRICE - 7) * 21_000));

    // Skipped transactions leave every account cold.
    assert!(accounts.iter().all(|account| !account.after.is_warm));
    assert_eq!(skip.common.context_number_new, skip.common.context_number);
    Ok(())
}

#[test]
fn test_stamps_span_the_conflation() -> Result<(), HubError> {
    let world = transfer_world();
    let first = tx_to(eoa(), 1);
    let second = zktracer_hub::Transaction {
        nonce: 1,
        ..tx_to(eoa(), 2)
    };
    let outcome = TxOutcome {
        success: true,
        gas_used: 21_000,
        ..Default::default()
    };

    let mut hub = Hub::default();
    hub.start_conflation(2)?;
    hub.start_block(&header())?;
    for tx in [&first, &second] {
        hub.start_transaction(&world, tx)?;
        hub.end_transaction(&world, tx, &outcome)?;
    }
    hub.end_block(&header(), &[first, second])?;
    hub.end_conflation(&world)?;

    let txs = hub.state().txs();
    assert_eq!(txs.len(), 2);
    let stamps: Vec<u32> = txs
        .iter()
        .flat_map(|tx| tx.sections())
        .map(|section| section.common.hub_stamp)
        .collect();
    assert_eq!(stamps, vec![1, 2]);

    let mut numbers = Vec::new();
    hub.commit(|row| numbers.push(row.absolute_transaction_number))?;
    assert_eq!(numbers, vec![1, 1, 1, 1, 2, 2, 2, 2]);
    Ok(())
}

// ==================== Rows ====================

#[test]
fn test_every_fragment_is_one_row() -> Result<(), HubError> {
    let hub = run_add()?;

    assert_eq!(
        kinds(&hub)?,
        vec![
            SectionKind::TxInit,
            SectionKind::StackOnly,
            SectionKind::Halt,
            SectionKind::TxFinalization
        ]
    );
    let fragments: usize = sections(&hub)?
        .iter()
        .map(|section| section.fragments.len())
        .sum();
    let rows = rows(&hub)?;
    assert_eq!(rows.len(), fragments);
    assert_eq!(rows.len(), hub.line_count());
    assert!(rows.windows(2).all(|pair| pair[0].hub_stamp <= pair[1].hub_stamp));
    Ok(())
}

#[test]
fn test_rows_carry_their_section() -> Result<(), HubError> {
    let hub = run_add()?;
    let rows = rows(&hub)?;

    let add = rows
        .iter()
        .find(|row| row.section_kind == SectionKind::StackOnly)
        .ok_or(HubError::NoTransaction)?;
    assert_eq!(add.hub_stamp, 2);
    assert_eq!(add.context_number, 2);
    assert_eq!(add.context_number_new, 2);
    assert_eq!(add.call_stack_depth, 0);
    assert_eq!(add.code_address, contract());
    assert_eq!(add.gas_cost, 3);
    assert_eq!(add.gas_next, add.gas_actual - 3);
    assert_eq!(add.exception, "NONE");

    let json = serde_json::to_value(add).map_err(|_| HubError::NoTransaction)?;
    assert_eq!(json["hub_stamp"], 2);
    Ok(())
}

#[test]
fn test_code_fragment_index_covers_executed_code() -> Result<(), HubError> {
    let hub = run_add()?;
    assert_eq!(hub.state().code_fragment_index().len(), 1);
    Ok(())
}

#[test]
fn test_satellites_count_their_calls() -> Result<(), HubError> {
    let hub = run_add()?;
    let counts = hub.module_line_counts();
    assert!(counts.contains(&(ModuleId::Add, 16)));
    assert!(counts.contains(&(ModuleId::Mul, 0)));
    Ok(())
}
