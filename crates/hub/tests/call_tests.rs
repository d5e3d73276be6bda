//! Message calls as seen by the Hub: transfers to externally owned accounts, aborted calls and
//! calls whose callee fails.

mod common;

use common::*;
use ethereum_types::U256;
use zktracer_hub::{
    FrameState, Hub, HubError, Tracer,
    defer::Phase,
    fragment::{CallScenario, FragmentKind, Scenario},
    section::SectionKind,
    signals::Exceptions,
};

const CALL: u8 = 0xF1;
const STATICCALL: u8 = 0xFA;
const SSTORE: u8 = 0x55;

fn call_stack(callee: ethereum_types::Address, value: u64) -> Vec<U256> {
    vec![
        word(50_000),
        address_word(callee),
        word(value),
        U256::zero(),
        U256::zero(),
        U256::zero(),
        U256::zero(),
    ]
}

/// Runs `contract()` executing a single CALL to `eoa()` that hands over `value` and finishes with
/// the implicit STOP. `call_result` is what the engine pushes once the call is over; aborted
/// calls never spawn a context.
fn call_eoa(
    contract_balance: u64,
    value: u64,
    call_result: u64,
    spawns: bool,
) -> Result<Hub, HubError> {
    let world = world_with_contract(&[CALL], contract_balance)
        .with_account(eoa(), account(0, 1, &[]));
    let mut run = Run::start(world, tx_to(contract(), 0))?;

    let root = root_frame(contract(), &[CALL]);
    run.enter(&root)?;
    let before = with_stack(root.clone(), &call_stack(eoa(), value));
    let mut after = with_stack(root.clone(), &[]);
    after.remaining_gas -= 11_600;

    if spawns {
        run.step(&before, &after)?;
        let mut child = FrameState::message_call(1, contract(), eoa(), Default::default(), 50_000);
        child.value = word(value);
        run.enter(&child)?;
        run.exit(&child)?;
        run.re_enter(&with_stack(after.clone(), &[word(call_result)]))?;
    } else {
        run.step(&before, &with_stack(after.clone(), &[word(call_result)]))?;
    }

    let stop = at_pc(with_stack(after, &[word(call_result)]), 1);
    run.step(&stop, &stop)?;
    run.exit(&stop)?;
    run.finish(true, 40_000)
}

// ==================== Transfers ====================

#[test]
fn test_call_to_eoa_moves_value() -> Result<(), HubError> {
    let hub = call_eoa(100, 5, 1, true)?;

    assert_eq!(
        kinds(&hub)?,
        vec![
            SectionKind::TxInit,
            SectionKind::Call,
            SectionKind::Halt,
            SectionKind::TxFinalization
        ]
    );

    let call = section_of(&hub, SectionKind::Call)?;
    assert_eq!(
        call.scenario,
        Some(Scenario::Call(CallScenario::EoaSuccessWontRevert))
    );
    let accounts = accounts(call);
    assert_eq!(accounts.len(), 2);
    assert_eq!(accounts[0].before.address, contract());
    assert_eq!(accounts[0].before.balance, U256::from(100));
    assert_eq!(accounts[0].after.balance, U256::from(95));
    assert_eq!(accounts[1].before.address, eoa());
    assert_eq!(accounts[1].before.balance, U256::from(1));
    assert_eq!(accounts[1].after.balance, U256::from(6));
    assert!(!accounts[1].before.is_warm);
    assert!(accounts[1].after.is_warm);

    // A CALL needs two stack rows.
    let fragments = fragment_kinds(call);
    assert_eq!(&fragments[..2], &[FragmentKind::Stack, FragmentKind::Stack]);
    Ok(())
}

#[test]
fn test_call_context_numbers() -> Result<(), HubError> {
    let hub = call_eoa(100, 5, 1, true)?;
    let sections = sections(&hub)?;

    let init = &sections[0];
    let call = &sections[1];
    let stop = &sections[2];
    assert_eq!(init.common.hub_stamp, 1);
    assert_eq!(call.common.hub_stamp, 2);
    assert_eq!(call.common.context_number, 2);
    assert_eq!(stop.common.context_number, 2);
    assert_eq!(init.common.context_number_new, 2);
    Ok(())
}

#[test]
fn test_call_without_enough_balance_aborts() -> Result<(), HubError> {
    let hub = call_eoa(1, 5, 0, false)?;

    let call = section_of(&hub, SectionKind::Call)?;
    assert!(call.common.aborts.any());
    assert!(call.common.exceptions.none());
    assert_eq!(
        call.scenario,
        Some(Scenario::Call(CallScenario::AbortWontRevert))
    );
    assert!(call.child_frame.is_none());

    // Nothing moves: the caller is read, the callee only warmed.
    let accounts = accounts(call);
    assert_eq!(accounts.len(), 2);
    assert_eq!(accounts[0].before, accounts[0].after);
    assert_eq!(accounts[1].before.balance, accounts[1].after.balance);
    assert!(accounts[1].after.is_warm);
    Ok(())
}

// ==================== Failing callees ====================

#[test]
fn test_static_sstore_fails_the_callee() -> Result<(), HubError> {
    let callee = eoa();
    let world = world_with_contract(&[STATICCALL], 100)
        .with_account(callee, account(1, 0, &[SSTORE]));
    let mut run = Run::start(world, tx_to(contract(), 0))?;

    let root = root_frame(contract(), &[STATICCALL]);
    run.enter(&root)?;
    let before = with_stack(
        root.clone(),
        &[
            word(50_000),
            address_word(callee),
            U256::zero(),
            U256::zero(),
            U256::zero(),
            U256::zero(),
        ],
    );
    let after = with_stack(root.clone(), &[]);
    run.step(&before, &after)?;

    let mut child =
        FrameState::message_call(1, contract(), callee, vec![SSTORE].into(), 50_000);
    child.is_static = true;
    run.enter(&child)?;
    let sstore = with_stack(child, &[word(1), word(2)]);
    let rollbacks = run.hub.pending(Phase::PostRollback);
    run.hub.pre_opcode(&run.world, &sstore)?;
    // The write never happened, there is nothing to undo.
    assert_eq!(run.hub.pending(Phase::PostRollback), rollbacks);
    run.exit(&sstore)?;
    run.re_enter(&with_stack(after.clone(), &[U256::zero()]))?;

    let stop = at_pc(with_stack(after, &[U256::zero()]), 1);
    run.step(&stop, &stop)?;
    run.exit(&stop)?;
    let hub = run.finish(true, 60_000)?;

    assert_eq!(
        kinds(&hub)?,
        vec![
            SectionKind::TxInit,
            SectionKind::Call,
            SectionKind::Storage,
            SectionKind::Halt,
            SectionKind::TxFinalization
        ]
    );

    let call = section_of(&hub, SectionKind::Call)?;
    assert_eq!(
        call.scenario,
        Some(Scenario::Call(CallScenario::SmcFailureWontRevert))
    );
    assert!(call.child_frame.is_some());

    // The slot is never touched.
    let sstore = section_of(&hub, SectionKind::Storage)?;
    assert_eq!(sstore.common.exceptions, Exceptions::STATIC_FAULT);
    assert!(
        fragment_kinds(sstore)
            .iter()
            .all(|kind| matches!(kind, FragmentKind::Stack | FragmentKind::Context))
    );
    assert!(sstore.common.self_reverts);
    assert_eq!(sstore.common.revert_stamp, sstore.common.hub_stamp);
    assert_eq!(sstore.common.depth, 1);

    // The caller itself carried on.
    let stop = section_of(&hub, SectionKind::Halt)?;
    assert!(!stop.common.self_reverts);
    assert!(!stop.common.gets_reverted);
    Ok(())
}
