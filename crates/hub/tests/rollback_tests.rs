//! Reverts across contexts: a callee that reverts on its own, and a caller that reverts after
//! its callee succeeded.

mod common;

use common::*;
use ethereum_types::U256;
use zktracer_hub::{
    FrameState, Hub, HubError,
    fragment::{CallScenario, DomSubStamps, Fragment, Scenario},
    section::SectionKind,
};

const CALL: u8 = 0xF1;
const SSTORE: u8 = 0x55;
const STOP: u8 = 0x00;
const REVERT: u8 = 0xFD;

/// `contract()` sends 5 wei to `eoa()`, here a contract that stores 7 at slot 1 and ends with
/// `callee_end`; the caller then ends with `caller_end`.
fn nested(callee_end: u8, caller_end: u8) -> Result<Hub, HubError> {
    let caller_code = [CALL, caller_end];
    let callee_code = [SSTORE, callee_end];
    let world = world_with_contract(&caller_code, 100)
        .with_account(eoa(), account(1, 0, &callee_code));
    let mut run = Run::start(world, tx_to(contract(), 0))?;

    let root = root_frame(contract(), &caller_code);
    run.enter(&root)?;
    let call = with_stack(
        root.clone(),
        &[
            word(50_000),
            address_word(eoa()),
            word(5),
            U256::zero(),
            U256::zero(),
            U256::zero(),
            U256::zero(),
        ],
    );
    let after_call = with_stack(root, &[]);
    run.step(&call, &after_call)?;

    let mut child = FrameState::message_call(
        1,
        contract(),
        eoa(),
        callee_code.to_vec().into(),
        50_000,
    );
    child.value = word(5);
    run.enter(&child)?;
    let sstore = with_stack(child.clone(), &[word(1), word(7)]);
    let end = at_pc(with_stack(child, &[U256::zero(), U256::zero()]), 1);
    run.step(&sstore, &end)?;
    run.step(&end, &end)?;
    run.exit(&end)?;

    let result = if callee_end == REVERT { U256::zero() } else { U256::one() };
    run.re_enter(&with_stack(after_call.clone(), &[result]))?;
    let back = at_pc(with_stack(after_call, &[U256::zero(), U256::zero(), result]), 1);
    run.step(&back, &back)?;
    run.exit(&back)?;
    run.finish(caller_end != REVERT, 120_000)
}

fn storage_dom_subs(hub: &Hub) -> Result<Vec<DomSubStamps>, HubError> {
    Ok(section_of(hub, SectionKind::Storage)?
        .fragments
        .iter()
        .filter_map(Fragment::as_storage)
        .map(|storage| storage.dom_sub)
        .collect())
}

// ==================== Callee reverts ====================

#[test]
fn test_reverting_callee_undoes_its_own_writes() -> Result<(), HubError> {
    let hub = nested(REVERT, STOP)?;

    assert_eq!(
        kinds(&hub)?,
        vec![
            SectionKind::TxInit,
            SectionKind::Call,
            SectionKind::Storage,
            SectionKind::Halt,
            SectionKind::Halt,
            SectionKind::TxFinalization
        ]
    );
    assert_eq!(
        storage_dom_subs(&hub)?,
        vec![
            DomSubStamps::standard(3, 2),
            DomSubStamps::revert_with_current(3, 4, 3)
        ]
    );

    let sstore = section_of(&hub, SectionKind::Storage)?;
    assert!(sstore.common.self_reverts);
    assert_eq!(sstore.common.revert_stamp, 4);
    assert_eq!(sstore.common.context_number, 3);
    Ok(())
}

#[test]
fn test_failed_call_gives_the_value_back() -> Result<(), HubError> {
    let hub = nested(REVERT, STOP)?;

    let call = section_of(&hub, SectionKind::Call)?;
    assert_eq!(
        call.scenario,
        Some(Scenario::Call(CallScenario::SmcFailureWontRevert))
    );
    assert!(!call.common.self_reverts);

    let accounts = accounts(call);
    assert_eq!(accounts.len(), 4);
    let (caller_back, callee_back) = (accounts[2], accounts[3]);
    assert_eq!(caller_back.before.balance, U256::from(95));
    assert_eq!(caller_back.after.balance, U256::from(100));
    assert_eq!(callee_back.before.balance, U256::from(5));
    assert_eq!(callee_back.after.balance, U256::zero());
    // The callee stays warm: only balances are given back.
    assert!(callee_back.after.is_warm);
    assert_eq!(caller_back.dom_sub, DomSubStamps::reverts_with_child(2, 4, 8));
    assert_eq!(callee_back.dom_sub, DomSubStamps::reverts_with_child(2, 4, 9));
    Ok(())
}

// ==================== Caller reverts ====================

#[test]
fn test_reverting_caller_takes_its_callee_down() -> Result<(), HubError> {
    let hub = nested(STOP, REVERT)?;

    let sstore = section_of(&hub, SectionKind::Storage)?;
    assert!(!sstore.common.self_reverts);
    assert!(sstore.common.gets_reverted);
    assert_eq!(sstore.common.revert_stamp, 5);
    assert_eq!(
        storage_dom_subs(&hub)?,
        vec![
            DomSubStamps::standard(3, 2),
            DomSubStamps::revert_with_current(3, 5, 3)
        ]
    );

    let call = section_of(&hub, SectionKind::Call)?;
    assert_eq!(
        call.scenario,
        Some(Scenario::Call(CallScenario::SmcSuccessWillRevert))
    );
    assert!(call.common.self_reverts);
    let undone: Vec<_> = accounts(call)
        .into_iter()
        .filter(|account| account.dom_sub.dom == 16 * 5 + 8)
        .collect();
    assert_eq!(undone.len(), 2);
    assert_eq!(undone[0].after.balance, U256::from(100));
    assert_eq!(undone[1].after.balance, U256::zero());
    Ok(())
}

#[test]
fn test_undo_rows_sort_after_what_they_undo() -> Result<(), HubError> {
    let hub = nested(STOP, REVERT)?;

    for section in sections(&hub)? {
        let stamps: Vec<DomSubStamps> = section
            .fragments
            .iter()
            .filter_map(|fragment| match fragment {
                Fragment::Account(account) => Some(account.dom_sub),
                Fragment::Storage(storage) => Some(storage.dom_sub),
                _ => None,
            })
            .collect();
        assert!(
            stamps.windows(2).all(|pair| pair[0] < pair[1]),
            "unordered stamps in {:?}: {stamps:?}",
            section.kind
        );
    }
    Ok(())
}
