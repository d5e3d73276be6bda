//! SLOAD and SSTORE rows, and their undoing when the frame reverts.

mod common;

use common::*;
use ethereum_types::U256;
use zktracer_hub::{
    Hub, HubError, InMemoryWorld,
    fragment::{DomSubStamps, Fragment, StorageFragment},
    section::{SectionKind, TraceSection},
};

const SLOAD: u8 = 0x54;
const SSTORE: u8 = 0x55;
const REVERT: u8 = 0xFD;

fn storage_rows(section: &TraceSection) -> Vec<&StorageFragment> {
    section
        .fragments
        .iter()
        .filter_map(Fragment::as_storage)
        .collect()
}

fn world(code: &[u8]) -> InMemoryWorld {
    let mut world = world_with_contract(code, 0);
    world.set_storage(contract(), word(1), word(3));
    world
}

/// Runs the first instruction of `code` on `stack`, leaving `pushed` behind, then its second
/// instruction on an empty memory span.
fn run_two(
    code: &[u8],
    stack: &[U256],
    pushed: &[U256],
    success: bool,
) -> Result<Hub, HubError> {
    let mut run = Run::start(world(code), tx_to(contract(), 0))?;
    let root = root_frame(contract(), code);
    run.enter(&root)?;

    let before = with_stack(root.clone(), stack);
    let mut after = with_stack(root, pushed);
    after.remaining_gas -= 22_100;
    run.step(&before, &after)?;

    let second = at_pc(with_stack(after, &[U256::zero(), U256::zero()]), 1);
    run.step(&second, &second)?;
    run.exit(&second)?;
    run.finish(success, 50_000)
}

// ==================== Accesses ====================

#[test]
fn test_sstore_records_the_slot_transition() -> Result<(), HubError> {
    let hub = run_two(&[SSTORE], &[word(1), word(7)], &[], true)?;

    let section = section_of(&hub, SectionKind::Storage)?;
    let rows = storage_rows(section);
    assert_eq!(rows.len(), 1);
    let row = rows[0];
    assert!(row.is_sstore);
    assert_eq!(row.address, contract());
    assert_eq!(row.key, word(1));
    assert_eq!(row.value_original, word(3));
    assert_eq!(row.value_current, word(3));
    assert_eq!(row.value_next, word(7));
    assert!(!row.warm_before);
    assert!(row.warm_after);
    assert_eq!(row.dom_sub, DomSubStamps::standard(2, 2));
    Ok(())
}

#[test]
fn test_sload_leaves_the_slot_alone() -> Result<(), HubError> {
    let hub = run_two(&[SLOAD], &[word(1)], &[word(3)], true)?;

    let section = section_of(&hub, SectionKind::Storage)?;
    let rows = storage_rows(section);
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].is_sstore);
    assert_eq!(rows[0].value_current, rows[0].value_next);
    assert_eq!(rows[0].value_next, word(3));
    Ok(())
}

// ==================== Rollbacks ====================

#[test]
fn test_reverted_sstore_is_undone() -> Result<(), HubError> {
    let hub = run_two(&[SSTORE, REVERT], &[word(1), word(7)], &[], false)?;

    let section = section_of(&hub, SectionKind::Storage)?;
    assert!(section.common.self_reverts);
    assert_eq!(section.common.revert_stamp, 3);

    let rows = storage_rows(section);
    assert_eq!(rows.len(), 2);
    let (write, undo) = (rows[0], rows[1]);
    assert_eq!(undo.value_current, write.value_next);
    assert_eq!(undo.value_next, write.value_current);
    assert_eq!(undo.warm_before, write.warm_after);
    assert_eq!(undo.warm_after, write.warm_before);
    assert_eq!(undo.dom_sub, DomSubStamps::revert_with_current(2, 3, 3));
    assert!(undo.dom_sub > write.dom_sub);
    Ok(())
}

#[test]
fn test_surviving_sstore_is_not_undone() -> Result<(), HubError> {
    let hub = run_two(&[SSTORE], &[word(1), word(7)], &[], true)?;

    let section = section_of(&hub, SectionKind::Storage)?;
    assert!(!section.common.self_reverts);
    assert!(!section.common.gets_reverted);
    assert_eq!(storage_rows(section).len(), 1);
    Ok(())
}
