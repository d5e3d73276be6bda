use ethereum_types::U256;
use serde::Serialize;

use crate::constants::STACK_ITEMS_PER_LINE;
use crate::module::ModuleCall;
use crate::opcodes::{InstructionFamily, OpcodeData};
use crate::signals::{Aborts, Exceptions};
use crate::world::MessageFrame;

/// Result slot of a stack row.
///
/// Values an instruction pushes are only known once it executed, so the row is appended
/// `Latched` and filled in exactly once afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "value")]
pub enum StackResult {
    #[default]
    None,
    Latched,
    Unlatched(U256),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StackItem {
    /// Position from the top of the stack before the instruction.
    pub depth: usize,
    pub value: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackFragment {
    pub instruction: OpcodeData,
    /// 1-based index of this row among the instruction's stack rows.
    pub line: usize,
    pub lines: usize,
    pub height: usize,
    pub height_new: usize,
    pub items: Vec<StackItem>,
    pub result: StackResult,
    pub exceptions: Exceptions,
    pub aborts: Aborts,
    /// Satellite calls of instructions whose section has no IMC row.
    pub module_calls: Vec<ModuleCall>,
    pub static_gas: u64,
}

/// Stack items an instruction reads, top first.
fn read_positions(data: &OpcodeData) -> Vec<usize> {
    match data.family {
        InstructionFamily::Dup => data
            .opcode
            .dup_depth()
            .map(|depth| vec![depth - 1])
            .unwrap_or_default(),
        InstructionFamily::Swap => data
            .opcode
            .swap_depth()
            .map(|depth| vec![0, depth])
            .unwrap_or_default(),
        _ => (0..data.alpha).collect(),
    }
}

/// Builds the stack rows of an instruction about to execute in `frame`.
pub fn stack_rows(
    data: OpcodeData,
    frame: &dyn MessageFrame,
    exceptions: Exceptions,
    aborts: Aborts,
    static_gas: u64,
) -> Vec<StackFragment> {
    let height = frame.stack_size();
    let stack_ok = !exceptions.stack_exception() && !exceptions.invalid_opcode();
    let height_new = if stack_ok {
        height - data.alpha + data.delta
    } else {
        height
    };

    let items: Vec<StackItem> = if stack_ok {
        read_positions(&data)
            .into_iter()
            .filter_map(|depth| {
                frame
                    .stack_item(depth)
                    .map(|value| StackItem { depth, value })
            })
            .collect()
    } else {
        Vec::new()
    };

    let lines = data.stack_lines();
    let mut chunks: Vec<Vec<StackItem>> = items
        .chunks(STACK_ITEMS_PER_LINE)
        .map(<[StackItem]>::to_vec)
        .collect();
    chunks.resize(lines, Vec::new());

    let pushes = stack_ok && exceptions.none() && data.delta > 0;
    chunks
        .into_iter()
        .enumerate()
        .map(|(index, items)| {
            let line = index + 1;
            StackFragment {
                instruction: data,
                line,
                lines,
                height,
                height_new,
                items,
                result: if pushes && line == lines {
                    StackResult::Latched
                } else {
                    StackResult::None
                },
                exceptions,
                aborts,
                module_calls: Vec::new(),
                static_gas,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use ethereum_types::Address;

    use super::*;
    use crate::opcodes::Opcode;
    use crate::world::FrameState;

    #[test]
    fn call_rows_split_items_and_latch_last_line() {
        let mut frame = FrameState::message_call(0, Address::zero(), Address::zero(), Bytes::new(), 0);
        frame.stack = (1..=7).rev().map(U256::from).collect();

        let rows = stack_rows(
            Opcode::CALL.data(),
            &frame,
            Exceptions::NONE,
            Aborts::default(),
            100,
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].items.len(), 4);
        assert_eq!(rows[1].items.len(), 3);
        assert_eq!(rows[0].items[0].value, U256::one());
        assert_eq!(rows[0].result, StackResult::None);
        assert_eq!(rows[1].result, StackResult::Latched);
        assert_eq!(rows[1].height_new, 1);
    }

    #[test]
    fn faulty_stack_reads_nothing() {
        let frame = FrameState::message_call(0, Address::zero(), Address::zero(), Bytes::new(), 0);
        let rows = stack_rows(
            Opcode::ADD.data(),
            &frame,
            Exceptions::STACK_UNDERFLOW,
            Aborts::default(),
            3,
        );
        assert_eq!(rows.len(), 1);
        assert!(rows[0].items.is_empty());
        assert_eq!(rows[0].result, StackResult::None);
    }
}
