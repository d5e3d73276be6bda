use serde::Serialize;

use crate::module::{ModuleCall, ModuleId};

/// The satellite calls ("inter-module communication") of one instruction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImcFragment {
    pub calls: Vec<ModuleCall>,
}

impl ImcFragment {
    pub fn new(calls: Vec<ModuleCall>) -> Self {
        Self { calls }
    }

    pub fn stamp_of(&self, module: ModuleId) -> Option<u32> {
        self.calls
            .iter()
            .find(|call| call.module == module)
            .map(|call| call.stamp)
    }
}
