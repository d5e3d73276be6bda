use ethereum_types::{Address, U256};
use serde::Serialize;

use crate::fragment::DomSubStamps;

/// An SLOAD or SSTORE of one storage slot, or the undoing of one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageFragment {
    pub address: Address,
    pub deployment_number: u32,
    pub key: U256,
    pub value_original: U256,
    pub value_current: U256,
    pub value_next: U256,
    pub warm_before: bool,
    pub warm_after: bool,
    pub dom_sub: DomSubStamps,
    pub is_sstore: bool,
}

impl StorageFragment {
    pub fn undo(&self, dom_sub: DomSubStamps) -> Self {
        Self {
            value_current: self.value_next,
            value_next: self.value_current,
            warm_before: self.warm_after,
            warm_after: self.warm_before,
            dom_sub,
            ..self.clone()
        }
    }
}
