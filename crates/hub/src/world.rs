//! Read-only views of the host engine's state, handed to every lifecycle hook.
//!
//! The Hub never mutates engine-owned state: [`WorldView`] and [`MessageFrame`] only expose
//! getters. [`InMemoryWorld`] and [`FrameState`] are plain-data implementations used by the
//! replay tool and the tests.

use std::collections::{BTreeMap, BTreeSet};

use bytes::Bytes;
use ethereum_types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub nonce: u64,
    pub balance: U256,
    #[serde(default, with = "crate::serde_utils::bytes")]
    pub code: Bytes,
}

impl AccountState {
    pub fn has_code(&self) -> bool {
        !self.code.is_empty()
    }

    /// EIP-7610 style collision: a deployment onto this account must fail.
    pub fn create_would_collide(&self) -> bool {
        self.has_code() || self.nonce != 0
    }

    pub fn is_empty(&self) -> bool {
        self.nonce == 0 && self.balance.is_zero() && self.code.is_empty()
    }
}

pub trait WorldView {
    /// `None` for accounts that do not exist.
    fn account(&self, address: Address) -> Option<AccountState>;
    fn storage(&self, address: Address, key: U256) -> U256;
    /// Value of the slot at the start of the current transaction.
    fn original_storage(&self, address: Address, key: U256) -> U256;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameType {
    MessageCall,
    ContractCreation,
}

/// The engine's current execution frame.
///
/// Stack positions are counted from the top: `stack_item(0)` is the top of the stack.
pub trait MessageFrame {
    fn depth(&self) -> usize;
    fn frame_type(&self) -> FrameType;
    fn is_static(&self) -> bool;
    fn sender(&self) -> Address;
    /// Account whose storage and balance the frame acts on.
    fn recipient(&self) -> Address;
    /// Account whose byte code the frame executes.
    fn code_address(&self) -> Address;
    fn value(&self) -> U256;
    fn code(&self) -> &Bytes;
    fn call_data(&self) -> &Bytes;
    fn pc(&self) -> usize;
    fn current_opcode(&self) -> u8;
    fn stack_size(&self) -> usize;
    fn stack_item(&self, depth: usize) -> Option<U256>;
    /// Active memory size in bytes, always a multiple of 32.
    fn memory_size(&self) -> usize;
    fn read_memory(&self, offset: usize, len: usize) -> Bytes;
    fn remaining_gas(&self) -> u64;
    fn gas_refund(&self) -> i64;
    fn return_data(&self) -> &Bytes;
    fn output_data(&self) -> &Bytes;
    fn is_address_warm(&self, address: Address) -> bool;
    fn is_storage_warm(&self, address: Address, key: U256) -> bool;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InMemoryAccount {
    #[serde(flatten)]
    pub state: AccountState,
    #[serde(default)]
    pub storage: BTreeMap<U256, U256>,
    /// Slots whose transaction-start value differs from `storage`.
    #[serde(default)]
    pub original_storage: BTreeMap<U256, U256>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InMemoryWorld {
    pub accounts: BTreeMap<Address, InMemoryAccount>,
}

impl InMemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, address: Address, state: AccountState) -> Self {
        self.set_account(address, state);
        self
    }

    pub fn set_account(&mut self, address: Address, state: AccountState) {
        self.accounts.entry(address).or_default().state = state;
    }

    pub fn set_balance(&mut self, address: Address, balance: U256) {
        self.accounts.entry(address).or_default().state.balance = balance;
    }

    pub fn set_nonce(&mut self, address: Address, nonce: u64) {
        self.accounts.entry(address).or_default().state.nonce = nonce;
    }

    pub fn set_code(&mut self, address: Address, code: Bytes) {
        self.accounts.entry(address).or_default().state.code = code;
    }

    pub fn set_storage(&mut self, address: Address, key: U256, value: U256) {
        self.accounts
            .entry(address)
            .or_default()
            .storage
            .insert(key, value);
    }

    pub fn remove_account(&mut self, address: Address) {
        self.accounts.remove(&address);
    }

    /// Freezes the current storage as the transaction-start values.
    pub fn commit_storage(&mut self) {
        for account in self.accounts.values_mut() {
            account.original_storage.clear();
        }
    }
}

impl WorldView for InMemoryWorld {
    fn account(&self, address: Address) -> Option<AccountState> {
        self.accounts
            .get(&address)
            .map(|account| account.state.clone())
    }

    fn storage(&self, address: Address, key: U256) -> U256 {
        self.accounts
            .get(&address)
            .and_then(|account| account.storage.get(&key).copied())
            .unwrap_or_default()
    }

    fn original_storage(&self, address: Address, key: U256) -> U256 {
        self.accounts
            .get(&address)
            .and_then(|account| {
                account
                    .original_storage
                    .get(&key)
                    .or_else(|| account.storage.get(&key))
                    .copied()
            })
            .unwrap_or_default()
    }
}

/// Plain-data frame, as recorded by a host engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameState {
    pub depth: usize,
    pub frame_type: FrameType,
    #[serde(default)]
    pub is_static: bool,
    pub sender: Address,
    pub recipient: Address,
    pub code_address: Address,
    #[serde(default)]
    pub value: U256,
    #[serde(default, with = "crate::serde_utils::bytes")]
    pub code: Bytes,
    #[serde(default, with = "crate::serde_utils::bytes")]
    pub call_data: Bytes,
    #[serde(default)]
    pub pc: usize,
    /// Bottom first, the last element is the top of the stack.
    #[serde(default)]
    pub stack: Vec<U256>,
    #[serde(default, with = "crate::serde_utils::bytes")]
    pub memory: Bytes,
    pub remaining_gas: u64,
    #[serde(default)]
    pub gas_refund: i64,
    #[serde(default, with = "crate::serde_utils::bytes")]
    pub return_data: Bytes,
    #[serde(default, with = "crate::serde_utils::bytes")]
    pub output_data: Bytes,
    #[serde(default)]
    pub warm_addresses: BTreeSet<Address>,
    #[serde(default)]
    pub warm_storage: BTreeSet<(Address, U256)>,
}

impl FrameState {
    pub fn message_call(
        depth: usize,
        sender: Address,
        recipient: Address,
        code: Bytes,
        remaining_gas: u64,
    ) -> Self {
        Self {
            depth,
            frame_type: FrameType::MessageCall,
            is_static: false,
            sender,
            recipient,
            code_address: recipient,
            value: U256::zero(),
            code,
            call_data: Bytes::new(),
            pc: 0,
            stack: Vec::new(),
            memory: Bytes::new(),
            remaining_gas,
            gas_refund: 0,
            return_data: Bytes::new(),
            output_data: Bytes::new(),
            warm_addresses: BTreeSet::from([sender, recipient]),
            warm_storage: BTreeSet::new(),
        }
    }

    pub fn contract_creation(
        depth: usize,
        sender: Address,
        created: Address,
        init_code: Bytes,
        remaining_gas: u64,
    ) -> Self {
        Self {
            frame_type: FrameType::ContractCreation,
            ..Self::message_call(depth, sender, created, init_code, remaining_gas)
        }
    }

    pub fn opcode(&self) -> u8 {
        self.code.get(self.pc).copied().unwrap_or_default()
    }

    /// Pushes `value` on top of the stack.
    pub fn push(&mut self, value: U256) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Option<U256> {
        self.stack.pop()
    }
}

impl MessageFrame for FrameState {
    fn depth(&self) -> usize {
        self.depth
    }

    fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    fn is_static(&self) -> bool {
        self.is_static
    }

    fn sender(&self) -> Address {
        self.sender
    }

    fn recipient(&self) -> Address {
        self.recipient
    }

    fn code_address(&self) -> Address {
        self.code_address
    }

    fn value(&self) -> U256 {
        self.value
    }

    fn code(&self) -> &Bytes {
        &self.code
    }

    fn call_data(&self) -> &Bytes {
        &self.call_data
    }

    fn pc(&self) -> usize {
        self.pc
    }

    fn current_opcode(&self) -> u8 {
        self.opcode()
    }

    fn stack_size(&self) -> usize {
        self.stack.len()
    }

    fn stack_item(&self, depth: usize) -> Option<U256> {
        self.stack.iter().rev().nth(depth).copied()
    }

    fn memory_size(&self) -> usize {
        self.memory.len()
    }

    fn read_memory(&self, offset: usize, len: usize) -> Bytes {
        let mut out = vec![0u8; len];
        if let Some(available) = self.memory.get(offset..) {
            let copied = available.len().min(len);
            if let (Some(target), Some(source)) = (out.get_mut(..copied), available.get(..copied)) {
                target.copy_from_slice(source);
            }
        }
        Bytes::from(out)
    }

    fn remaining_gas(&self) -> u64 {
        self.remaining_gas
    }

    fn gas_refund(&self) -> i64 {
        self.gas_refund
    }

    fn return_data(&self) -> &Bytes {
        &self.return_data
    }

    fn output_data(&self) -> &Bytes {
        &self.output_data
    }

    fn is_address_warm(&self, address: Address) -> bool {
        self.warm_addresses.contains(&address)
    }

    fn is_storage_warm(&self, address: Address, key: U256) -> bool {
        self.warm_storage.contains(&(address, key))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: Address,
    /// `None` for deployments.
    pub to: Option<Address>,
    pub nonce: u64,
    #[serde(default)]
    pub value: U256,
    pub gas_limit: u64,
    /// Effective gas price paid per unit of gas.
    pub gas_price: U256,
    /// Part of the gas price the coinbase receives.
    #[serde(default)]
    pub priority_fee_per_gas: U256,
    #[serde(default, with = "crate::serde_utils::bytes")]
    pub data: Bytes,
    #[serde(default)]
    pub access_list: Vec<(Address, Vec<H256>)>,
}

impl Transaction {
    pub fn is_deployment(&self) -> bool {
        self.to.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: u64,
    pub coinbase: Address,
    pub timestamp: u64,
    pub gas_limit: u64,
    #[serde(default)]
    pub base_fee: U256,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<H256>,
    #[serde(default, with = "crate::serde_utils::bytes")]
    pub data: Bytes,
}

/// What the engine reports at the end of a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutcome {
    pub success: bool,
    #[serde(default, with = "crate::serde_utils::bytes")]
    pub output: Bytes,
    #[serde(default)]
    pub logs: Vec<Log>,
    /// Gas consumed, refunds already deducted.
    pub gas_used: u64,
}

/// What the engine reports after executing one instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationOutcome {
    pub gas_cost: u64,
    #[serde(default)]
    pub halted_exceptionally: bool,
}
