//! Scripted engine runs for the Hub integration tests.
//!
//! There is no EVM here: every test lays out, hook by hook, what an engine would report while
//! executing its transaction. [`Run`] keeps the boilerplate of the conflation, block and
//! transaction hooks out of the way.

#![allow(dead_code)]

use bytes::Bytes;
use ethereum_types::{Address, U256};
use zktracer_hub::{
    AccountState, BlockHeader, FrameState, Hub, HubError, InMemoryWorld, OperationOutcome,
    TraceRow, Tracer, Transaction, TxOutcome,
    fragment::{AccountFragment, Fragment, FragmentKind},
    section::{SectionKind, TraceSection},
};

pub const GAS_PRICE: u64 = 10;
pub const TX_GAS_LIMIT: u64 = 1_000_000;
pub const FRAME_GAS: u64 = 900_000;

pub fn sender() -> Address {
    Address::from_low_u64_be(0xA11CE)
}

pub fn coinbase() -> Address {
    Address::from_low_u64_be(0xC0FFEE)
}

pub fn contract() -> Address {
    Address::from_low_u64_be(0xC0DE)
}

pub fn eoa() -> Address {
    Address::from_low_u64_be(0xB0B)
}

pub fn account(nonce: u64, balance: u64, code: &[u8]) -> AccountState {
    AccountState {
        nonce,
        balance: U256::from(balance),
        code: Bytes::copy_from_slice(code),
    }
}

/// The sender, rich, plus `contract()` running `code`.
pub fn world_with_contract(code: &[u8], balance: u64) -> InMemoryWorld {
    InMemoryWorld::new()
        .with_account(sender(), account(0, 1_000_000_000_000, &[]))
        .with_account(contract(), account(1, balance, code))
}

pub fn header() -> BlockHeader {
    BlockHeader {
        number: 1,
        coinbase: coinbase(),
        timestamp: 12,
        gas_limit: 30_000_000,
        base_fee: U256::from(7),
    }
}

pub fn tx_to(to: Address, value: u64) -> Transaction {
    Transaction {
        sender: sender(),
        to: Some(to),
        nonce: 0,
        value: U256::from(value),
        gas_limit: TX_GAS_LIMIT,
        gas_price: U256::from(GAS_PRICE),
        priority_fee_per_gas: U256::from(GAS_PRICE - 7),
        data: Bytes::new(),
        access_list: Vec::new(),
    }
}

/// The root frame of a message call from the sender to `to`.
pub fn root_frame(to: Address, code: &[u8]) -> FrameState {
    FrameState::message_call(0, sender(), to, Bytes::copy_from_slice(code), FRAME_GAS)
}

/// Stack of `frame`, given top first.
pub fn with_stack(mut frame: FrameState, top_first: &[U256]) -> FrameState {
    frame.stack = top_first.iter().rev().copied().collect();
    frame
}

pub fn at_pc(mut frame: FrameState, pc: usize) -> FrameState {
    frame.pc = pc;
    frame
}

pub fn word(value: u64) -> U256 {
    U256::from(value)
}

pub fn address_word(address: Address) -> U256 {
    U256::from_big_endian(address.as_bytes())
}

/// One transaction in a conflation of one block.
pub struct Run {
    pub hub: Hub,
    pub world: InMemoryWorld,
    pub tx: Transaction,
}

impl Run {
    pub fn start(world: InMemoryWorld, tx: Transaction) -> Result<Self, HubError> {
        Self::with_hub(Hub::default(), world, tx)
    }

    pub fn with_hub(mut hub: Hub, world: InMemoryWorld, tx: Transaction) -> Result<Self, HubError> {
        hub.start_conflation(1)?;
        hub.start_block(&header())?;
        hub.start_transaction(&world, &tx)?;
        Ok(Self { hub, world, tx })
    }

    pub fn enter(&mut self, frame: &FrameState) -> Result<(), HubError> {
        self.hub.context_enter(&self.world, frame)
    }

    /// Traces the instruction at `before.pc`; `after` is the frame once it executed.
    pub fn step(&mut self, before: &FrameState, after: &FrameState) -> Result<(), HubError> {
        self.hub.pre_opcode(&self.world, before)?;
        self.hub.post_execution(
            &self.world,
            after,
            OperationOutcome {
                gas_cost: before.remaining_gas.saturating_sub(after.remaining_gas),
                halted_exceptionally: false,
            },
        )
    }

    /// Traces an instruction that halts its frame exceptionally; the engine goes straight to
    /// the context exit.
    pub fn fail(&mut self, frame: &FrameState) -> Result<(), HubError> {
        self.hub.pre_opcode(&self.world, frame)?;
        self.hub.context_exit(&self.world, frame)
    }

    pub fn re_enter(&mut self, frame: &FrameState) -> Result<(), HubError> {
        self.hub.context_re_enter(&self.world, frame)
    }

    pub fn exit(&mut self, frame: &FrameState) -> Result<(), HubError> {
        self.hub.context_exit(&self.world, frame)
    }

    /// Ends the transaction, the block and the conflation.
    pub fn finish(mut self, success: bool, gas_used: u64) -> Result<Hub, HubError> {
        let outcome = TxOutcome {
            success,
            gas_used,
            ..Default::default()
        };
        self.hub.end_transaction(&self.world, &self.tx, &outcome)?;
        self.hub.end_block(&header(), std::slice::from_ref(&self.tx))?;
        self.hub.end_conflation(&self.world)?;
        Ok(self.hub)
    }
}

pub fn sections(hub: &Hub) -> Result<&[TraceSection], HubError> {
    Ok(hub.state().tx(0)?.sections())
}

pub fn kinds(hub: &Hub) -> Result<Vec<SectionKind>, HubError> {
    Ok(sections(hub)?.iter().map(|section| section.kind).collect())
}

pub fn section_of(hub: &Hub, kind: SectionKind) -> Result<&TraceSection, HubError> {
    sections(hub)?
        .iter()
        .find(|section| section.kind == kind)
        .ok_or(HubError::NoTransaction)
}

pub fn accounts(section: &TraceSection) -> Vec<&AccountFragment> {
    section
        .fragments
        .iter()
        .filter_map(Fragment::as_account)
        .collect()
}

pub fn fragment_kinds(section: &TraceSection) -> Vec<FragmentKind> {
    section.fragments.iter().map(Fragment::kind).collect()
}

pub fn rows(hub: &Hub) -> Result<Vec<TraceRow>, HubError> {
    let mut rows = Vec::new();
    hub.commit(|row| rows.push(row))?;
    Ok(rows)
}
