//! # zktracer-hub
//!
//! The Hub of a zkEVM tracer: it observes an EVM engine executing a batch of blocks (a
//! conflation) and produces the Hub trace, the central table every other module of the
//! arithmetization is tied to.
//!
//! ## Overview
//!
//! The engine drives a [`Hub`] through the [`Tracer`] hooks. For every instruction the Hub
//! classifies what happens (exceptions, aborts, satellite modules to invoke) and records a
//! [`section::TraceSection`]: the stack rows of the instruction followed by whatever context,
//! account, storage or transaction rows it needs. Rows that depend on the future (the outcome of
//! a child context, a revert further up the call stack, the gas refund at the end of the
//! transaction) are completed by deferred actions.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  hooks   ┌─────────────────────────────────────────────┐
//! │  EVM engine  │ ───────▶ │                     Hub                      │
//! └──────────────┘          │  ┌──────────┐ ┌───────────┐ ┌─────────────┐ │
//!        │                  │  │CallStack │ │ Deferred  │ │ Deployment  │ │
//!        │ WorldView,       │  │          │ │ registry  │ │ info        │ │
//!        │ MessageFrame     │  └──────────┘ └───────────┘ └─────────────┘ │
//!        └───────────────▶  │  ┌───────────────────────────────────────┐  │
//!                           │  │ State: tx → sections → fragments       │  │
//!                           │  └───────────────────────────────────────┘  │
//!                           └─────────────────────────────────────────────┘
//!                                       │ commit
//!                                       ▼
//!                                  [`TraceRow`]s
//! ```
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`tracer`] | Lifecycle hooks the engine calls |
//! | [`hub`] | The Hub itself |
//! | [`signals`] | Exceptions, aborts and module signals of an instruction |
//! | [`section`] | Sections and their builders |
//! | [`fragment`] | Row payloads |
//! | [`call_stack`] | Frames of the current transaction |
//! | [`defer`] | Actions completed at later checkpoints |
//! | [`state`] | Sections of the conflation and row materialization |
//! | [`rules`] | Fork-dependent parameters |

pub mod account_snapshot;
pub mod call_stack;
pub mod columns;
pub mod constants;
pub mod defer;
pub mod deployment_info;
pub mod errors;
pub mod fragment;
pub mod gas_cost;
pub mod gas_projector;
pub mod hub;
pub mod module;
pub mod opcodes;
pub mod rules;
pub mod section;
pub mod serde_utils;
pub mod signals;
pub mod state;
pub mod tracer;
pub mod utils;
pub mod world;

pub use columns::{ColumnHeader, TraceRow};
pub use errors::HubError;
pub use hub::Hub;
pub use module::{ModuleId, SatelliteModule, Satellites};
pub use rules::{Fork, RuleSet};
pub use tracer::{NoOpTracer, Tracer};
pub use world::{
    AccountState, BlockHeader, FrameState, FrameType, InMemoryWorld, MessageFrame,
    OperationOutcome, Transaction, TxOutcome, WorldView,
};
