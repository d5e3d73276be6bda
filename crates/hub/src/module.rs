//! Satellite modules the Hub delegates specialized computations to.
//!
//! The Hub only depends on the [`SatelliteModule`] contract: a module is told about every
//! instruction that needs it, before and after execution, and answers with a stamp that ties
//! its own trace to the Hub's rows.

use std::fmt::Debug;

use rustc_hash::FxHashMap;
use serde::Serialize;
use strum::{Display, EnumIter, IntoEnumIterator};

use crate::world::MessageFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleId {
    Add,
    Mul,
    Exp,
    Mod,
    Ext,
    Wcp,
    Bin,
    Shf,
    Mxp,
    Oob,
    Stp,
    Mmu,
    Trm,
    RlpAddr,
    HashInfo,
    RomLex,
    LogInfo,
    LogData,
    BlockHash,
    BlockData,
}

pub trait SatelliteModule: Debug {
    fn id(&self) -> ModuleId;

    /// Called before the instruction executes. Returns the module's stamp for this call.
    fn trace_pre_opcode(&mut self, frame: &dyn MessageFrame) -> u32;

    /// Called once the instruction's effect is visible. Returns the stamp of the matching
    /// `trace_pre_opcode` call.
    fn trace_post_opcode(&mut self, _frame: &dyn MessageFrame) -> u32 {
        self.stamp()
    }

    fn stamp(&self) -> u32;

    fn line_count(&self) -> usize;
}

/// Stamp of one module call, as recorded in the Hub's rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModuleCall {
    pub module: ModuleId,
    pub stamp: u32,
}

/// Module that only keeps count of its calls, each call costing a fixed number of rows.
#[derive(Debug, Clone)]
pub struct CountingModule {
    id: ModuleId,
    rows_per_call: usize,
    stamp: u32,
}

impl CountingModule {
    pub fn new(id: ModuleId, rows_per_call: usize) -> Self {
        Self {
            id,
            rows_per_call,
            stamp: 0,
        }
    }
}

impl SatelliteModule for CountingModule {
    fn id(&self) -> ModuleId {
        self.id
    }

    fn trace_pre_opcode(&mut self, _frame: &dyn MessageFrame) -> u32 {
        self.stamp = self.stamp.saturating_add(1);
        self.stamp
    }

    fn stamp(&self) -> u32 {
        self.stamp
    }

    fn line_count(&self) -> usize {
        usize::try_from(self.stamp)
            .unwrap_or(usize::MAX)
            .saturating_mul(self.rows_per_call)
    }
}

fn rows_per_call(id: ModuleId) -> usize {
    match id {
        ModuleId::Add | ModuleId::Bin | ModuleId::Wcp | ModuleId::Shf => 16,
        ModuleId::Mul | ModuleId::Mod | ModuleId::Ext => 32,
        ModuleId::Exp | ModuleId::Mmu => 8,
        ModuleId::Mxp | ModuleId::Trm | ModuleId::Stp => 4,
        ModuleId::Oob => 3,
        ModuleId::RlpAddr => 8,
        ModuleId::HashInfo | ModuleId::RomLex => 1,
        ModuleId::LogInfo | ModuleId::LogData => 1,
        ModuleId::BlockHash | ModuleId::BlockData => 1,
    }
}

/// The set of satellite modules plugged into a Hub.
#[derive(Debug, Default)]
pub struct Satellites {
    modules: FxHashMap<ModuleId, Box<dyn SatelliteModule>>,
}

impl Satellites {
    pub fn empty() -> Self {
        Self::default()
    }

    /// A [`CountingModule`] for every [`ModuleId`].
    pub fn standard() -> Self {
        ModuleId::iter().fold(Self::empty(), |satellites, id| {
            satellites.with_module(Box::new(CountingModule::new(id, rows_per_call(id))))
        })
    }

    pub fn with_module(mut self, module: Box<dyn SatelliteModule>) -> Self {
        self.modules.insert(module.id(), module);
        self
    }

    pub fn get(&self, id: ModuleId) -> Option<&dyn SatelliteModule> {
        self.modules.get(&id).map(|module| module.as_ref())
    }

    /// Runs `trace_pre_opcode` on every requested module that is plugged in.
    pub fn trace_pre_opcode(&mut self, ids: &[ModuleId], frame: &dyn MessageFrame) -> Vec<ModuleCall> {
        ids.iter()
            .filter_map(|id| {
                self.modules.get_mut(id).map(|module| ModuleCall {
                    module: *id,
                    stamp: module.trace_pre_opcode(frame),
                })
            })
            .collect()
    }

    pub fn trace_post_opcode(&mut self, ids: &[ModuleId], frame: &dyn MessageFrame) {
        for id in ids {
            if let Some(module) = self.modules.get_mut(id) {
                module.trace_post_opcode(frame);
            }
        }
    }

    /// Rows each plugged module reports, sorted by module.
    pub fn line_counts(&self) -> Vec<(ModuleId, usize)> {
        let mut counts: Vec<_> = self
            .modules
            .iter()
            .map(|(id, module)| (*id, module.line_count()))
            .collect();
        counts.sort_by_key(|(id, _)| *id);
        counts
    }
}
