use ethereum_types::{Address, U256};
use serde::Serialize;
use strum::Display;

use crate::call_stack::{CallFrame, FrameDescriptor};
use crate::fragment::MemorySpan;
use crate::world::FrameType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ContextPurpose {
    /// Reads the context the instruction executes in.
    ReadCurrent,
    /// Initializes a freshly entered context.
    Initialize,
    /// Sets the return data of `context_number` to nothing.
    EmptyReturnData,
    /// Sets the return data of `context_number` to `return_data` of `return_data_context`.
    ProvideReturnData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextFragment {
    pub purpose: ContextPurpose,
    pub context_number: u32,
    pub caller_context_number: u32,
    pub depth: usize,
    pub is_static: bool,
    pub is_root: bool,
    pub is_deployment: bool,
    pub account_address: Address,
    pub account_deployment_number: u32,
    pub byte_code_address: Address,
    pub byte_code_deployment_number: u32,
    pub byte_code_deployment_status: bool,
    pub caller_address: Address,
    pub value: U256,
    pub call_data: MemorySpan,
    pub return_at: MemorySpan,
    pub return_data_context: u32,
    pub return_data: MemorySpan,
}

impl ContextFragment {
    /// Row describing a context that may not be entered yet.
    pub fn from_descriptor(
        purpose: ContextPurpose,
        descriptor: &FrameDescriptor,
        depth: usize,
        caller_context_number: u32,
    ) -> Self {
        Self {
            purpose,
            context_number: descriptor.context_number,
            caller_context_number,
            depth,
            is_static: descriptor.is_static,
            is_root: depth == 0,
            is_deployment: descriptor.frame_type == FrameType::ContractCreation,
            account_address: descriptor.account_address,
            account_deployment_number: descriptor.account_deployment_number,
            byte_code_address: descriptor.byte_code_address,
            byte_code_deployment_number: descriptor.byte_code_deployment_number,
            byte_code_deployment_status: descriptor.byte_code_deployment_status,
            caller_address: descriptor.caller_address,
            value: descriptor.value,
            call_data: descriptor.call_data,
            return_at: descriptor.return_at,
            return_data_context: 0,
            return_data: MemorySpan::default(),
        }
    }

    fn describe(purpose: ContextPurpose, frame: &CallFrame, caller_context_number: u32) -> Self {
        Self::from_descriptor(purpose, &frame.descriptor, frame.depth, caller_context_number)
    }

    pub fn read_current(frame: &CallFrame, caller_context_number: u32) -> Self {
        Self::describe(ContextPurpose::ReadCurrent, frame, caller_context_number)
    }

    pub fn initialize(frame: &CallFrame, caller_context_number: u32) -> Self {
        Self::describe(ContextPurpose::Initialize, frame, caller_context_number)
    }

    /// Clears the return data of `frame`, e.g. when a child context fails to provide any.
    pub fn empty_return_data(frame: &CallFrame, caller_context_number: u32) -> Self {
        Self::describe(ContextPurpose::EmptyReturnData, frame, caller_context_number)
    }

    /// `frame` receives `span` of the memory of context `returner` as its return data.
    pub fn provide_return_data(
        frame: &CallFrame,
        caller_context_number: u32,
        returner: u32,
        span: MemorySpan,
    ) -> Self {
        Self {
            return_data_context: returner,
            return_data: span,
            ..Self::describe(ContextPurpose::ProvideReturnData, frame, caller_context_number)
        }
    }
}
