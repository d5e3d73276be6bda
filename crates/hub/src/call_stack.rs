//! Arena of the execution frames of one transaction.
//!
//! Frames are never removed from the arena: exiting a frame only pops it from the stack of live
//! frames, so reverts discovered later can still walk the whole subtree.

use ethereum_types::{Address, U256};
use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::errors::HubError;
use crate::fragment::MemorySpan;
use crate::section::SectionId;
use crate::world::FrameType;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, derive_more::Display,
)]
pub struct FrameId(pub usize);

/// Everything known about a frame when it is entered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub context_number: u32,
    pub frame_type: FrameType,
    pub is_static: bool,
    pub caller_address: Address,
    pub account_address: Address,
    pub account_deployment_number: u32,
    pub byte_code_address: Address,
    pub byte_code_deployment_number: u32,
    pub byte_code_deployment_status: bool,
    pub value: U256,
    pub call_data: MemorySpan,
    /// Region of the parent's memory that receives the output.
    pub return_at: MemorySpan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFrame {
    pub id: FrameId,
    pub parent: Option<FrameId>,
    pub children: Vec<FrameId>,
    pub depth: usize,
    pub descriptor: FrameDescriptor,
    /// Hub stamp of the instruction (or transaction phase) that created the frame.
    pub entry_stamp: u32,
    /// Section of the CALL/CREATE that spawned the most recent child.
    pub child_spanning_section: Option<SectionId>,
    pub self_reverts: bool,
    pub gets_reverted: bool,
    pub revert_stamp: Option<u32>,
    pub exited: bool,
}

impl CallFrame {
    pub fn context_number(&self) -> u32 {
        self.descriptor.context_number
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_deployment(&self) -> bool {
        self.descriptor.frame_type == FrameType::ContractCreation
    }

    pub fn is_reverted(&self) -> bool {
        self.self_reverts || self.gets_reverted
    }
}

#[derive(Debug, Clone, Default)]
pub struct CallStack {
    frames: Vec<CallFrame>,
    live: Vec<FrameId>,
    context_numbers: FxHashSet<u32>,
}

impl CallStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the next entered frame will receive.
    pub fn future_id(&self) -> FrameId {
        FrameId(self.frames.len())
    }

    pub fn depth(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn enter(
        &mut self,
        descriptor: FrameDescriptor,
        entry_stamp: u32,
    ) -> Result<FrameId, HubError> {
        if !self.context_numbers.insert(descriptor.context_number) {
            return Err(HubError::DuplicateContext(descriptor.context_number));
        }

        let id = self.future_id();
        let parent = self.live.last().copied();
        if let Some(parent) = parent {
            self.get_mut(parent)?.children.push(id);
        }
        self.frames.push(CallFrame {
            id,
            parent,
            children: Vec::new(),
            depth: self.live.len(),
            descriptor,
            entry_stamp,
            child_spanning_section: None,
            self_reverts: false,
            gets_reverted: false,
            revert_stamp: None,
            exited: false,
        });
        self.live.push(id);
        Ok(id)
    }

    pub fn exit(&mut self) -> Result<FrameId, HubError> {
        let id = self.live.pop().ok_or(HubError::EmptyCallStack)?;
        self.get_mut(id)?.exited = true;
        Ok(id)
    }

    /// Marks the current frame and every frame nested within it as reverted at `stamp`.
    ///
    /// Frames that already carry a revert stamp keep it.
    pub fn revert(&mut self, stamp: u32) -> Result<(), HubError> {
        let current = self.current_id()?;
        let frame = self.get_mut(current)?;
        if frame.revert_stamp.is_none() {
            frame.self_reverts = true;
            frame.revert_stamp = Some(stamp);
        }

        let mut pending = frame.children.clone();
        while let Some(id) = pending.pop() {
            let descendant = self.get_mut(id)?;
            if descendant.revert_stamp.is_none() {
                descendant.gets_reverted = true;
                descendant.revert_stamp = Some(stamp);
            }
            pending.extend(descendant.children.iter().copied());
        }
        Ok(())
    }

    pub fn current_id(&self) -> Result<FrameId, HubError> {
        self.live.last().copied().ok_or(HubError::EmptyCallStack)
    }

    pub fn current(&self) -> Result<&CallFrame, HubError> {
        self.get(self.current_id()?)
    }

    pub fn current_mut(&mut self) -> Result<&mut CallFrame, HubError> {
        let id = self.current_id()?;
        self.get_mut(id)
    }

    pub fn parent(&self) -> Option<&CallFrame> {
        self.current()
            .ok()
            .and_then(|frame| frame.parent)
            .and_then(|parent| self.frames.get(parent.0))
    }

    pub fn get(&self, id: FrameId) -> Result<&CallFrame, HubError> {
        self.frames.get(id.0).ok_or(HubError::UnknownFrame(id))
    }

    pub fn get_mut(&mut self, id: FrameId) -> Result<&mut CallFrame, HubError> {
        self.frames.get_mut(id.0).ok_or(HubError::UnknownFrame(id))
    }

    pub fn last_child(&self, id: FrameId) -> Result<Option<&CallFrame>, HubError> {
        let frame = self.get(id)?;
        frame
            .children
            .last()
            .map(|child| self.get(*child))
            .transpose()
    }

    /// Order in which rollbacks of `id`'s subtree resolve: innermost frames first, later
    /// siblings before earlier ones, `id` itself last.
    pub fn rollback_order(&self, id: FrameId) -> Result<Vec<FrameId>, HubError> {
        let mut order = Vec::new();
        self.collect_post_order(id, &mut order)?;
        Ok(order)
    }

    fn collect_post_order(&self, id: FrameId, order: &mut Vec<FrameId>) -> Result<(), HubError> {
        for child in self.get(id)?.children.iter().rev() {
            self.collect_post_order(*child, order)?;
        }
        order.push(id);
        Ok(())
    }

    pub fn frames(&self) -> &[CallFrame] {
        &self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(context_number: u32) -> FrameDescriptor {
        FrameDescriptor {
            context_number,
            frame_type: FrameType::MessageCall,
            is_static: false,
            caller_address: Address::zero(),
            account_address: Address::from_low_u64_be(u64::from(context_number)),
            account_deployment_number: 0,
            byte_code_address: Address::from_low_u64_be(u64::from(context_number)),
            byte_code_deployment_number: 0,
            byte_code_deployment_status: false,
            value: U256::zero(),
            call_data: MemorySpan::default(),
            return_at: MemorySpan::default(),
        }
    }

    #[test]
    fn enter_and_exit_track_parents() -> Result<(), HubError> {
        let mut stack = CallStack::new();
        let root = stack.enter(descriptor(1), 0)?;
        let child = stack.enter(descriptor(5), 4)?;

        assert_eq!(stack.current_id()?, child);
        assert_eq!(stack.parent().map(|frame| frame.id), Some(root));
        assert_eq!(stack.current()?.depth, 1);

        assert_eq!(stack.exit()?, child);
        assert_eq!(stack.current_id()?, root);
        assert!(stack.get(child)?.exited);
        assert_eq!(stack.exit()?, root);
        assert_eq!(stack.exit(), Err(HubError::EmptyCallStack));
        Ok(())
    }

    #[test]
    fn context_numbers_are_unique() -> Result<(), HubError> {
        let mut stack = CallStack::new();
        stack.enter(descriptor(1), 0)?;
        assert_eq!(
            stack.enter(descriptor(1), 0),
            Err(HubError::DuplicateContext(1))
        );
        Ok(())
    }

    #[test]
    fn revert_marks_subtree_once() -> Result<(), HubError> {
        let mut stack = CallStack::new();
        let root = stack.enter(descriptor(1), 0)?;
        let child = stack.enter(descriptor(3), 2)?;
        stack.revert(7)?;
        stack.exit()?;
        let sibling = stack.enter(descriptor(9), 8)?;
        stack.exit()?;

        stack.revert(12)?;
        stack.revert(13)?;

        let child = stack.get(child)?;
        assert!(child.self_reverts && !child.gets_reverted);
        assert_eq!(child.revert_stamp, Some(7));

        let sibling = stack.get(sibling)?;
        assert!(sibling.gets_reverted && !sibling.self_reverts);
        assert_eq!(sibling.revert_stamp, Some(12));

        assert_eq!(stack.get(root)?.revert_stamp, Some(12));
        Ok(())
    }

    #[test]
    fn rollback_order_is_innermost_first() -> Result<(), HubError> {
        let mut stack = CallStack::new();
        let root = stack.enter(descriptor(1), 0)?;
        let first = stack.enter(descriptor(2), 1)?;
        let nested = stack.enter(descriptor(3), 2)?;
        stack.exit()?;
        stack.exit()?;
        let second = stack.enter(descriptor(4), 3)?;
        stack.exit()?;

        assert_eq!(stack.rollback_order(root)?, vec![second, nested, first, root]);
        Ok(())
    }
}
