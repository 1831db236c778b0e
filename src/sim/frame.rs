//! The return stack.
//!
//! `CALL` pushes a [`Frame`] onto the [`FrameStack`] and `RET` pops it.
//! This stack is explicit, so jumps and calls never grow the host call stack.

use super::env::EnvId;

/// Where execution continues after a return.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct Frame {
    /// The statement index to return to.
    pub return_index: usize,

    /// The environment to return to.
    ///
    /// A frame holds a reference to this environment,
    /// which keeps it alive until the frame is popped.
    pub env: EnvId
}

/// The stack of return frames.
#[derive(Debug, Default)]
pub struct FrameStack {
    frames: Vec<Frame>
}
impl FrameStack {
    /// Creates a new, empty frame stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the current number of frames entered.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Tests whether the frame stack is at top level execution.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Gets the list of current frames.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub(super) fn push_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub(super) fn pop_frame(&mut self) -> Option<Frame> {
        self.frames.pop()
    }
}
