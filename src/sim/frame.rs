//! Stack-frame bookkeeping.
//!
//! A frame is recorded every time `sp` decreases through a
//! `sub sp, sp, #imm` stack operation and destroyed when `sp`
//! increases through the matching `add sp, sp, #imm`.
//!
//! Frames exist purely for observability (e.g., a frame display
//! in a debugger frontend). They impose no behavior on memory
//! access; the memory subsystem's checks apply regardless.

/// A recorded stack frame.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Frame {
    /// A unique, monotonically increasing frame id.
    pub id: u64,
    /// The stack pointer after the frame was created (the frame's low end).
    pub sp: u64,
    /// The frame's size in bytes. Always a multiple of 16.
    pub size: u64,
}
impl Frame {
    /// The address one past the frame's highest byte.
    pub fn top(&self) -> u64 {
        self.sp + self.size
    }
}

/// The list of live stack frames.
#[derive(Debug, Default, Clone)]
pub struct FrameStack {
    frames: Vec<Frame>,
    next_id: u64,
}

impl FrameStack {
    /// Creates an empty frame stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a frame of `size` bytes whose low end is the new `sp`.
    pub fn push(&mut self, sp: u64, size: u64) {
        let id = self.next_id;
        self.next_id += 1;
        self.frames.push(Frame { id, sp, size });
    }

    /// Destroys the frame released by an `sp` increase of `size` bytes.
    ///
    /// Prefers the most recent frame of exactly `size` bytes;
    /// otherwise destroys the frame with the lowest `sp` (the innermost one).
    /// Returns the destroyed frame, or `None` if no frames are live.
    pub fn pop(&mut self, size: u64) -> Option<Frame> {
        let idx = self.frames.iter()
            .rposition(|fr| fr.size == size)
            .or_else(|| {
                self.frames.iter()
                    .enumerate()
                    .min_by_key(|(_, fr)| fr.sp)
                    .map(|(i, _)| i)
            })?;
        Some(self.frames.remove(idx))
    }

    /// The live frames, in creation order.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// The number of live frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether no frames are live.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
