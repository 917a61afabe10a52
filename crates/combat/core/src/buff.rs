//! Buff collaborator interface.
//!
//! Buffs themselves live outside this crate. Modifiers and control effects only
//! need to know how many stacks a buff currently has and whether it still
//! exists, which is expressed with [`StackSource`] behind a `Weak` pointer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::ids::BuffId;

/// Provider of a live stack count.
pub trait StackSource: Send + Sync {
    fn current_stacks(&self) -> u32;
}

/// Minimal thread-safe buff: an id and an atomically updated stack count.
#[derive(Debug)]
pub struct BuffStacks {
    id: BuffId,
    stacks: AtomicU32,
}

impl BuffStacks {
    pub fn new(id: BuffId, stacks: u32) -> Arc<Self> {
        Arc::new(Self {
            id,
            stacks: AtomicU32::new(stacks),
        })
    }

    pub fn id(&self) -> BuffId {
        self.id
    }

    pub fn set_stacks(&self, stacks: u32) {
        self.stacks.store(stacks, Ordering::Release);
    }

    /// Adds `delta` stacks and returns the new count.
    pub fn add_stacks(&self, delta: u32) -> u32 {
        self.stacks.fetch_add(delta, Ordering::AcqRel) + delta
    }
}

impl StackSource for BuffStacks {
    fn current_stacks(&self) -> u32 {
        self.stacks.load(Ordering::Acquire)
    }
}
