//! End-of-cycle disposal.
//!
//! Destroy notifications never free a wrapper directly: other observers of the
//! same notification may still hold its handle in this cycle. Instead the
//! wrapper is scheduled here and the runtime drains the queue once per event
//! loop iteration. Scheduled disposals cannot be cancelled.

use std::collections::VecDeque;

use crate::{error::Result, registry::LoopAffinity, registry::NativeHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposal {
    Surface(NativeHandle),
    Output(NativeHandle),
    InputDevice(NativeHandle),
}

impl Disposal {
    pub fn handle(self) -> NativeHandle {
        match self {
            Disposal::Surface(handle) | Disposal::Output(handle) | Disposal::InputDevice(handle) => {
                handle
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct DisposalQueue {
    pending: VecDeque<Disposal>,
    affinity: LoopAffinity,
}

impl DisposalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, disposal: Disposal) -> Result<()> {
        self.affinity.check("disposal queue")?;
        self.pending.push_back(disposal);
        Ok(())
    }

    pub fn is_scheduled(&self, disposal: Disposal) -> bool {
        self.pending.contains(&disposal)
    }

    /// Everything scheduled so far, in scheduling order.
    pub fn take(&mut self) -> Result<Vec<Disposal>> {
        self.affinity.check("disposal queue")?;
        Ok(self.pending.drain(..).collect())
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
