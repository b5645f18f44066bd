//! Native object registry.
//!
//! Maps backend-native handles to the single logical wrapper the runtime keeps
//! for them. The registry owns the wrappers; everything else refers to them by
//! [`NativeHandle`].

use std::{
    collections::{HashMap, hash_map::Entry},
    fmt,
    thread::{self, ThreadId},
};

use tracing::trace;

use crate::error::{LifecycleError, Result};

/// Opaque identity of a backend-owned object.
///
/// Only ever observed, never dereferenced: the backend decides when it is
/// created and when it dies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeHandle(u64);

impl NativeHandle {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Remembers which thread runs the event loop.
///
/// Debug builds refuse mutation from any other thread.
#[derive(Debug, Clone)]
pub struct LoopAffinity {
    owner: ThreadId,
}

impl LoopAffinity {
    pub fn current() -> Self {
        Self {
            owner: thread::current().id(),
        }
    }

    pub fn check(&self, what: &'static str) -> Result<()> {
        if cfg!(debug_assertions) {
            let actual = thread::current().id();
            if actual != self.owner {
                return Err(LifecycleError::ConcurrencyViolation {
                    what,
                    owner: self.owner,
                    actual,
                });
            }
        }
        Ok(())
    }
}

impl Default for LoopAffinity {
    fn default() -> Self {
        Self::current()
    }
}

/// Handle → wrapper table, one wrapper per handle.
#[derive(Debug)]
pub struct Registry<W> {
    kind: &'static str,
    entries: HashMap<NativeHandle, W>,
    affinity: LoopAffinity,
}

impl<W> Registry<W> {
    /// `kind` names the wrapper type in logs and concurrency errors.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
            affinity: LoopAffinity::current(),
        }
    }

    pub fn register(&mut self, handle: NativeHandle, wrapper: W) -> Result<&mut W> {
        self.affinity.check(self.kind)?;
        match self.entries.entry(handle) {
            Entry::Occupied(_) => Err(LifecycleError::DuplicateRegistration(handle)),
            Entry::Vacant(slot) => {
                trace!(kind = self.kind, %handle, "registered");
                Ok(slot.insert(wrapper))
            }
        }
    }

    pub fn lookup(&self, handle: NativeHandle) -> Option<&W> {
        self.entries.get(&handle)
    }

    pub fn lookup_mut(&mut self, handle: NativeHandle) -> Option<&mut W> {
        self.entries.get_mut(&handle)
    }

    /// Hands the wrapper back to the caller, who drops it.
    pub fn unregister(&mut self, handle: NativeHandle) -> Result<W> {
        self.affinity.check(self.kind)?;
        let wrapper = self
            .entries
            .remove(&handle)
            .ok_or(LifecycleError::NotRegistered(handle))?;
        trace!(kind = self.kind, %handle, "unregistered");
        Ok(wrapper)
    }

    pub fn contains(&self, handle: NativeHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered handles in ascending order.
    pub fn handles(&self) -> Vec<NativeHandle> {
        let mut handles: Vec<_> = self.entries.keys().copied().collect();
        handles.sort_unstable();
        handles
    }
}
