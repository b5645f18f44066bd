use std::{fmt, thread::ThreadId};

use thiserror::Error;

use crate::registry::NativeHandle;

pub type Result<T, E = LifecycleError> = std::result::Result<T, E>;

/// Everything that can go wrong between the backend and the object model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("display could not allocate global `{interface}` (version {version})")]
    BackendUnavailable {
        interface: &'static str,
        version: u32,
    },

    #[error("failed to create renderer: {0}")]
    RendererUnavailable(String),

    #[error("surface {0} was never observed")]
    UnknownSurface(NativeHandle),

    #[error("native handle {0} is not in the live set")]
    NotLive(NativeHandle),

    #[error("native handle {0} already has a wrapper")]
    DuplicateRegistration(NativeHandle),

    #[error("native handle {0} has no wrapper")]
    NotRegistered(NativeHandle),

    #[error("{what} mutated from thread {actual:?}, owned by {owner:?}")]
    ConcurrencyViolation {
        what: &'static str,
        owner: ThreadId,
        actual: ThreadId,
    },

    #[error("output {0} rejected its enablement commit")]
    CommitRejected(NativeHandle),

    #[error("invalid seat operation on input device {device}: {fault}")]
    InvalidSeatOperation {
        device: NativeHandle,
        fault: SeatFault,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeatFault {
    AlreadyAttached,
    NotAttached,
    /// The seat could not take the device's capabilities.
    Refused(String),
}

impl fmt::Display for SeatFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeatFault::AlreadyAttached => f.write_str("device is already attached"),
            SeatFault::NotAttached => f.write_str("device is not attached"),
            SeatFault::Refused(reason) => write!(f, "seat refused the device: {}", reason),
        }
    }
}

/// How far an error is allowed to travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Fatal at startup, surfaced to the process entry point.
    ResourceExhaustion,
    /// Broken invariant between the core and the backend; stops the loop.
    Consistency,
    /// Confined to one output or device; logged and recorded.
    Transient,
}

impl LifecycleError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            LifecycleError::BackendUnavailable { .. } | LifecycleError::RendererUnavailable(_) => {
                ErrorCategory::ResourceExhaustion
            }
            LifecycleError::UnknownSurface(_)
            | LifecycleError::NotLive(_)
            | LifecycleError::DuplicateRegistration(_)
            | LifecycleError::NotRegistered(_)
            | LifecycleError::ConcurrencyViolation { .. } => ErrorCategory::Consistency,
            LifecycleError::CommitRejected(_) | LifecycleError::InvalidSeatOperation { .. } => {
                ErrorCategory::Transient
            }
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.category() != ErrorCategory::Transient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_taxonomy() {
        let h = NativeHandle::from_raw(7);
        assert_eq!(
            LifecycleError::RendererUnavailable("no gpu".into()).category(),
            ErrorCategory::ResourceExhaustion
        );
        assert_eq!(LifecycleError::NotLive(h).category(), ErrorCategory::Consistency);
        assert_eq!(LifecycleError::CommitRejected(h).category(), ErrorCategory::Transient);
        assert!(LifecycleError::UnknownSurface(h).is_fatal());
        assert!(
            !LifecycleError::InvalidSeatOperation {
                device: h,
                fault: SeatFault::NotAttached
            }
            .is_fatal()
        );
    }

    #[test]
    fn messages_name_the_handle() {
        let err = LifecycleError::DuplicateRegistration(NativeHandle::from_raw(0x2a));
        assert_eq!(err.to_string(), "native handle 0x2a already has a wrapper");
    }
}
