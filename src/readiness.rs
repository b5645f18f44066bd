//! Render-readiness sequencing.
//!
//! An output existing is not the same as an output being safe to render. The
//! render window announces that it attached a viewport for the output, and the
//! backend announces frames; either can come first. The first viewport attach
//! selects a mode, enables the output and commits; the output only counts as
//! renderable once that commit succeeded and a frame has been seen.

use std::collections::BTreeMap;

use tracing::{debug, info, trace, warn};

use crate::{
    backend::OutputControl,
    error::{LifecycleError, Result},
    registry::{LoopAffinity, NativeHandle},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enablement {
    Uninitialized,
    PendingFirstCommit,
    Enabled,
    /// The enablement commit failed; the output stays disabled.
    Rejected,
}

#[derive(Debug, Clone, Copy)]
struct OutputReadiness {
    enablement: Enablement,
    viewport_attached: bool,
    frame_seen: bool,
}

impl OutputReadiness {
    fn new() -> Self {
        Self {
            enablement: Enablement::Uninitialized,
            viewport_attached: false,
            frame_seen: false,
        }
    }

    fn is_renderable(&self) -> bool {
        self.enablement == Enablement::Enabled && self.frame_seen
    }
}

#[derive(Debug, Default)]
pub struct RenderReadiness {
    outputs: BTreeMap<NativeHandle, OutputReadiness>,
    affinity: LoopAffinity,
}

impl RenderReadiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, output: NativeHandle) -> Result<()> {
        self.affinity.check("render readiness")?;
        self.outputs.entry(output).or_insert_with(OutputReadiness::new);
        Ok(())
    }

    pub fn forget(&mut self, output: NativeHandle) -> Result<()> {
        self.affinity.check("render readiness")?;
        self.outputs.remove(&output);
        Ok(())
    }

    /// The render window attached a viewport for `output`.
    ///
    /// Returns `None` for outputs that are not tracked (already removed).
    pub fn viewport_initialized(
        &mut self,
        output: NativeHandle,
        control: &mut dyn OutputControl,
    ) -> Result<Option<Enablement>> {
        self.affinity.check("render readiness")?;
        let Some(state) = self.outputs.get_mut(&output) else {
            debug!(%output, "viewport for an output that is gone, ignoring");
            return Ok(None);
        };
        state.viewport_attached = true;
        if state.enablement != Enablement::Uninitialized {
            return Ok(Some(state.enablement));
        }

        state.enablement = Enablement::PendingFirstCommit;
        if control.current_mode(output).is_none() {
            if let Some(mode) = control.preferred_mode(output) {
                debug!(%output, width = mode.width, height = mode.height, "selecting preferred mode");
                control.set_mode(output, mode);
            }
        }
        control.set_enabled(output, true);

        // The flag flips only after the commit, so a frame cannot race the mode set.
        if control.commit(output) {
            state.enablement = Enablement::Enabled;
            info!("✅ Output {} enabled", output);
            Ok(Some(Enablement::Enabled))
        } else {
            state.enablement = Enablement::Rejected;
            control.set_enabled(output, false);
            warn!("Output {} rejected its enablement commit, leaving it disabled", output);
            Err(LifecycleError::CommitRejected(output))
        }
    }

    /// The backend produced a frame for `output`. Returns whether it is now renderable.
    pub fn frame(&mut self, output: NativeHandle) -> Result<bool> {
        self.affinity.check("render readiness")?;
        let Some(state) = self.outputs.get_mut(&output) else {
            return Ok(false);
        };
        if !state.frame_seen {
            trace!(%output, "first frame");
        }
        state.frame_seen = true;
        Ok(state.is_renderable())
    }

    pub fn enablement(&self, output: NativeHandle) -> Option<Enablement> {
        self.outputs.get(&output).map(|state| state.enablement)
    }

    pub fn is_viewport_attached(&self, output: NativeHandle) -> bool {
        self.outputs
            .get(&output)
            .is_some_and(|state| state.viewport_attached)
    }

    pub fn is_renderable(&self, output: NativeHandle) -> bool {
        self.outputs
            .get(&output)
            .is_some_and(OutputReadiness::is_renderable)
    }

    pub fn renderable_outputs(&self) -> Vec<NativeHandle> {
        self.outputs
            .iter()
            .filter(|(_, state)| state.is_renderable())
            .map(|(output, _)| *output)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessBackend;
    use crate::object::Mode;

    const MODE: Mode = Mode::new(1920, 1080, 60_000);

    fn setup(preferred: Option<Mode>) -> (RenderReadiness, HeadlessBackend, NativeHandle) {
        let output = NativeHandle::from_raw(10);
        let mut backend = HeadlessBackend::new();
        backend.connect_output(output, preferred);
        let mut readiness = RenderReadiness::new();
        readiness.track(output).unwrap();
        (readiness, backend, output)
    }

    #[test]
    fn attach_then_frame() {
        let (mut readiness, mut backend, output) = setup(Some(MODE));

        assert_eq!(
            readiness.viewport_initialized(output, &mut backend).unwrap(),
            Some(Enablement::Enabled)
        );
        assert!(!readiness.is_renderable(output));
        assert!(readiness.frame(output).unwrap());
        assert_eq!(backend.commit_count(output), 1);
        assert_eq!(backend.current_mode(output), Some(MODE));
    }

    #[test]
    fn frame_then_attach() {
        let (mut readiness, mut backend, output) = setup(Some(MODE));

        assert!(!readiness.frame(output).unwrap());
        readiness.viewport_initialized(output, &mut backend).unwrap();
        readiness.viewport_initialized(output, &mut backend).unwrap();

        assert!(readiness.is_renderable(output));
        assert_eq!(backend.commit_count(output), 1);
    }

    #[test]
    fn existing_mode_is_kept() {
        let (mut readiness, mut backend, output) = setup(Some(MODE));
        let custom = Mode::new(1280, 720, 60_000);
        backend.set_mode(output, custom);
        backend.commit(output);

        readiness.viewport_initialized(output, &mut backend).unwrap();
        assert_eq!(backend.current_mode(output), Some(custom));
    }

    #[test]
    fn rejected_commit_leaves_output_disabled() {
        let (mut readiness, mut backend, output) = setup(None);

        assert_eq!(
            readiness.viewport_initialized(output, &mut backend).unwrap_err(),
            LifecycleError::CommitRejected(output)
        );
        readiness.frame(output).unwrap();

        assert_eq!(readiness.enablement(output), Some(Enablement::Rejected));
        assert!(!backend.is_enabled(output));
        assert!(readiness.renderable_outputs().is_empty());
        // No second attempt.
        assert_eq!(
            readiness.viewport_initialized(output, &mut backend).unwrap(),
            Some(Enablement::Rejected)
        );
    }

    #[test]
    fn untracked_output_is_ignored() {
        let mut readiness = RenderReadiness::new();
        let mut backend = HeadlessBackend::new();
        let output = NativeHandle::from_raw(99);

        assert_eq!(readiness.viewport_initialized(output, &mut backend).unwrap(), None);
        assert!(!readiness.frame(output).unwrap());
    }
}
