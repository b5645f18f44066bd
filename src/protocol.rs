//! Protocol globals and the live surface sets they own.

use std::marker::PhantomData;

use tracing::{debug, info};

use crate::{
    backend::{DisplayContext, GlobalId},
    disposal::{Disposal, DisposalQueue},
    error::{LifecycleError, Result},
    object::Surface,
    registry::{LoopAffinity, NativeHandle, Registry},
    ui::UiLayer,
};

/// A shell protocol whose clients create surfaces.
pub trait ShellProtocol {
    const INTERFACE_NAME: &'static str;
    const DEFAULT_VERSION: u32;
}

#[derive(Debug, Clone, Copy)]
pub struct XdgShell;

impl ShellProtocol for XdgShell {
    const INTERFACE_NAME: &'static str = "xdg_wm_base";
    const DEFAULT_VERSION: u32 = 2;
}

/// Insertion-ordered set of live surfaces.
#[derive(Debug, Default)]
pub struct LiveSet {
    members: Vec<NativeHandle>,
    affinity: LoopAffinity,
}

impl LiveSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: NativeHandle) -> Result<()> {
        self.affinity.check("live set")?;
        if self.members.contains(&handle) {
            return Err(LifecycleError::DuplicateRegistration(handle));
        }
        self.members.push(handle);
        Ok(())
    }

    pub fn remove(&mut self, handle: NativeHandle) -> Result<()> {
        self.affinity.check("live set")?;
        let index = self
            .members
            .iter()
            .position(|member| *member == handle)
            .ok_or(LifecycleError::NotLive(handle))?;
        self.members.remove(index);
        Ok(())
    }

    /// Empties the set, returning the former members in insertion order.
    pub fn take_all(&mut self) -> Result<Vec<NativeHandle>> {
        self.affinity.check("live set")?;
        Ok(std::mem::take(&mut self.members))
    }

    pub fn contains(&self, handle: NativeHandle) -> bool {
        self.members.contains(&handle)
    }

    pub fn as_slice(&self) -> &[NativeHandle] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// One published protocol capability and the surfaces its clients created.
#[derive(Debug)]
pub struct ProtocolGlobal<P> {
    global: GlobalId,
    version: u32,
    live: LiveSet,
    _protocol: PhantomData<P>,
}

impl<P: ShellProtocol> ProtocolGlobal<P> {
    pub fn create(display: &mut dyn DisplayContext, version: u32) -> Result<Self> {
        let global = display.register_global(P::INTERFACE_NAME, version)?;
        info!("✅ Published {} v{} as {}", P::INTERFACE_NAME, version, global);
        Ok(Self {
            global,
            version,
            live: LiveSet::new(),
            _protocol: PhantomData,
        })
    }

    pub fn interface_name(&self) -> &'static str {
        P::INTERFACE_NAME
    }

    pub fn global(&self) -> GlobalId {
        self.global
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn live_surfaces(&self) -> &[NativeHandle] {
        self.live.as_slice()
    }

    pub(crate) fn live_mut(&mut self) -> &mut LiveSet {
        &mut self.live
    }

    /// Tears down every remaining surface, then releases the global.
    ///
    /// Each surface is announced as removed and scheduled for disposal in
    /// insertion order before the global disappears from the display.
    pub fn destroy(
        mut self,
        display: &mut dyn DisplayContext,
        surfaces: &mut Registry<Surface>,
        ui: &mut dyn UiLayer,
        disposal: &mut DisposalQueue,
    ) -> Result<usize> {
        let remaining = self.live.take_all()?;
        for &handle in &remaining {
            let surface = surfaces
                .lookup_mut(handle)
                .ok_or(LifecycleError::UnknownSurface(handle))?;
            surface.take_destroy_watch();
            ui.surface_removed(surface);
            disposal.schedule(Disposal::Surface(handle))?;
        }

        display.remove_global(self.global);
        debug!(
            interface = P::INTERFACE_NAME,
            surfaces = remaining.len(),
            "released {}",
            self.global
        );
        Ok(remaining.len())
    }
}
