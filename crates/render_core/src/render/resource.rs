//! # Render Resources
//!
//! A render resource is an object with GPU-side state that is created, updated and
//! destroyed only on the rendering thread. Producer threads own the CPU-side data
//! and drive the lifecycle through [`ResourceHandle`]:
//!
//! ```text
//! Uninitialized --init_resource--> Initialized --release_resource--> Uninitialized
//!                                       |  ^
//!                                       +--+ update_resource (release + init)
//! ```
//!
//! Each lifecycle call enqueues a command; the hook runs when the rendering thread
//! reaches it. Called with the [`RenderContext`] as sink, the hook runs immediately.
//!
//! Every resource that has been initialized is registered in the context's
//! [`GlobalResourceList`] until it is released, so teardown and device loss can
//! release everything still alive.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::render::command_queue::RenderCommandSink;
use crate::render::context::RenderContext;
use crate::render::RenderResult;

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique resource identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u64);

impl ResourceId {
    fn next() -> Self {
        Self(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// GPU-side lifecycle hooks. Only ever called on the rendering thread.
pub trait RenderResource: Send + 'static {
    /// Create the RHI objects
    fn init_rhi(&mut self, context: &mut RenderContext) -> RenderResult<()>;

    /// Destroy the RHI objects
    fn release_rhi(&mut self, context: &mut RenderContext);

    /// Recreate the RHI objects from the current CPU-side data
    fn update_rhi(&mut self, context: &mut RenderContext) -> RenderResult<()> {
        self.release_rhi(context);
        self.init_rhi(context)
    }
}

struct ResourceSlot<R> {
    id: ResourceId,
    name: String,
    initialized: AtomicBool,
    in_global_list: AtomicBool,
    resource: Mutex<R>,
}

impl<R> ResourceSlot<R> {
    fn lock(&self) -> MutexGuard<'_, R> {
        self.resource.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Type-erased view of a resource registered in the global list
pub(crate) trait GlobalResource: Send + Sync {
    fn id(&self) -> ResourceId;
    fn name(&self) -> &str;
    fn release_for_teardown(&self, context: &mut RenderContext);
}

impl<R: RenderResource> GlobalResource for ResourceSlot<R> {
    fn id(&self) -> ResourceId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn release_for_teardown(&self, context: &mut RenderContext) {
        if self.initialized.swap(false, Ordering::AcqRel) {
            self.lock().release_rhi(context);
        }
        self.in_global_list.store(false, Ordering::Release);
    }
}

/// Registry of initialized resources, in initialization order
#[derive(Default)]
pub struct GlobalResourceList {
    resources: Vec<Arc<dyn GlobalResource>>,
}

impl GlobalResourceList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered resources
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// True when the resource is registered
    pub fn contains(&self, id: ResourceId) -> bool {
        self.resources.iter().any(|resource| resource.id() == id)
    }

    /// Names of the registered resources
    pub fn names(&self) -> Vec<String> {
        self.resources.iter().map(|resource| resource.name().to_string()).collect()
    }

    pub(crate) fn add(&mut self, resource: Arc<dyn GlobalResource>) {
        self.resources.push(resource);
    }

    pub(crate) fn remove(&mut self, id: ResourceId) -> bool {
        let before = self.resources.len();
        self.resources.retain(|resource| resource.id() != id);
        before != self.resources.len()
    }

    pub(crate) fn take_all(&mut self) -> Vec<Arc<dyn GlobalResource>> {
        std::mem::take(&mut self.resources)
    }
}

impl std::fmt::Debug for GlobalResourceList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.resources.iter().map(|resource| resource.name())).finish()
    }
}

/// Shared handle to a render resource
pub struct ResourceHandle<R: RenderResource> {
    slot: Arc<ResourceSlot<R>>,
}

impl<R: RenderResource> ResourceHandle<R> {
    /// Wrap CPU-side resource data. The resource starts uninitialized.
    pub fn new(name: impl Into<String>, resource: R) -> Self {
        Self {
            slot: Arc::new(ResourceSlot {
                id: ResourceId::next(),
                name: name.into(),
                initialized: AtomicBool::new(false),
                in_global_list: AtomicBool::new(false),
                resource: Mutex::new(resource),
            }),
        }
    }

    /// Resource identity
    pub fn id(&self) -> ResourceId {
        self.slot.id
    }

    /// Debug name
    pub fn name(&self) -> &str {
        &self.slot.name
    }

    /// True once `init_rhi` has succeeded and until release
    pub fn is_initialized(&self) -> bool {
        self.slot.initialized.load(Ordering::Acquire)
    }

    /// True while registered in the global resource list
    pub fn is_in_global_list(&self) -> bool {
        self.slot.in_global_list.load(Ordering::Acquire)
    }

    /// True when both handles refer to the same resource
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }

    /// Access the resource regardless of its lifecycle state (CPU-side data)
    pub fn lock(&self) -> MutexGuard<'_, R> {
        self.slot.lock()
    }

    /// Access an initialized resource for drawing.
    ///
    /// # Panics
    ///
    /// Panics if the resource has not been initialized on the rendering thread.
    #[track_caller]
    pub fn get(&self) -> MutexGuard<'_, R> {
        assert!(
            self.is_initialized(),
            "render resource '{}' used before it was initialized on the rendering thread",
            self.slot.name
        );
        self.slot.lock()
    }

    /// Initialize the resource on the rendering thread
    pub fn init_resource(&self, sink: &mut impl RenderCommandSink) {
        let handle = self.clone();
        sink.submit("InitResource", move |context| handle.init_now(context));
    }

    /// Release the resource on the rendering thread
    pub fn release_resource(&self, sink: &mut impl RenderCommandSink) {
        let handle = self.clone();
        sink.submit("ReleaseResource", move |context| handle.release_now(context));
    }

    /// Recreate the RHI objects on the rendering thread. No-op unless initialized.
    pub fn update_resource(&self, sink: &mut impl RenderCommandSink) {
        let handle = self.clone();
        sink.submit("UpdateResource", move |context| handle.update_now(context));
    }

    pub(crate) fn init_now(&self, context: &mut RenderContext) {
        if self.is_initialized() {
            log::trace!("[RESOURCE] '{}' already initialized", self.slot.name);
            return;
        }

        if !self.slot.in_global_list.swap(true, Ordering::AcqRel) {
            let entry: Arc<dyn GlobalResource> = self.slot.clone();
            context.global_resources_mut().add(entry);
        }

        let mut resource = self.slot.lock();
        match resource.init_rhi(context) {
            Ok(()) => {
                self.slot.initialized.store(true, Ordering::Release);
                log::debug!("[RESOURCE] initialized '{}'", self.slot.name);
            }
            Err(err) => log::error!("[RESOURCE] failed to initialize '{}': {}", self.slot.name, err),
        }
    }

    pub(crate) fn release_now(&self, context: &mut RenderContext) {
        assert!(
            self.is_in_global_list(),
            "render resource '{}' released while not initialized (double release?)",
            self.slot.name
        );

        if self.slot.initialized.swap(false, Ordering::AcqRel) {
            self.slot.lock().release_rhi(context);
        }
        context.global_resources_mut().remove(self.slot.id);
        self.slot.in_global_list.store(false, Ordering::Release);
        log::debug!("[RESOURCE] released '{}'", self.slot.name);
    }

    pub(crate) fn update_now(&self, context: &mut RenderContext) {
        if !self.is_initialized() {
            log::trace!("[RESOURCE] update of uninitialized '{}' ignored", self.slot.name);
            return;
        }

        let mut resource = self.slot.lock();
        if let Err(err) = resource.update_rhi(context) {
            self.slot.initialized.store(false, Ordering::Release);
            log::error!("[RESOURCE] failed to update '{}': {}", self.slot.name, err);
        } else {
            log::debug!("[RESOURCE] updated '{}'", self.slot.name);
        }
    }
}

impl<R: RenderResource> Clone for ResourceHandle<R> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<R: RenderResource> std::fmt::Debug for ResourceHandle<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("id", &self.slot.id)
            .field("name", &self.slot.name)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RenderCoreConfig;
    use crate::render::command_queue::RenderCommandQueue;
    use crate::render::rhi::{NullRhi, ResourceUsage, RhiResource, VertexBufferRhi};

    struct CountingResource {
        data: Vec<u8>,
        buffer: Option<VertexBufferRhi>,
        inits: usize,
        releases: usize,
    }

    impl CountingResource {
        fn new() -> Self {
            Self {
                data: vec![0; 32],
                buffer: None,
                inits: 0,
                releases: 0,
            }
        }
    }

    impl RenderResource for CountingResource {
        fn init_rhi(&mut self, context: &mut RenderContext) -> RenderResult<()> {
            let buffer = context
                .device_mut()
                .rhi_mut()
                .create_vertex_buffer("counting", &self.data, ResourceUsage::Static)?;
            self.buffer = Some(buffer);
            self.inits += 1;
            Ok(())
        }

        fn release_rhi(&mut self, context: &mut RenderContext) {
            if let Some(buffer) = self.buffer.take() {
                context.device_mut().rhi_mut().release(RhiResource::VertexBuffer(buffer));
            }
            self.releases += 1;
        }
    }

    fn context() -> RenderContext {
        RenderContext::new(RenderCoreConfig::default(), Box::new(NullRhi::new()))
    }

    #[test]
    fn test_init_is_deferred_until_the_queue_runs() {
        let mut queue = RenderCommandQueue::new();
        let handle = ResourceHandle::new("Deferred", CountingResource::new());
        handle.init_resource(&mut queue);
        assert!(!handle.is_initialized());

        let mut ctx = context();
        let _consumer = queue.attach_consumer();
        queue.execute_pending(&mut ctx);
        assert!(handle.is_initialized());
        assert!(handle.is_in_global_list());
        assert!(ctx.global_resources().contains(handle.id()));
        assert!(handle.get().buffer.is_some());
    }

    #[test]
    fn test_init_is_idempotent() {
        let mut ctx = context();
        let handle = ResourceHandle::new("Twice", CountingResource::new());
        handle.init_resource(&mut ctx);
        handle.init_resource(&mut ctx);
        assert_eq!(handle.get().inits, 1);
        assert_eq!(ctx.global_resources().len(), 1);
    }

    #[test]
    fn test_update_is_noop_unless_initialized() {
        let mut ctx = context();
        let handle = ResourceHandle::new("Update", CountingResource::new());
        handle.update_resource(&mut ctx);
        assert_eq!(handle.lock().inits, 0);
        assert!(!handle.is_initialized());

        handle.init_resource(&mut ctx);
        handle.update_resource(&mut ctx);
        let resource = handle.get();
        assert_eq!(resource.inits, 2);
        assert_eq!(resource.releases, 1);
    }

    #[test]
    fn test_release_removes_from_global_list() {
        let mut ctx = context();
        let handle = ResourceHandle::new("Release", CountingResource::new());
        handle.init_resource(&mut ctx);
        handle.release_resource(&mut ctx);
        assert!(!handle.is_initialized());
        assert!(!handle.is_in_global_list());
        assert!(ctx.global_resources().is_empty());
        assert_eq!(handle.lock().releases, 1);
    }

    #[test]
    #[should_panic(expected = "released while not initialized")]
    fn test_double_release_panics() {
        let mut ctx = context();
        let handle = ResourceHandle::new("DoubleRelease", CountingResource::new());
        handle.init_resource(&mut ctx);
        handle.release_resource(&mut ctx);
        handle.release_resource(&mut ctx);
    }

    #[test]
    #[should_panic(expected = "used before it was initialized")]
    fn test_use_before_init_panics() {
        let handle = ResourceHandle::new("Early", CountingResource::new());
        drop(handle.get());
    }

    #[test]
    fn test_failed_init_leaves_resource_uninitialized() {
        let mut rhi = NullRhi::new();
        rhi.set_fail_creations(true);
        let mut ctx = RenderContext::new(RenderCoreConfig::default(), Box::new(rhi));
        let handle = ResourceHandle::new("Failing", CountingResource::new());
        handle.init_resource(&mut ctx);
        assert!(!handle.is_initialized());
        // Still registered so the owner's release stays balanced
        assert!(handle.is_in_global_list());
        handle.release_resource(&mut ctx);
        assert!(ctx.global_resources().is_empty());
    }

    #[test]
    fn test_shutdown_releases_every_global_resource() {
        let mut ctx = context();
        let handles: Vec<_> = (0..3)
            .map(|i| ResourceHandle::new(format!("Global{i}"), CountingResource::new()))
            .collect();
        for handle in &handles {
            handle.init_resource(&mut ctx);
        }
        assert_eq!(ctx.global_resources().len(), 3);

        ctx.shutdown();
        assert!(ctx.global_resources().is_empty());
        for handle in &handles {
            assert!(!handle.is_initialized());
            assert!(!handle.is_in_global_list());
            assert_eq!(handle.lock().releases, 1);
        }
        let rhi = ctx.device().backend::<NullRhi>().unwrap();
        assert_eq!(rhi.live_resource_count(), 0);
    }
}
