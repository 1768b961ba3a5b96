//! # Render Context
//!
//! Everything the rendering thread owns, passed explicitly to every render command:
//!
//! - [`RenderDevice`]: the RHI backend and the bound shader state cache, the part
//!   draw code needs
//! - the [`GlobalResourceList`] of initialized resources
//! - the scenes, addressed by [`SceneId`]
//! - the configuration the rendering thread was started with

use crate::core::RenderCoreConfig;
use crate::foundation::hash::FxHashMap;
use crate::render::bound_shader_state::{BoundShaderStateCache, BoundShaderStateKey};
use crate::render::resource::GlobalResourceList;
use crate::render::rhi::{BoundShaderStateRhi, Rhi, RhiResource};
use crate::render::RenderResult;
use crate::scene::{FrameStats, PrimitiveRef, Scene, SceneId, SceneRenderer, SceneView};

/// The RHI backend plus device-level caches
pub struct RenderDevice {
    rhi: Box<dyn Rhi>,
    bound_shader_states: BoundShaderStateCache,
}

impl RenderDevice {
    /// Wrap a backend
    pub fn new(rhi: Box<dyn Rhi>) -> Self {
        Self {
            rhi,
            bound_shader_states: BoundShaderStateCache::new(),
        }
    }

    /// The backend
    pub fn rhi(&self) -> &dyn Rhi {
        self.rhi.as_ref()
    }

    /// The backend (mutable)
    pub fn rhi_mut(&mut self) -> &mut dyn Rhi {
        self.rhi.as_mut()
    }

    /// Downcast the backend to its concrete type
    pub fn backend<T: Rhi + 'static>(&self) -> Option<&T> {
        self.rhi.as_any().downcast_ref::<T>()
    }

    /// Downcast the backend to its concrete type (mutable)
    pub fn backend_mut<T: Rhi + 'static>(&mut self) -> Option<&mut T> {
        self.rhi.as_any_mut().downcast_mut::<T>()
    }

    /// Cached bound shader states
    pub fn bound_shader_states(&self) -> &BoundShaderStateCache {
        &self.bound_shader_states
    }

    /// Get or create the bound shader state for `key`.
    ///
    /// The RHI object is created on the first request for a combination; every later
    /// request returns the cached handle.
    pub fn bound_shader_state(&mut self, debug_name: &str, key: &BoundShaderStateKey) -> RenderResult<BoundShaderStateRhi> {
        if let Some(state) = self.bound_shader_states.find(key) {
            return Ok(state);
        }

        let state = self.rhi.create_bound_shader_state(debug_name, key)?;
        log::debug!(
            "[RENDER_DEVICE] created bound shader state {:?} for '{}' ({} cached)",
            state,
            debug_name,
            self.bound_shader_states.len() + 1
        );
        if let Some(replaced) = self.bound_shader_states.add(*key, state) {
            self.rhi.release(RhiResource::BoundShaderState(replaced));
        }
        Ok(state)
    }

    /// Release every cached bound shader state
    pub fn release_bound_shader_states(&mut self) {
        for state in self.bound_shader_states.remove_all() {
            self.rhi.release(RhiResource::BoundShaderState(state));
        }
    }
}

impl std::fmt::Debug for RenderDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderDevice")
            .field("rhi", &self.rhi.name())
            .field("bound_shader_states", &self.bound_shader_states.len())
            .finish()
    }
}

/// State owned by the rendering thread
pub struct RenderContext {
    config: RenderCoreConfig,
    device: RenderDevice,
    global_resources: GlobalResourceList,
    scenes: FxHashMap<SceneId, Scene>,
}

impl RenderContext {
    /// Create a context around a backend
    pub fn new(config: RenderCoreConfig, rhi: Box<dyn Rhi>) -> Self {
        log::info!("[RENDER_CONTEXT] created with '{}' backend", rhi.name());
        Self {
            config,
            device: RenderDevice::new(rhi),
            global_resources: GlobalResourceList::new(),
            scenes: FxHashMap::default(),
        }
    }

    /// Configuration the context was created with
    pub fn config(&self) -> &RenderCoreConfig {
        &self.config
    }

    /// The device
    pub fn device(&self) -> &RenderDevice {
        &self.device
    }

    /// The device (mutable)
    pub fn device_mut(&mut self) -> &mut RenderDevice {
        &mut self.device
    }

    /// Initialized resources
    pub fn global_resources(&self) -> &GlobalResourceList {
        &self.global_resources
    }

    pub(crate) fn global_resources_mut(&mut self) -> &mut GlobalResourceList {
        &mut self.global_resources
    }

    /// Create a scene. Creating an existing id returns the existing scene.
    pub fn create_scene(&mut self, id: SceneId) -> &mut Scene {
        let config = &self.config;
        self.scenes.entry(id).or_insert_with(|| {
            log::debug!("[RENDER_CONTEXT] created scene {:?}", id);
            Scene::new(id, config)
        })
    }

    /// Look up a scene
    pub fn scene(&self, id: SceneId) -> Option<&Scene> {
        self.scenes.get(&id)
    }

    /// Look up a scene (mutable)
    pub fn scene_mut(&mut self, id: SceneId) -> Option<&mut Scene> {
        self.scenes.get_mut(&id)
    }

    /// Destroy a scene, unlinking all of its primitives
    pub fn remove_scene(&mut self, id: SceneId) -> bool {
        self.scenes.remove(&id).is_some()
    }

    /// Number of scenes
    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    /// Register a primitive with a scene. Returns false when the scene does not
    /// exist or the primitive is already registered.
    pub fn add_primitive(&mut self, id: SceneId, primitive: PrimitiveRef) -> bool {
        match self.scenes.get_mut(&id) {
            Some(scene) => scene.add_primitive(primitive),
            None => {
                log::warn!("[RENDER_CONTEXT] add_primitive on unknown scene {:?}", id);
                false
            }
        }
    }

    /// Unregister a primitive from a scene
    pub fn remove_primitive(&mut self, id: SceneId, primitive: &PrimitiveRef) -> bool {
        match self.scenes.get_mut(&id) {
            Some(scene) => scene.remove_primitive(primitive),
            None => {
                log::warn!("[RENDER_CONTEXT] remove_primitive on unknown scene {:?}", id);
                false
            }
        }
    }

    /// Build, draw and clear one frame of a scene
    pub fn render_scene(&mut self, id: SceneId, view: &SceneView) -> Option<FrameStats> {
        let renderer = SceneRenderer::new(&self.config);
        let scene = self.scenes.get_mut(&id)?;
        Some(renderer.render(scene, &mut self.device, view))
    }

    /// Draw only the depth prepass of one frame of a scene
    pub fn render_depth_prepass(&mut self, id: SceneId, view: &SceneView) -> Option<FrameStats> {
        let renderer = SceneRenderer::new(&self.config);
        let scene = self.scenes.get_mut(&id)?;
        Some(renderer.render_depth_prepass(scene, &mut self.device, view))
    }

    /// Draw the hit-proxy pass of one frame of a scene
    #[cfg(feature = "editor")]
    pub fn render_hit_proxies(&mut self, id: SceneId, view: &SceneView) -> Option<FrameStats> {
        let renderer = SceneRenderer::new(&self.config);
        let scene = self.scenes.get_mut(&id)?;
        Some(renderer.render_hit_proxies(scene, &mut self.device, view))
    }

    /// Release every initialized resource (newest first) and every cached bound
    /// shader state. Used on device loss; resources can be initialized again
    /// afterwards.
    pub fn release_global_resources(&mut self) -> usize {
        let resources = self.global_resources.take_all();
        let released = resources.len();
        for resource in resources.iter().rev() {
            log::debug!("[RENDER_CONTEXT] releasing '{}'", resource.name());
            resource.release_for_teardown(self);
        }
        self.device.release_bound_shader_states();
        if released > 0 {
            log::info!("[RENDER_CONTEXT] released {} global resources", released);
        }
        released
    }

    /// Tear down: destroy every scene, then release every resource
    pub fn shutdown(&mut self) {
        for (_, mut scene) in self.scenes.drain() {
            scene.clear();
        }
        self.release_global_resources();
    }
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("device", &self.device)
            .field("global_resources", &self.global_resources.len())
            .field("scenes", &self.scenes.len())
            .finish()
    }
}
