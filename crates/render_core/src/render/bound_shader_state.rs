//! # Bound Shader State Cache
//!
//! Content-addressed cache of pipeline objects. A key is the vertex declaration plus
//! the five stage shaders; the first lookup of a combination creates the object
//! through the RHI and every later lookup returns the same handle.
//!
//! The key stores a precomputed hash used as a pre-filter; equality still compares
//! every field so two combinations with colliding hashes never share an entry.

use std::hash::{Hash, Hasher};

use crate::foundation::hash::{fast_hash, FxHashMap};
use crate::render::rhi::{BoundShaderStateRhi, ShaderRhi, VertexDeclarationRhi};

/// Identity of a bound shader state
#[derive(Debug, Clone, Copy)]
pub struct BoundShaderStateKey {
    hash: u64,
    vertex_declaration: VertexDeclarationRhi,
    vertex_shader: ShaderRhi,
    pixel_shader: ShaderRhi,
    hull_shader: Option<ShaderRhi>,
    domain_shader: Option<ShaderRhi>,
    geometry_shader: Option<ShaderRhi>,
}

impl BoundShaderStateKey {
    /// Key for a vertex + pixel shader pair
    pub fn new(vertex_declaration: VertexDeclarationRhi, vertex_shader: ShaderRhi, pixel_shader: ShaderRhi) -> Self {
        Self::with_stages(vertex_declaration, vertex_shader, pixel_shader, None, None, None)
    }

    /// Key with optional tessellation and geometry stages
    pub fn with_stages(
        vertex_declaration: VertexDeclarationRhi,
        vertex_shader: ShaderRhi,
        pixel_shader: ShaderRhi,
        hull_shader: Option<ShaderRhi>,
        domain_shader: Option<ShaderRhi>,
        geometry_shader: Option<ShaderRhi>,
    ) -> Self {
        let hash = fast_hash(
            &(vertex_declaration, vertex_shader, pixel_shader, hull_shader, domain_shader, geometry_shader),
            0,
        );
        Self {
            hash,
            vertex_declaration,
            vertex_shader,
            pixel_shader,
            hull_shader,
            domain_shader,
            geometry_shader,
        }
    }

    /// Precomputed hash
    pub fn hash_value(&self) -> u64 {
        self.hash
    }

    /// Vertex declaration
    pub fn vertex_declaration(&self) -> VertexDeclarationRhi {
        self.vertex_declaration
    }

    /// Vertex shader
    pub fn vertex_shader(&self) -> ShaderRhi {
        self.vertex_shader
    }

    /// Pixel shader
    pub fn pixel_shader(&self) -> ShaderRhi {
        self.pixel_shader
    }
}

impl PartialEq for BoundShaderStateKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && self.vertex_declaration == other.vertex_declaration
            && self.vertex_shader == other.vertex_shader
            && self.pixel_shader == other.pixel_shader
            && self.hull_shader == other.hull_shader
            && self.domain_shader == other.domain_shader
            && self.geometry_shader == other.geometry_shader
    }
}

impl Eq for BoundShaderStateKey {}

impl Hash for BoundShaderStateKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

/// Cache of created bound shader states
#[derive(Debug, Default)]
pub struct BoundShaderStateCache {
    states: FxHashMap<BoundShaderStateKey, BoundShaderStateRhi>,
}

impl BoundShaderStateCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a previously added state
    pub fn find(&self, key: &BoundShaderStateKey) -> Option<BoundShaderStateRhi> {
        self.states.get(key).copied()
    }

    /// Record a created state.
    ///
    /// Replacing an existing entry is a caller bug: it is logged and the replaced
    /// state is handed back so the caller can release it.
    #[must_use = "a replaced state must be released"]
    pub fn add(&mut self, key: BoundShaderStateKey, state: BoundShaderStateRhi) -> Option<BoundShaderStateRhi> {
        let previous = self.states.insert(key, state).filter(|previous| *previous != state);
        if let Some(previous) = previous {
            log::warn!("[BSS_CACHE] replaced {:?} with {:?} for an existing key", previous, state);
        }
        previous
    }

    /// Forget one state, returning it so the caller can release it
    pub fn remove(&mut self, key: &BoundShaderStateKey) -> Option<BoundShaderStateRhi> {
        self.states.remove(key)
    }

    /// Forget every state, returning them so the caller can release them
    pub fn remove_all(&mut self) -> Vec<BoundShaderStateRhi> {
        self.states.drain().map(|(_, state)| state).collect()
    }

    /// Number of cached states
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
