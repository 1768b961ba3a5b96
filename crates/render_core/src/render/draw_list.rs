//! # Mesh Draw Lists
//!
//! A mesh draw list groups mesh batches by drawing policy. Each distinct policy owns
//! one [`DrawingPolicyLink`]; every primitive drawn with that policy shares the
//! link and appends instances to its batches each frame it is visible. Drawing sets
//! render state once per link and issues one instanced draw per batch, so state
//! changes scale with the number of distinct policies rather than with the number
//! of primitives.
//!
//! ## Link lifetime
//!
//! Links live in a slot map arena and are indexed by policy hash. `add_item`
//! increments a link's reference count and `remove_item` decrements it; the link is
//! erased when no primitive references it. Instances are per frame and are dropped
//! by [`MeshDrawList::clear`] while links persist.
//!
//! ## Passes
//!
//! [`DrawPass`] picks which policy each link is drawn with. Substitutes are built
//! at draw time; the linked policy is never changed.

use slotmap::SlotMap;

use crate::foundation::hash::FxHashMap;
use crate::render::context::RenderDevice;
use crate::render::drawing_policy::DrawingPolicy;
use crate::render::mesh_batch::{MeshBatch, MeshInstance};
use crate::scene::{SceneView, ShowFlags};

slotmap::new_key_type! {
    /// Key of a drawing policy link inside its draw list
    pub struct DrawingPolicyLinkKey;

    /// Key of a mesh batch inside its drawing policy link
    pub struct MeshBatchKey;
}

#[derive(Debug)]
struct MeshBatchEntry {
    batch: MeshBatch,
    hash: u64,
    ref_count: usize,
}

/// One drawing policy and the mesh batches drawn with it
#[derive(Debug)]
pub struct DrawingPolicyLink<P> {
    policy: P,
    batches: SlotMap<MeshBatchKey, MeshBatchEntry>,
    ref_count: usize,
    dirty: bool,
}

impl<P: DrawingPolicy> DrawingPolicyLink<P> {
    fn new(policy: P) -> Self {
        Self {
            policy,
            batches: SlotMap::with_key(),
            ref_count: 0,
            dirty: false,
        }
    }

    /// The drawing policy
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Batches drawn with the policy
    pub fn mesh_batches(&self) -> impl Iterator<Item = &MeshBatch> {
        self.batches.values().map(|entry| &entry.batch)
    }

    /// Number of distinct batches
    pub fn num_mesh_batches(&self) -> usize {
        self.batches.len()
    }

    /// Number of outstanding link references
    pub fn ref_count(&self) -> usize {
        self.ref_count
    }

    /// True when every holder must relink
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Instances gathered this frame over all batches
    pub fn num_instances(&self) -> usize {
        self.batches.values().map(|entry| entry.batch.num_instances()).sum()
    }

    fn link_batch(&mut self, batch: &MeshBatch, instance_capacity: usize) -> MeshBatchKey {
        let hash = batch.type_hash();
        let existing = self
            .batches
            .iter()
            .find(|(_, entry)| entry.hash == hash && entry.batch.matches(batch))
            .map(|(key, _)| key);

        if let Some(key) = existing {
            self.batches[key].ref_count += 1;
            return key;
        }

        let mut batch = batch.clone();
        batch.clear_instances();
        self.batches.insert(MeshBatchEntry {
            batch: batch.with_instance_capacity(instance_capacity),
            hash,
            ref_count: 1,
        })
    }

    fn unlink_batch(&mut self, key: MeshBatchKey) {
        if let Some(entry) = self.batches.get_mut(key) {
            entry.ref_count -= 1;
            if entry.ref_count == 0 {
                self.batches.remove(key);
            }
        }
    }
}

/// Handle a primitive keeps to the link it was added to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawingPolicyLinkRef {
    key: DrawingPolicyLinkKey,
    batches: Vec<MeshBatchKey>,
}

impl DrawingPolicyLinkRef {
    /// Key of the referenced link
    pub fn link_key(&self) -> DrawingPolicyLinkKey {
        self.key
    }

    /// True when both refer to the same link
    pub fn same_link(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

/// Which policy a link is drawn with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawPass {
    /// The linked policy, whatever the view shows
    Linked,
    /// The linked policy, or its wireframe variant when the view shows wireframe
    Scene,
    /// The depth-only variant; links without one are not drawn
    DepthOnly,
}

/// Statistics of one draw list draw
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawListStats {
    /// Links with instances whose render state was set
    pub links_drawn: usize,
    /// Links with instances skipped because their policy was invalid
    pub links_skipped: usize,
    /// Render state changes
    pub state_changes: usize,
    /// Draw calls issued
    pub draw_calls: usize,
    /// Instances drawn
    pub instances: usize,
}

impl std::ops::AddAssign for DrawListStats {
    fn add_assign(&mut self, other: Self) {
        self.links_drawn += other.links_drawn;
        self.links_skipped += other.links_skipped;
        self.state_changes += other.state_changes;
        self.draw_calls += other.draw_calls;
        self.instances += other.instances;
    }
}

/// Set of drawing policy links
#[derive(Debug)]
pub struct MeshDrawList<P> {
    links: SlotMap<DrawingPolicyLinkKey, DrawingPolicyLink<P>>,
    by_hash: FxHashMap<u64, Vec<DrawingPolicyLinkKey>>,
    instance_capacity: usize,
}

impl<P: DrawingPolicy> MeshDrawList<P> {
    /// Create an empty draw list
    pub fn new() -> Self {
        Self::with_capacity(0, 0)
    }

    /// Create an empty draw list with reserved capacity
    pub fn with_capacity(link_capacity: usize, instance_capacity: usize) -> Self {
        Self {
            links: SlotMap::with_capacity_and_key(link_capacity),
            by_hash: FxHashMap::default(),
            instance_capacity,
        }
    }

    /// Find the live (non-dirty) link drawing with `policy`
    pub fn find(&self, policy: &P) -> Option<DrawingPolicyLinkKey> {
        self.by_hash.get(&policy.type_hash()).and_then(|keys| {
            keys.iter().copied().find(|key| {
                let link = &self.links[*key];
                !link.dirty && link.policy.matches(policy)
            })
        })
    }

    /// Link `batches` under `policy`, creating the link on first use
    pub fn add_item(&mut self, policy: P, batches: &[MeshBatch]) -> DrawingPolicyLinkRef {
        let key = match self.find(&policy) {
            Some(key) => key,
            None => {
                let hash = policy.type_hash();
                log::debug!("[DRAW_LIST] new link '{}' ({:#018x})", policy.debug_name(), hash);
                let key = self.links.insert(DrawingPolicyLink::new(policy));
                self.by_hash.entry(hash).or_default().push(key);
                key
            }
        };

        let instance_capacity = self.instance_capacity;
        let link = &mut self.links[key];
        link.ref_count += 1;
        let batches = batches
            .iter()
            .map(|batch| link.link_batch(batch, instance_capacity))
            .collect();

        DrawingPolicyLinkRef { key, batches }
    }

    /// Drop a reference returned by [`MeshDrawList::add_item`]. The link is erased
    /// when its last reference goes.
    ///
    /// # Panics
    ///
    /// Panics if the link no longer exists (removed twice, or from another list).
    pub fn remove_item(&mut self, link_ref: &DrawingPolicyLinkRef) {
        let link = self.link_mut(link_ref);
        for batch in &link_ref.batches {
            link.unlink_batch(*batch);
        }
        link.ref_count -= 1;
        if link.ref_count > 0 {
            return;
        }

        let hash = link.policy.type_hash();
        if let Some(link) = self.links.remove(link_ref.key) {
            log::debug!("[DRAW_LIST] erased link '{}'", link.policy.debug_name());
        }
        if let Some(keys) = self.by_hash.get_mut(&hash) {
            keys.retain(|key| *key != link_ref.key);
            if keys.is_empty() {
                self.by_hash.remove(&hash);
            }
        }
    }

    /// Append an instance to every batch the reference linked
    pub fn add_instance(&mut self, link_ref: &DrawingPolicyLinkRef, instance: &MeshInstance) {
        let link = self.link_mut(link_ref);
        for batch in &link_ref.batches {
            if let Some(entry) = link.batches.get_mut(*batch) {
                entry.batch.add_instance(instance.clone());
            }
        }
    }

    /// The link behind a reference
    pub fn link(&self, link_ref: &DrawingPolicyLinkRef) -> Option<&DrawingPolicyLink<P>> {
        self.links.get(link_ref.key)
    }

    /// True when the referenced link is dirty or gone; its holder must relink
    pub fn needs_relink(&self, link_ref: &DrawingPolicyLinkRef) -> bool {
        self.links.get(link_ref.key).map_or(true, |link| link.dirty)
    }

    /// Mark every link whose policy satisfies `predicate` dirty. Returns how many
    /// links were marked.
    pub fn mark_dirty_where(&mut self, predicate: impl Fn(&P) -> bool) -> usize {
        let mut marked = 0;
        for link in self.links.values_mut() {
            if !link.dirty && predicate(&link.policy) {
                link.dirty = true;
                marked += 1;
            }
        }
        marked
    }

    /// All links
    pub fn links(&self) -> impl Iterator<Item = &DrawingPolicyLink<P>> {
        self.links.values()
    }

    /// Number of links
    pub fn num_links(&self) -> usize {
        self.links.len()
    }

    /// True when no link exists
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Instances gathered this frame over all links
    pub fn num_instances(&self) -> usize {
        self.links.values().map(DrawingPolicyLink::num_instances).sum()
    }

    /// Drop this frame's instances, keeping links and batches
    pub fn clear(&mut self) {
        for link in self.links.values_mut() {
            for entry in link.batches.values_mut() {
                entry.batch.clear_instances();
            }
        }
    }

    /// Draw every link with instances in `pass`
    pub fn draw(&self, device: &mut RenderDevice, view: &SceneView, pass: DrawPass) -> DrawListStats {
        let wireframe = view.show_flags().contains(ShowFlags::WIREFRAME);
        let mut stats = DrawListStats::default();

        for link in self.links.values() {
            let num_instances = link.num_instances();
            if num_instances == 0 {
                continue;
            }

            let variant = match pass {
                DrawPass::Linked => None,
                DrawPass::Scene if wireframe => link.policy.wireframe_variant(),
                DrawPass::Scene => None,
                DrawPass::DepthOnly => match link.policy.depth_only_variant() {
                    Some(variant) => Some(variant),
                    None => continue,
                },
            };
            let policy = variant.as_ref().unwrap_or(&link.policy);

            if !policy.is_valid() {
                log::trace!("[DRAW_LIST] skipping invalid link '{}'", policy.debug_name());
                stats.links_skipped += 1;
                continue;
            }

            if let Err(err) = policy.set_render_state(device) {
                log::warn!("[DRAW_LIST] skipping link '{}': {}", policy.debug_name(), err);
                stats.links_skipped += 1;
                continue;
            }
            stats.links_drawn += 1;
            stats.state_changes += 1;
            policy.set_shader_parameters(device);

            for entry in link.batches.values() {
                stats.draw_calls += policy.draw(device, &entry.batch, view) as usize;
            }
            stats.instances += num_instances;
        }

        stats
    }

    fn link_mut(&mut self, link_ref: &DrawingPolicyLinkRef) -> &mut DrawingPolicyLink<P> {
        match self.links.get_mut(link_ref.key) {
            Some(link) => link,
            None => panic!("drawing policy link {:?} used after it was removed", link_ref.key),
        }
    }
}

impl<P: DrawingPolicy> Default for MeshDrawList<P> {
    fn default() -> Self {
        Self::new()
    }
}
