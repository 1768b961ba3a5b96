//! # Primitives
//!
//! A primitive is anything a scene draws. The scene never owns a primitive's
//! lifetime; it holds a shared handle and calls the primitive back on the
//! rendering thread to link, gather and unlink.
//!
//! ## Dirty-link pattern
//!
//! A primitive caches the draw list links it was added to. Each frame it is
//! visible it appends one instance per cached link. When anything that feeds its
//! drawing policies changes (material override, hit proxy, depth group), or when a
//! link it holds is marked dirty, it drops its links and links again on the next
//! frame.
//!
//! A primitive may be registered with several scenes; links are kept per scene
//! and each scene only ever sees its own.

use std::sync::{Arc, Mutex};

use crate::render::draw_list::DrawingPolicyLinkRef;
use crate::render::drawing_policy::MeshDrawingPolicy;
use crate::render::mesh_batch::{MeshBatch, MeshInstance};
use crate::scene::bounds::AABB;
use crate::scene::depth_group::{DepthGroup, DrawListKind, SceneDepthGroups};
use crate::scene::scene::SceneId;
use crate::scene::view::SceneView;

/// Drawable registered with a scene. Called only on the rendering thread.
pub trait Primitive: Send {
    /// Debug name
    fn name(&self) -> &str;

    /// Hidden primitives are skipped while building depth groups
    fn is_visible(&self) -> bool {
        true
    }

    /// World-space bounds; `None` is never culled
    fn bounds(&self) -> Option<AABB> {
        None
    }

    /// Create the primitive's draw list links
    fn link_draw_list(&mut self, depth_groups: &mut SceneDepthGroups);

    /// Drop the primitive's draw list links
    fn unlink_draw_list(&mut self, depth_groups: &mut SceneDepthGroups);

    /// Append this frame's instances, relinking first if needed
    fn add_to_draw_list(&mut self, depth_groups: &mut SceneDepthGroups, view: &SceneView);
}

/// Shared primitive handle
pub type PrimitiveRef = Arc<Mutex<dyn Primitive>>;

/// Wrap a primitive in a shared handle
pub fn primitive_ref<P: Primitive + 'static>(primitive: P) -> PrimitiveRef {
    Arc::new(Mutex::new(primitive))
}

/// One mesh batch to link: its base policy, its hit proxy policy if any
pub(crate) struct LinkRequest {
    pub policy: MeshDrawingPolicy,
    pub hit_proxy_policy: Option<MeshDrawingPolicy>,
    pub batch: MeshBatch,
}

#[derive(Debug)]
struct LinkedLists {
    scene: SceneId,
    group: DepthGroup,
    kind: DrawListKind,
    links: Vec<DrawingPolicyLinkRef>,
    hit_proxy_links: Vec<DrawingPolicyLinkRef>,
    dirty: bool,
}

/// Draw list links held by a mesh primitive, one set per scene it is linked into.
/// Link references are only ever handed back to the scene that created them.
#[derive(Debug, Default)]
pub(crate) struct MeshLinks {
    linked: Vec<LinkedLists>,
}

impl MeshLinks {
    pub(crate) fn is_linked(&self) -> bool {
        !self.linked.is_empty()
    }

    /// Scenes this primitive holds links in
    pub(crate) fn num_scenes(&self) -> usize {
        self.linked.len()
    }

    /// Force a relink in every scene on the next frame
    pub(crate) fn mark_dirty(&mut self) {
        for linked in &mut self.linked {
            linked.dirty = true;
        }
    }

    /// Links held in `scene`'s mesh lists
    #[cfg(test)]
    pub(crate) fn links_in(&self, scene: SceneId) -> &[DrawingPolicyLinkRef] {
        self.find(scene).map_or(&[], |linked| linked.links.as_slice())
    }

    fn find(&self, scene: SceneId) -> Option<&LinkedLists> {
        self.linked.iter().find(|linked| linked.scene == scene)
    }

    pub(crate) fn needs_relink(&self, depth_groups: &SceneDepthGroups) -> bool {
        let Some(linked) = self.find(depth_groups.scene()) else {
            return true;
        };
        if linked.dirty {
            return true;
        }
        let group = &depth_groups[linked.group];
        linked
            .links
            .iter()
            .any(|link| group.draw_list(linked.kind).needs_relink(link))
            || linked
                .hit_proxy_links
                .iter()
                .any(|link| group.hit_proxy_draw_list().needs_relink(link))
    }

    pub(crate) fn link(
        &mut self,
        depth_groups: &mut SceneDepthGroups,
        group: DepthGroup,
        kind: DrawListKind,
        requests: Vec<LinkRequest>,
    ) {
        self.unlink(depth_groups);

        let scene = depth_groups.scene();
        let hit_proxies = depth_groups.hit_proxies_enabled();
        let depth_group = &mut depth_groups[group];
        let mut links = Vec::with_capacity(requests.len());
        let mut hit_proxy_links = Vec::new();

        for request in requests {
            let batches = std::slice::from_ref(&request.batch);
            links.push(depth_group.draw_list_mut(kind).add_item(request.policy, batches));
            if let (true, Some(policy)) = (hit_proxies, request.hit_proxy_policy) {
                hit_proxy_links.push(depth_group.hit_proxy_draw_list_mut().add_item(policy, batches));
            }
        }

        self.linked.push(LinkedLists {
            scene,
            group,
            kind,
            links,
            hit_proxy_links,
            dirty: false,
        });
    }

    /// Drop the links held in `depth_groups`' scene; links in other scenes stay
    pub(crate) fn unlink(&mut self, depth_groups: &mut SceneDepthGroups) {
        let scene = depth_groups.scene();
        let Some(index) = self.linked.iter().position(|linked| linked.scene == scene) else {
            return;
        };
        let linked = self.linked.swap_remove(index);
        let group = &mut depth_groups[linked.group];
        for link in &linked.links {
            group.draw_list_mut(linked.kind).remove_item(link);
        }
        for link in &linked.hit_proxy_links {
            group.hit_proxy_draw_list_mut().remove_item(link);
        }
    }

    pub(crate) fn add_instance(&self, depth_groups: &mut SceneDepthGroups, instance: &MeshInstance) {
        let Some(linked) = self.find(depth_groups.scene()) else {
            return;
        };
        let group = &mut depth_groups[linked.group];
        for link in &linked.links {
            group.draw_list_mut(linked.kind).add_instance(link, instance);
        }
        if instance.hit_proxy_id.is_some() {
            for link in &linked.hit_proxy_links {
                group.hit_proxy_draw_list_mut().add_instance(link, instance);
            }
        }
    }
}
