//! Structural hashing
//!
//! Drawing policies, mesh batches and bound shader state keys are identified by a
//! 64-bit structural hash. The hash must be stable for the lifetime of the process
//! (it is compared frame to frame) so it is computed with `FxHasher64`, which has no
//! per-instance random state, and finished values are chained through a seed.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use fxhash::FxHasher64;

pub use fxhash::{FxHashMap, FxHashSet};

/// Hash `value`, chaining from a previously computed `seed`
pub fn fast_hash<T: Hash + ?Sized>(value: &T, seed: u64) -> u64 {
    let mut hasher = FxHasher64::default();
    seed.hash(&mut hasher);
    value.hash(&mut hasher);
    hasher.finish()
}

/// Hash the identity (address) of a shared object
pub fn ptr_hash<T: ?Sized>(value: &Arc<T>, seed: u64) -> u64 {
    fast_hash(&(Arc::as_ptr(value).cast::<()>() as usize), seed)
}

/// Identity comparison of two shared objects that ignores trait-object metadata
pub fn ptr_eq<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_hash_is_deterministic() {
        assert_eq!(fast_hash("LocalVertexFactory", 0), fast_hash("LocalVertexFactory", 0));
        assert_ne!(fast_hash("LocalVertexFactory", 0), fast_hash("LocalVertexFactory", 1));
    }

    #[test]
    fn test_ptr_hash_tracks_identity_not_content() {
        let a = Arc::new(5_u32);
        let b = Arc::new(5_u32);
        assert_eq!(ptr_hash(&a, 0), ptr_hash(&a.clone(), 0));
        assert_ne!(ptr_hash(&a, 0), ptr_hash(&b, 0));
        assert!(ptr_eq(&a, &a.clone()));
        assert!(!ptr_eq(&a, &b));
    }
}
