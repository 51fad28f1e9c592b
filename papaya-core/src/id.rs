//! # IDs
//! Process-unique identifiers, namespaced by a marker type. `PapayaID<Node>` and `PapayaID<PixelBuffer>`
//! draw from separate counters and never compare equal to each other, since they are different types.
//!
//! IDs are never reused during the life of the process. This is what lets the evaluator cache and the
//! history tree refer to nodes and buffers by ID alone, even after a node is removed and later restored
//! by an undo.

use std::sync::atomic::{AtomicU64, Ordering};

// One counter per namespace, created lazily on first use.
static COUNTERS: parking_lot::RwLock<std::collections::BTreeMap<std::any::TypeId, AtomicU64>> =
    parking_lot::const_rwlock(std::collections::BTreeMap::new());

/// Fetch-and-add the counter for `T` by `count`, returning the first reserved value.
fn reserve<T: std::any::Any>(count: u64) -> u64 {
    let ty = std::any::TypeId::of::<T>();
    {
        let read = COUNTERS.read();
        if let Some(counter) = read.get(&ty) {
            return counter.fetch_add(count, Ordering::Relaxed);
        }
    }
    // Namespace not seen yet. Another thread may have raced us here, so use the entry API.
    let mut write = COUNTERS.write();
    write
        .entry(ty)
        .or_insert_with(|| AtomicU64::new(1))
        .fetch_add(count, Ordering::Relaxed)
}

/// ID unique within this run of the program, for the namespace `T`.
pub struct PapayaID<T: std::any::Any> {
    id: std::num::NonZeroU64,
    _namespace: std::marker::PhantomData<fn() -> T>,
}
impl<T: std::any::Any> PapayaID<T> {
    /// Allocate a fresh ID.
    ///
    /// # Panics
    /// If the namespace has handed out all `u64::MAX - 1` values.
    #[must_use]
    pub fn new() -> Self {
        let id = reserve::<T>(1);
        let Some(id) = std::num::NonZeroU64::new(id) else {
            // Wrapped around. Every ID in this namespace is now suspect.
            panic!("{} ID space exhausted", std::any::type_name::<T>());
        };
        Self {
            id,
            _namespace: std::marker::PhantomData,
        }
    }
    /// Raw value. Only meaningful within this process and this namespace!
    #[must_use]
    pub fn get(&self) -> u64 {
        self.id.get()
    }
}
impl<T: std::any::Any> Default for PapayaID<T> {
    fn default() -> Self {
        Self::new()
    }
}
impl<T: std::any::Any> Clone for PapayaID<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T: std::any::Any> Copy for PapayaID<T> {}
impl<T: std::any::Any> PartialEq for PapayaID<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl<T: std::any::Any> Eq for PapayaID<T> {}
impl<T: std::any::Any> PartialOrd for PapayaID<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<T: std::any::Any> Ord for PapayaID<T> {
    /// Allocation order within a single thread. Across threads, only uniqueness is promised.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}
impl<T: std::any::Any> std::hash::Hash for PapayaID<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
impl<T: std::any::Any> std::fmt::Display for PapayaID<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Strip the module path, "papaya_core::state::graph::Node" -> "Node"
        let name = std::any::type_name::<T>();
        let short = name.rsplit("::").next().unwrap_or(name);
        write!(f, "{short}#{}", self.id)
    }
}
impl<T: std::any::Any> std::fmt::Debug for PapayaID<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod test {
    use super::PapayaID;
    // Every test gets its own namespace, since the counters are process-global.

    #[test]
    fn unique() {
        struct Namespace;
        let mut ids: Vec<_> = (0..512).map(|_| PapayaID::<Namespace>::new()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 512);
    }
    #[test]
    fn namespaces_are_independent() {
        struct A;
        struct B;
        let a = PapayaID::<A>::new();
        let b = PapayaID::<B>::new();
        // Separate counters, both start at one.
        assert_eq!(a.get(), 1);
        assert_eq!(b.get(), 1);
    }
    #[test]
    fn display_is_short() {
        struct Soup;
        let id = PapayaID::<Soup>::new();
        assert_eq!(id.to_string(), format!("Soup#{}", id.get()));
    }
    #[test]
    fn threads_never_collide() {
        struct Namespace;
        let handles: Vec<_> = (0..4)
            .map(|_| {
                std::thread::spawn(|| {
                    (0..256)
                        .map(|_| PapayaID::<Namespace>::new().get())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 1024);
    }
}
