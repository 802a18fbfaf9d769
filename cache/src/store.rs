use crate::resource::Resource;

use core::fmt;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use parking_lot::Mutex;

/// The key to resource mapping behind a store.
///
/// The lock is only ever held for map bookkeeping; it is released before
/// any resource broadcasts to its subscribers.
pub(crate) struct ResourceMap<K, V, H> {
  map: Mutex<HashMap<K, Arc<Resource<K, V>>, H>>,
}

impl<K, V, H> fmt::Debug for ResourceMap<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ResourceMap")
      .field("len", &self.map.lock().len())
      .finish()
  }
}

impl<K, V, H> ResourceMap<K, V, H> {
  pub(crate) fn len(&self) -> usize {
    self.map.lock().len()
  }

  /// Takes every resource out of the map.
  pub(crate) fn drain(&self) -> Vec<Arc<Resource<K, V>>> {
    self.map.lock().drain().map(|(_, resource)| resource).collect()
  }
}

impl<K, V, H> ResourceMap<K, V, H>
where
  K: Eq + Hash + Clone,
  H: BuildHasher,
{
  pub(crate) fn new(hasher: H) -> Self {
    Self {
      map: Mutex::new(HashMap::with_hasher(hasher)),
    }
  }

  #[inline]
  pub(crate) fn get(&self, key: &K) -> Option<Arc<Resource<K, V>>> {
    self.map.lock().get(key).cloned()
  }

  #[inline]
  pub(crate) fn contains_key(&self, key: &K) -> bool {
    self.map.lock().contains_key(key)
  }

  /// Returns the resource for `key`, creating it with `init` if absent.
  /// The flag is `true` when the resource was created by this call.
  pub(crate) fn get_or_create<F>(&self, key: &K, init: F) -> (Arc<Resource<K, V>>, bool)
  where
    F: FnOnce() -> Option<Arc<V>>,
  {
    let mut guard = self.map.lock();
    if let Some(existing) = guard.get(key) {
      return (existing.clone(), false);
    }
    let resource = Arc::new(Resource::new(key.clone(), init()));
    guard.insert(key.clone(), resource.clone());
    (resource, true)
  }

  /// Inserts a new resource. Returns `None` if the key is already taken.
  pub(crate) fn insert_new(&self, key: K, value: Option<Arc<V>>) -> Option<Arc<Resource<K, V>>> {
    let mut guard = self.map.lock();
    if guard.contains_key(&key) {
      return None;
    }
    let resource = Arc::new(Resource::new(key.clone(), value));
    guard.insert(key, resource.clone());
    Some(resource)
  }

  /// Removes `key` only if it still maps to `resource`.
  pub(crate) fn remove_if_same(&self, key: &K, resource: &Arc<Resource<K, V>>) -> bool {
    let mut guard = self.map.lock();
    match guard.get(key) {
      Some(current) if Arc::ptr_eq(current, resource) => {
        guard.remove(key);
        true
      }
      _ => false,
    }
  }
}
