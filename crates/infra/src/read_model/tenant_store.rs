use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use estateerp_core::TenantId;

/// Tenant-isolated key/value store for disposable read models.
///
/// Every read model can be rebuilt from the event store, so implementations
/// favour simplicity over durability.
pub trait TenantStore<K, V>: Send + Sync {
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V>;
    fn upsert(&self, tenant_id: TenantId, key: K, value: V);
    fn remove(&self, tenant_id: TenantId, key: &K) -> Option<V>;
    fn list(&self, tenant_id: TenantId) -> Vec<V>;
    /// Drop every record of a tenant (rebuild and restore).
    fn clear_tenant(&self, tenant_id: TenantId);
}

impl<K, V, S> TenantStore<K, V> for Arc<S>
where
    S: TenantStore<K, V> + ?Sized,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        (**self).get(tenant_id, key)
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        (**self).upsert(tenant_id, key, value)
    }

    fn remove(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        (**self).remove(tenant_id, key)
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        (**self).list(tenant_id)
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        (**self).clear_tenant(tenant_id)
    }
}

/// In-memory tenant-isolated store.
#[derive(Debug)]
pub struct InMemoryTenantStore<K, V> {
    inner: RwLock<HashMap<(TenantId, K), V>>,
}

impl<K, V> InMemoryTenantStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryTenantStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> InMemoryTenantStore<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    /// Read-modify-write under one lock; `f` sees `None` for a missing key.
    pub fn update<R>(
        &self,
        tenant_id: TenantId,
        key: K,
        f: impl FnOnce(&mut Option<V>) -> R,
    ) -> Option<R> {
        let mut map = self.inner.write().ok()?;
        let map_key = (tenant_id, key);
        let mut slot = map.remove(&map_key);
        let out = f(&mut slot);
        if let Some(value) = slot {
            map.insert(map_key, value);
        }
        Some(out)
    }
}

impl<K, V> TenantStore<K, V> for InMemoryTenantStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(&(tenant_id, key.clone())).cloned()
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.insert((tenant_id, key), value);
        }
    }

    fn remove(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        let mut map = self.inner.write().ok()?;
        map.remove(&(tenant_id, key.clone()))
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        let map = match self.inner.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };

        map.iter()
            .filter_map(|((t, _k), v)| if *t == tenant_id { Some(v.clone()) } else { None })
            .collect()
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        if let Ok(mut map) = self.inner.write() {
            map.retain(|(t, _k), _v| *t != tenant_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenants_do_not_see_each_other() {
        let store: InMemoryTenantStore<String, i64> = InMemoryTenantStore::new();
        let (a, b) = (TenantId::new(), TenantId::new());
        store.upsert(a, "cash".to_string(), 10);
        store.upsert(b, "cash".to_string(), 20);

        assert_eq!(store.get(a, &"cash".to_string()), Some(10));
        assert_eq!(store.list(b), vec![20]);

        store.clear_tenant(a);
        assert!(store.list(a).is_empty());
        assert_eq!(store.list(b), vec![20]);
    }

    #[test]
    fn update_inserts_and_modifies_in_place() {
        let store: InMemoryTenantStore<&'static str, i64> = InMemoryTenantStore::new();
        let t = TenantId::new();
        store.update(t, "qty", |slot| *slot.get_or_insert(0) += 5);
        store.update(t, "qty", |slot| *slot.get_or_insert(0) -= 2);
        assert_eq!(store.get(t, &"qty"), Some(3));
    }
}
