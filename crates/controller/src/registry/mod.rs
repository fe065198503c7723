//! The set of roles wanted by running workloads.
//!
//! [`RoleStore`] maps a role to the namespaces it is wanted in and, per
//! namespace, to the consumers (pods) wanting it. A namespace entry lives
//! exactly as long as it has a consumer and a role entry exactly as long as it
//! has a namespace.
//!
//! The store starts out unsynced. It only describes the cluster once the first
//! full listing has been applied through [`RoleStore::replace`].

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::atomic::{AtomicBool, Ordering},
};

use parking_lot::RwLock;

/// A workload wanting credentials for a role.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Consumer {
    pub role: String,
    pub namespace: String,
    pub name: String,
}

impl Consumer {
    pub fn new(
        role: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self { role: role.into(), namespace: namespace.into(), name: name.into() }
    }
}

type Consumers = BTreeMap<String, BTreeMap<String, BTreeSet<String>>>;

/// Concurrency-safe registry of wanted roles.
///
/// Readers share the lock, writers hold it exclusively. No I/O happens while
/// the lock is held.
#[derive(Debug, Default)]
pub struct RoleStore {
    roles: RwLock<Consumers>,
    synced: AtomicBool,
}

impl RoleStore {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Whether any consumer in `namespace` wants `role`.
    #[must_use]
    pub fn exists(&self, role: &str, namespace: &str) -> bool {
        self.roles.read().get(role).is_some_and(|namespaces| namespaces.contains_key(namespace))
    }

    /// Records that `consumer` wants its role. Adding a known consumer is a
    /// no-op.
    pub fn add(&self, consumer: &Consumer) {
        let Consumer { role, namespace, name } = consumer;
        let _unused = self
            .roles
            .write()
            .entry(role.clone())
            .or_default()
            .entry(namespace.clone())
            .or_default()
            .insert(name.clone());
    }

    /// Records that `consumer` no longer wants its role. Removing an unknown
    /// consumer is a no-op.
    pub fn remove(&self, consumer: &Consumer) {
        let Consumer { role, namespace, name } = consumer;
        let mut roles = self.roles.write();
        let Some(namespaces) = roles.get_mut(role) else {
            return;
        };
        if let Some(names) = namespaces.get_mut(namespace) {
            let _unused = names.remove(name);
            if names.is_empty() {
                let _unused = namespaces.remove(namespace);
            }
        }
        if namespaces.is_empty() {
            let _unused = roles.remove(role);
        }
    }

    /// Replaces the whole content with `consumers`.
    ///
    /// Used after a full relist of the producer, which may have missed
    /// removals while disconnected. Marks the store as synced.
    pub fn replace(&self, consumers: &[Consumer]) {
        let mut fresh = Consumers::new();
        for Consumer { role, namespace, name } in consumers {
            let _unused = fresh
                .entry(role.clone())
                .or_default()
                .entry(namespace.clone())
                .or_default()
                .insert(name.clone());
        }
        *self.roles.write() = fresh;
        self.synced.store(true, Ordering::Release);
    }

    /// Whether a full listing has been applied. Before that, an absent role
    /// says nothing about the cluster.
    #[must_use]
    pub fn is_synced(&self) -> bool { self.synced.load(Ordering::Acquire) }

    /// Every wanted `(role, namespace)` pair, ordered.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, String)> {
        self.roles
            .read()
            .iter()
            .flat_map(|(role, namespaces)| {
                namespaces.keys().map(move |namespace| (role.clone(), namespace.clone()))
            })
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.roles.read().is_empty() }
}
