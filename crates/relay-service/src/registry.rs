//! Service registry
//!
//! Registered services keyed by unique name, kept in registration order

use crate::context::ServiceContext;
use crate::descriptor::ServiceDescriptor;
use crate::router::SubscriptionRecord;

/// One registered service
pub(crate) struct ServiceEntry {
    pub descriptor: ServiceDescriptor,
    pub context: ServiceContext,
    /// Empty until the service is mounted on a connection
    pub subscriptions: Vec<SubscriptionRecord>,
}

impl ServiceEntry {
    pub fn new(descriptor: ServiceDescriptor, context: ServiceContext) -> Self {
        Self {
            descriptor,
            context,
            subscriptions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }
}

#[derive(Default)]
pub(crate) struct Registry {
    entries: Vec<ServiceEntry>,
}

impl Registry {
    /// Insert a service; an entry with the same name is replaced in place and
    /// returned
    pub fn insert(&mut self, entry: ServiceEntry) -> Option<ServiceEntry> {
        match self.position(entry.name()) {
            Some(index) => Some(std::mem::replace(&mut self.entries[index], entry)),
            None => {
                self.entries.push(entry);
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<ServiceEntry> {
        self.position(name).map(|index| self.entries.remove(index))
    }

    pub fn get(&self, name: &str) -> Option<&ServiceEntry> {
        self.entries.iter().find(|entry| entry.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ServiceEntry> {
        self.entries.iter_mut().find(|entry| entry.name() == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.name().to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceEntry> {
        self.entries.iter()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn entry(name: &str) -> ServiceEntry {
        ServiceEntry::new(
            ServiceDescriptor::new(name),
            ServiceContext::new(name, HashMap::new()),
        )
    }

    #[test]
    fn test_registration_order() {
        let mut registry = Registry::default();
        registry.insert(entry("b"));
        registry.insert(entry("a"));
        registry.insert(entry("c"));
        assert_eq!(registry.names(), vec!["b", "a", "c"]);
        assert_eq!(registry.iter().count(), 3);
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut registry = Registry::default();
        registry.insert(entry("a"));
        registry.insert(entry("b"));

        let fresh = entry("a");
        let fresh_ctx = fresh.context.clone();
        let old = registry.insert(fresh).unwrap();
        assert_eq!(old.name(), "a");
        assert_eq!(registry.names(), vec!["a", "b"]);

        fresh_ctx.set("marker", serde_json::json!(true));
        assert!(registry.get("a").unwrap().context.get("marker").is_some());
        assert!(old.context.get("marker").is_none());
    }

    #[test]
    fn test_remove() {
        let mut registry = Registry::default();
        registry.insert(entry("a"));
        assert!(registry.remove("missing").is_none());
        assert!(registry.remove("a").is_some());
        assert!(registry.get("a").is_none());
        assert!(registry.names().is_empty());
    }
}
