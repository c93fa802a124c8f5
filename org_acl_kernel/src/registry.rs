/// Organization ACL Kernel: Entity Registry boundary
///
/// The registry owns entities; the kernel only reads them. Enumeration order
/// is significant: it breaks ties between equally short relay chains.

use serde::{Deserialize, Serialize};

use crate::address::normalize;
use crate::domain::{CapabilityDescriptor, Entity};

pub trait EntityRegistry: Send + Sync {
    /// All known entities, in the registry's stable order.
    fn list_entities(&self) -> Vec<Entity>;

    fn entity(&self, address: &str) -> Option<Entity> {
        let address = normalize(address);
        self.list_entities()
            .into_iter()
            .find(|e| normalize(&e.address) == address)
    }

    fn is_forwarder(&self, address: &str) -> bool {
        self.entity(address).is_some_and(|e| e.is_forwarder())
    }

    fn capability_descriptor(&self, address: &str) -> Option<CapabilityDescriptor> {
        self.entity(address).and_then(|e| e.descriptor)
    }

    /// Forwarders only, in enumeration order.
    fn forwarders(&self) -> Vec<Entity> {
        self.list_entities()
            .into_iter()
            .filter(Entity::is_forwarder)
            .collect()
    }
}

/// Fixed in-memory registry, typically loaded from a JSON file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRegistry {
    pub entities: Vec<Entity>,
}

impl StaticRegistry {
    pub fn new(entities: Vec<Entity>) -> Self {
        let entities = entities
            .into_iter()
            .map(|mut e| {
                e.address = normalize(&e.address);
                e
            })
            .collect();
        Self { entities }
    }
}

impl EntityRegistry for StaticRegistry {
    fn list_entities(&self) -> Vec<Entity> {
        self.entities.clone()
    }
}
