//! WorkQueueRegistry - configured work queues bound to their repositories.
//!
//! Each definition names a backing collection. Names are resolved once, when
//! the registry is built; an unknown collection fails construction.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ConfigError;
use crate::domain::{DocketError, QueueName, WorkQueueDefinition};
use crate::ports::WorkItemRepository;

#[derive(Clone)]
pub struct BoundQueue {
    pub definition: WorkQueueDefinition,
    pub items: Arc<dyn WorkItemRepository>,
}

#[derive(Clone, Default)]
pub struct WorkQueueRegistry {
    queues: HashMap<QueueName, BoundQueue>,
}

impl WorkQueueRegistry {
    pub fn build(
        definitions: &[WorkQueueDefinition],
        collections: &HashMap<String, Arc<dyn WorkItemRepository>>,
    ) -> Result<Self, ConfigError> {
        let mut queues = HashMap::with_capacity(definitions.len());
        for definition in definitions {
            let Some(items) = collections.get(&definition.collection) else {
                return Err(ConfigError::UnknownCollection {
                    queue: definition.name.to_string(),
                    collection: definition.collection.clone(),
                });
            };
            queues.insert(
                definition.name.clone(),
                BoundQueue {
                    definition: definition.clone(),
                    items: items.clone(),
                },
            );
        }
        Ok(Self { queues })
    }

    pub fn get(&self, name: &QueueName) -> Result<&BoundQueue, DocketError> {
        self.queues
            .get(name)
            .ok_or_else(|| DocketError::UnknownQueue(name.to_string()))
    }

    pub fn names(&self) -> Vec<&QueueName> {
        let mut names: Vec<&QueueName> = self.queues.keys().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WorkItem;
    use crate::impls::{CollectionRepository, InMemoryStore};

    fn collections() -> HashMap<String, Arc<dyn WorkItemRepository>> {
        let repo: Arc<dyn WorkItemRepository> =
            Arc::new(CollectionRepository::new(Arc::new(InMemoryStore::<WorkItem>::new())));
        HashMap::from([("documents".to_string(), repo)])
    }

    #[test]
    fn binds_known_collections() {
        let defs = vec![
            WorkQueueDefinition::new("review", "documents"),
            WorkQueueDefinition::new("qa", "documents"),
        ];
        let registry = WorkQueueRegistry::build(&defs, &collections()).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec![&QueueName::new("qa"), &QueueName::new("review")]);
        assert!(registry.get(&QueueName::new("review")).is_ok());
    }

    #[test]
    fn unknown_collection_fails_at_build() {
        let defs = vec![WorkQueueDefinition::new("review", "contracts")];
        let err = WorkQueueRegistry::build(&defs, &collections()).err().unwrap();
        assert!(matches!(
            err,
            ConfigError::UnknownCollection { queue, collection } if queue == "review" && collection == "contracts"
        ));
    }

    #[test]
    fn unknown_queue_is_an_error() {
        let registry = WorkQueueRegistry::build(&[], &collections()).unwrap();
        assert!(matches!(
            registry.get(&QueueName::new("nope")),
            Err(DocketError::UnknownQueue(name)) if name == "nope"
        ));
    }
}
