//! ProcessorRegistry - processors keyed by task type.

use std::collections::HashMap;
use std::sync::Arc;

use super::Processor;
use crate::domain::TaskType;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("processor for task type '{0}' is already registered")]
    AlreadyRegistered(TaskType),
}

/// Cheap to clone; processors are shared behind `Arc`.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: HashMap<TaskType, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: Processor + 'static>(&mut self, task_type: TaskType, processor: P) -> Result<(), RegistryError> {
        self.register_arc(task_type, Arc::new(processor))
    }

    pub fn register_arc(&mut self, task_type: TaskType, processor: Arc<dyn Processor>) -> Result<(), RegistryError> {
        if self.processors.contains_key(&task_type) {
            return Err(RegistryError::AlreadyRegistered(task_type));
        }
        self.processors.insert(task_type, processor);
        Ok(())
    }

    pub fn get(&self, task_type: TaskType) -> Option<Arc<dyn Processor>> {
        self.processors.get(&task_type).cloned()
    }

    /// Registered types in declaration order.
    pub fn registered_types(&self) -> Vec<TaskType> {
        let mut types: Vec<TaskType> = self.processors.keys().copied().collect();
        types.sort();
        types
    }

    /// Which of `expected` have no processor.
    pub fn missing(&self, expected: &[TaskType]) -> Vec<TaskType> {
        expected
            .iter()
            .copied()
            .filter(|t| !self.processors.contains_key(t))
            .collect()
    }
}
