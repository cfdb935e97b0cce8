use std::collections::HashMap;
use std::sync::Arc;

use crate::core::handler::JobHandler;
use crate::core::store::JobStore;

/// An explicit map from `job_type` tags to handler implementations.
///
/// Resolution happens at dispatch time; a tag with no registered handler is a
/// named error ([`DispatchError::UnknownJobType`](crate::dispatch::dispatcher::DispatchError)),
/// never a crash.
pub struct HandlerRegistry<S> {
    handlers: HashMap<String, Arc<dyn JobHandler<S>>>,
}

impl<S: JobStore> HandlerRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a job type. If the type is already present, the
    /// handler gets replaced.
    pub fn register<H>(&mut self, job_type: impl Into<String>, handler: H)
    where
        H: JobHandler<S> + 'static,
    {
        self.handlers.insert(job_type.into(), Arc::new(handler));
    }

    pub fn resolve(&self, job_type: &str) -> Option<Arc<dyn JobHandler<S>>> {
        self.handlers.get(job_type).cloned()
    }

    pub fn job_types(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }
}

impl<S: JobStore> Default for HandlerRegistry<S> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}
