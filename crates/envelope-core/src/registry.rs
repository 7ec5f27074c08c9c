//! Message Registry (spec component B).
//!
//! Spec §9 re-architects the source's import-time registration side effects
//! into an explicit, ordered startup phase: `register()` calls push into a
//! `Catalog`, which is then frozen (`CatalogBuilder::freeze`) and passed by
//! handle to the rest of the system. No run-time mutation after that point.

use std::collections::HashMap;
use std::sync::Arc;

use crate::envelope::EnvelopeKind;
use crate::handler::{AsyncRunnable, DeferredJob};
use crate::message::MessageHandlerKind;

/// One registered message class: its wire tag, the envelope kinds it is
/// legal in, its dispatch kind, whether it is an error-message class, and
/// whether it may participate in transactional batching (§4.9).
#[derive(Clone)]
pub struct MessageDescriptor {
    pub tag: String,
    pub kinds: Vec<EnvelopeKind>,
    pub handler_kind: MessageHandlerKind,
    pub is_error: bool,
    pub allow_batch: bool,
    pub runnable: Option<Arc<dyn AsyncRunnable>>,
    pub job: Option<Arc<dyn DeferredJob>>,
}

impl MessageDescriptor {
    pub fn runnable(tag: impl Into<String>, kinds: Vec<EnvelopeKind>, handler: Arc<dyn AsyncRunnable>) -> Self {
        MessageDescriptor {
            tag: tag.into(),
            kinds,
            handler_kind: MessageHandlerKind::AsyncRunnable,
            is_error: false,
            allow_batch: false,
            runnable: Some(handler),
            job: None,
        }
    }

    pub fn job(tag: impl Into<String>, kinds: Vec<EnvelopeKind>, handler: Arc<dyn DeferredJob>) -> Self {
        MessageDescriptor {
            tag: tag.into(),
            kinds,
            handler_kind: MessageHandlerKind::DeferredJob,
            is_error: false,
            allow_batch: false,
            runnable: None,
            job: Some(handler),
        }
    }

    pub fn allow_batch(mut self, allow: bool) -> Self {
        self.allow_batch = allow;
        self
    }

    pub fn error(mut self) -> Self {
        self.is_error = true;
        self
    }
}

/// Process-wide mapping `kind -> (tag -> descriptor)`. Built once at
/// startup via `CatalogBuilder`, then frozen; reads afterwards require no
/// locking since the map is never mutated again.
#[derive(Clone, Default)]
pub struct Catalog {
    by_kind: HashMap<EnvelopeKind, HashMap<String, MessageDescriptor>>,
}

impl Catalog {
    pub fn lookup(&self, kind: EnvelopeKind, tag: &str) -> Option<&MessageDescriptor> {
        self.by_kind.get(&kind).and_then(|m| m.get(tag))
    }
}

/// The mutable, startup-only half of the registry. Register every built-in
/// and application message class here, then call `freeze`.
#[derive(Default)]
pub struct CatalogBuilder {
    by_kind: HashMap<EnvelopeKind, HashMap<String, MessageDescriptor>>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor under every envelope kind it declares as
    /// legal. A single class may be registered under multiple kinds (e.g.
    /// ping is valid incoming and internal) — tags are unique only within
    /// a kind (spec §4.2).
    pub fn register(&mut self, descriptor: MessageDescriptor) -> &mut Self {
        for kind in descriptor.kinds.clone() {
            let bucket = self.by_kind.entry(kind).or_default();
            assert!(
                !bucket.contains_key(&descriptor.tag),
                "duplicate registration of tag {:?} under kind {:?}",
                descriptor.tag,
                kind
            );
            bucket.insert(descriptor.tag.clone(), descriptor.clone());
        }
        self
    }

    pub fn freeze(self) -> Catalog {
        Catalog { by_kind: self.by_kind }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EnvelopeError;
    use crate::handler::SessionHandle;
    use async_trait::async_trait;
    use serde_json::Value;

    struct Noop;

    #[async_trait]
    impl AsyncRunnable for Noop {
        async fn run(
            &self,
            _payload: Option<Value>,
            _meta: &crate::message::MessageMeta,
            _session: &dyn SessionHandle,
        ) -> Result<(), EnvelopeError> {
            Ok(())
        }
    }

    #[test]
    fn lookup_is_scoped_per_kind() {
        let mut builder = CatalogBuilder::new();
        builder.register(MessageDescriptor::runnable(
            "s.ping",
            vec![EnvelopeKind::Incoming, EnvelopeKind::Internal],
            Arc::new(Noop),
        ));
        let catalog = builder.freeze();

        assert!(catalog.lookup(EnvelopeKind::Incoming, "s.ping").is_some());
        assert!(catalog.lookup(EnvelopeKind::Internal, "s.ping").is_some());
        assert!(catalog.lookup(EnvelopeKind::Outgoing, "s.ping").is_none());
        assert!(catalog.lookup(EnvelopeKind::Incoming, "unknown").is_none());
    }

    #[test]
    #[should_panic(expected = "duplicate registration")]
    fn duplicate_tag_within_a_kind_panics_at_startup() {
        let mut builder = CatalogBuilder::new();
        builder.register(MessageDescriptor::runnable(
            "s.ping",
            vec![EnvelopeKind::Incoming],
            Arc::new(Noop),
        ));
        builder.register(MessageDescriptor::runnable(
            "s.ping",
            vec![EnvelopeKind::Incoming],
            Arc::new(Noop),
        ));
    }
}
