//! Assembles the process-wide `Catalog` (spec component B): the
//! zero-wiring built-ins from `envelope_core::catalog` plus the
//! `channel.*` subscription protocol handlers, which need the pub/sub
//! layer and signal bus to construct.

use std::sync::Arc;

use envelope_core::catalog::register_builtins;
use envelope_core::envelope::EnvelopeKind;
use envelope_core::layer::ChannelLayer;
use envelope_core::registry::{Catalog, CatalogBuilder, MessageDescriptor};

use crate::channels::ContextChannelRegistry;
use crate::protocol::{LeaveHandler, ListSubscriptionsHandler, RecheckJob, SubscribeJob};
use crate::signals::SignalBus;

pub fn build_catalog(
    registry: Arc<ContextChannelRegistry>,
    layer: Arc<dyn ChannelLayer>,
    signals: Arc<SignalBus>,
) -> Catalog {
    let mut builder = CatalogBuilder::new();
    register_builtins(&mut builder);

    builder.register(MessageDescriptor::job(
        "channel.subscribe",
        vec![EnvelopeKind::Incoming],
        Arc::new(SubscribeJob { registry: registry.clone(), layer: layer.clone(), signals }),
    ));
    builder.register(MessageDescriptor::runnable(
        "channel.leave",
        vec![EnvelopeKind::Incoming],
        Arc::new(LeaveHandler { layer: layer.clone() }),
    ));
    builder.register(MessageDescriptor::runnable(
        "channel.list_subscriptions",
        vec![EnvelopeKind::Incoming],
        Arc::new(ListSubscriptionsHandler),
    ));
    builder.register(MessageDescriptor::job(
        "channel.recheck",
        vec![EnvelopeKind::Internal],
        Arc::new(RecheckJob { registry, layer }),
    ));

    builder.freeze()
}
