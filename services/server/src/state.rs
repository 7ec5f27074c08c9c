//! Process-wide `AppState` (spec §5): the catalog, dispatcher, pub/sub
//! layer, job pipeline, and signal bus are each built once at startup and
//! shared behind `Arc` — no runtime mutation of any of them.

use std::sync::Arc;

use envelope_core::dispatch::Dispatcher;
use envelope_core::layer::ChannelLayer;
use envelope_core::registry::Catalog;
use sqlx::PgPool;
use tokio::sync::mpsc;

use crate::channels::ContextChannelRegistry;
use crate::config::{BatchShape, EnvelopeConfig};
use crate::jobs::{InProcessJobSink, WorkerPool};
use crate::layer::InProcessLayer;
use crate::sender::{BatchFactory, PayloadListBatch, TabularBatch};
use crate::signals::SignalBus;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<EnvelopeConfig>,
    pub catalog: Arc<Catalog>,
    pub dispatcher: Arc<Dispatcher>,
    pub layer: Arc<dyn ChannelLayer>,
    pub in_process_layer: Arc<InProcessLayer>,
    pub jobs: Arc<InProcessJobSink>,
    pub channel_registry: Arc<ContextChannelRegistry>,
    pub signals: Arc<SignalBus>,
}

impl AppState {
    /// Wires the whole process graph (spec §5's "startup" phase): build the
    /// layer and signal bus first (the catalog's job handlers borrow them),
    /// freeze the catalog, then spin up the worker pool against it.
    pub fn new(pool: PgPool, config: EnvelopeConfig) -> Self {
        let config = Arc::new(config);
        let in_process_layer = Arc::new(InProcessLayer::new());
        let layer: Arc<dyn ChannelLayer> = in_process_layer.clone();
        let channel_registry = Arc::new(ContextChannelRegistry::new());
        let signals = Arc::new(SignalBus::default());

        let catalog =
            Arc::new(crate::catalog::build_catalog(channel_registry.clone(), layer.clone(), signals.clone()));

        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let jobs = Arc::new(InProcessJobSink::new(job_tx));

        let batch_factory: Arc<dyn BatchFactory> = match config.batch_shape {
            BatchShape::PayloadList => Arc::new(PayloadListBatch),
            BatchShape::Tabular => Arc::new(TabularBatch),
        };
        WorkerPool::new(catalog.clone(), layer.clone(), batch_factory).spawn(config.job_workers, job_rx);

        let dispatcher = Arc::new(Dispatcher::new(catalog.clone()));

        AppState { pool, config, catalog, dispatcher, layer, in_process_layer, jobs, channel_registry, signals }
    }
}
