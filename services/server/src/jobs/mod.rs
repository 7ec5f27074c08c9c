//! Deferred Job Pipeline (spec component H, §4.8). `InProcessJobSink` is
//! the `envelope_core::dispatch::JobSink` the dispatcher enqueues into;
//! `WorkerPool` is the parallel side that actually runs `run_job`.

pub mod housekeeping;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use envelope_core::dispatch::{JobDescriptor, JobHandle, JobSink};
use envelope_core::envelope::{self, EnvelopeKind, EnvelopeState, Transport};
use envelope_core::error::EnvelopeError;
use envelope_core::handler::JobContext;
use envelope_core::layer::ChannelLayer;
use envelope_core::message::MessageMeta;
use envelope_core::registry::Catalog;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::time::timeout;
use uuid::Uuid;

use crate::sender::{BatchFactory, BufferedSend, SendTarget, TransactionSender};

pub struct QueuedJob {
    pub descriptor: JobDescriptor,
    pub enqueued_at: Instant,
}

/// The `JobSink` the dispatcher enqueues into (spec §4.3). Backed by an
/// in-process unbounded channel — FIFO per queue, as required by §4.8 —
/// rather than an external broker, matching the spec's stance that the
/// concrete queue backend is an implementation detail.
pub struct InProcessJobSink {
    tx: mpsc::UnboundedSender<QueuedJob>,
}

impl InProcessJobSink {
    pub fn new(tx: mpsc::UnboundedSender<QueuedJob>) -> Self {
        InProcessJobSink { tx }
    }
}

#[async_trait]
impl JobSink for InProcessJobSink {
    async fn enqueue(&self, job: JobDescriptor) -> Result<JobHandle, EnvelopeError> {
        let job_id = Uuid::new_v4().to_string();
        self.tx
            .send(QueuedJob { descriptor: job, enqueued_at: Instant::now() })
            .map_err(|_| EnvelopeError::Job { reason: "job queue is closed".to_owned() })?;
        Ok(JobHandle { job_id })
    }
}

/// What a running job sees of the outside world: where to route replies,
/// and the transactional sender that buffers `on_commit=true` sends until
/// the job's unit of work completes (spec §4.8, §4.9).
struct WorkerJobContext {
    channel_name: String,
    user_pk: Option<i64>,
    layer: Arc<dyn ChannelLayer>,
    catalog: Arc<Catalog>,
    sender: TransactionSender,
}

#[async_trait]
impl JobContext for WorkerJobContext {
    fn target_channel_name(&self) -> &str {
        &self.channel_name
    }

    fn target_user_pk(&self) -> Option<i64> {
        self.user_pk
    }

    async fn send_to_origin(&self, tag: &str, payload: Option<Value>, meta: &MessageMeta, on_commit: bool) {
        let allow_batch =
            self.catalog.lookup(EnvelopeKind::Outgoing, tag).map(|d| d.allow_batch).unwrap_or(false);
        let send = BufferedSend {
            tag: tag.to_owned(),
            payload,
            meta: meta.clone(),
            target: SendTarget::Consumer(self.channel_name.clone()),
            envelope_kind: EnvelopeKind::Outgoing,
            state: EnvelopeState::Success,
            allow_batch,
        };
        if on_commit {
            self.sender.buffer(send);
        } else {
            let _ = TransactionSender::send_immediate(self.layer.as_ref(), &send).await;
        }
    }

    async fn send_error_to_origin(&self, error: &EnvelopeError, meta: &MessageMeta) {
        let envelope = error.to_envelope(meta.id.clone());
        if let Ok(payload) = envelope::to_layer_payload(&envelope, Transport::Text, envelope::routing_tag::WS_ERROR_SEND) {
            let _ = self.layer.send(&self.channel_name, payload).await;
        }
    }
}

pub struct WorkerPool {
    catalog: Arc<Catalog>,
    layer: Arc<dyn ChannelLayer>,
    batch_factory: Arc<dyn BatchFactory>,
}

impl WorkerPool {
    pub fn new(catalog: Arc<Catalog>, layer: Arc<dyn ChannelLayer>, batch_factory: Arc<dyn BatchFactory>) -> Arc<Self> {
        Arc::new(WorkerPool { catalog, layer, batch_factory })
    }

    /// Spawn `worker_count` tasks pulling from the shared receiver — the
    /// "parallel worker pool" tier of spec §5.
    pub fn spawn(self: Arc<Self>, worker_count: usize, rx: mpsc::UnboundedReceiver<QueuedJob>) {
        let rx = Arc::new(AsyncMutex::new(rx));
        for _ in 0..worker_count.max(1) {
            let worker = self.clone();
            let rx = rx.clone();
            tokio::spawn(async move { worker.run_loop(&rx).await });
        }
    }

    async fn run_loop(&self, rx: &AsyncMutex<mpsc::UnboundedReceiver<QueuedJob>>) {
        loop {
            let job = {
                let mut guard = rx.lock().await;
                guard.recv().await
            };
            let Some(job) = job else { break };
            self.execute(job.descriptor, job.enqueued_at).await;
        }
    }

    async fn execute(&self, descriptor: JobDescriptor, enqueued_at: Instant) {
        let Some(msg_descriptor) = self.catalog.lookup(descriptor.meta.envelope_kind, &descriptor.tag) else {
            tracing::warn!(tag = %descriptor.tag, "job executed for a tag no longer in the catalog");
            return;
        };
        let Some(handler) = msg_descriptor.job.clone() else {
            tracing::warn!(tag = %descriptor.tag, "job tag resolved to a non-job descriptor");
            return;
        };

        if let Some(ttl) = descriptor.ttl {
            if enqueued_at.elapsed() >= ttl {
                let ctx = WorkerJobContext {
                    channel_name: descriptor.meta.consumer_name.clone(),
                    user_pk: descriptor.meta.user_pk,
                    layer: self.layer.clone(),
                    catalog: self.catalog.clone(),
                    sender: TransactionSender::new(),
                };
                ctx.send_error_to_origin(&EnvelopeError::Job { reason: "job expired in queue".to_owned() }, &descriptor.meta).await;
                return;
            }
        }

        let ctx = WorkerJobContext {
            channel_name: descriptor.meta.consumer_name.clone(),
            user_pk: descriptor.meta.user_pk,
            layer: self.layer.clone(),
            catalog: self.catalog.clone(),
            sender: TransactionSender::new(),
        };

        let run = handler.run_job(descriptor.payload.clone(), descriptor.meta.clone(), &ctx);
        let outcome = match descriptor.job_timeout {
            Some(d) => timeout(d, run).await.unwrap_or(Err(EnvelopeError::Job { reason: "job timed out".to_owned() })),
            None => run.await,
        };

        match outcome {
            Ok(()) => {
                if let Err(err) = ctx.sender.flush(self.layer.as_ref(), self.batch_factory.as_ref()).await {
                    tracing::warn!(%err, "failed to flush transactional sender after job commit");
                }
            }
            Err(err) => {
                // A failed job's buffered sends are dropped — "a transaction
                // may not commit, so errors must not ride along" (spec §4.9).
                ctx.send_error_to_origin(&err, &descriptor.meta).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use envelope_core::envelope::EnvelopeKind as EK;
    use envelope_core::handler::DeferredJob;
    use envelope_core::registry::{CatalogBuilder, MessageDescriptor};
    use envelope_test_support::InMemoryLayer;

    struct EchoJob;

    #[async_trait]
    impl DeferredJob for EchoJob {
        async fn run_job(&self, _payload: Option<Value>, meta: MessageMeta, ctx: &dyn JobContext) -> Result<(), EnvelopeError> {
            ctx.send_to_origin("s.pong", None, &meta, false).await;
            Ok(())
        }
    }

    fn descriptor(ttl: Option<std::time::Duration>) -> JobDescriptor {
        JobDescriptor {
            tag: "echo.job".to_owned(),
            payload: None,
            meta: MessageMeta {
                id: None,
                user_pk: Some(7),
                consumer_name: "consumer-1".to_owned(),
                language: None,
                state: None,
                envelope_kind: EK::Internal,
            },
            ttl,
            job_timeout: None,
        }
    }

    fn pool(layer: Arc<InMemoryLayer>) -> WorkerPool {
        let mut builder = CatalogBuilder::new();
        builder.register(MessageDescriptor::job("echo.job", vec![EK::Internal], Arc::new(EchoJob)));
        let catalog = Arc::new(builder.freeze());
        WorkerPool { catalog, layer, batch_factory: Arc::new(crate::sender::PayloadListBatch) }
    }

    #[tokio::test]
    async fn expired_ttl_fails_the_job_without_running_it() {
        let layer = Arc::new(InMemoryLayer::new());
        let mut rx = layer.register("consumer-1");
        let pool = pool(layer.clone());

        let enqueued_at = Instant::now() - std::time::Duration::from_secs(120);
        pool.execute(descriptor(Some(std::time::Duration::from_secs(60))), enqueued_at).await;

        let payload = rx.try_recv().expect("expired job should send an error reply");
        assert_eq!(payload["type"], Value::String(envelope::routing_tag::WS_ERROR_SEND.to_owned()));
    }

    #[tokio::test]
    async fn unexpired_ttl_runs_the_job_normally() {
        let layer = Arc::new(InMemoryLayer::new());
        let mut rx = layer.register("consumer-1");
        let pool = pool(layer.clone());

        pool.execute(descriptor(Some(std::time::Duration::from_secs(60))), Instant::now()).await;

        let payload = rx.try_recv().expect("unexpired job should run and reply");
        assert_eq!(payload["t"], Value::String("s.pong".to_owned()));
    }
}
