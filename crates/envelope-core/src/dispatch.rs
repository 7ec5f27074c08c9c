//! Dispatcher (spec component C).
//!
//! Given a decoded `Message` and its owning session, decide whether to run
//! it in-process or hand it to the deferred job pipeline, and fire the
//! lifecycle signals every passing message triggers (spec §4.3).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::envelope::EnvelopeKind;
use crate::error::EnvelopeError;
use crate::handler::SessionHandle;
use crate::message::{Message, MessageHandlerKind};
use crate::registry::Catalog;
use crate::signals::{Channel, ListenerShape, SignalKind};

/// What the dispatcher hands to the job pipeline: enough to reconstruct and
/// run the message later on a worker.
pub struct JobDescriptor {
    pub tag: String,
    pub payload: Option<serde_json::Value>,
    pub meta: crate::message::MessageMeta,
    pub ttl: Option<Duration>,
    pub job_timeout: Option<Duration>,
}

/// A handle the dispatcher uses to enqueue deferred jobs, implemented by
/// the job pipeline (component H, in `services/server`).
#[async_trait]
pub trait JobSink: Send + Sync {
    async fn enqueue(&self, job: JobDescriptor) -> Result<JobHandle, EnvelopeError>;
}

#[derive(Debug, Clone)]
pub struct JobHandle {
    pub job_id: String,
}

/// Default queue policy knobs, overridable per message class in a fuller
/// implementation; spec leaves these as the deferred-job pipeline's
/// defaults (§4.8, §5).
pub struct QueuePolicy {
    pub ttl: Duration,
    pub job_timeout: Duration,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        QueuePolicy { ttl: Duration::from_secs(60), job_timeout: Duration::from_secs(30) }
    }
}

pub struct Dispatcher {
    catalog: Arc<Catalog>,
    policy: QueuePolicy,
    pub on_incoming: Channel<Message>,
    pub on_incoming_internal: Channel<Message>,
    pub on_outgoing: Channel<Message>,
    pub on_outgoing_error: Channel<Message>,
}

impl Dispatcher {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Dispatcher {
            catalog,
            policy: QueuePolicy::default(),
            on_incoming: Channel::default(),
            on_incoming_internal: Channel::default(),
            on_outgoing: Channel::default(),
            on_outgoing_error: Channel::default(),
        }
    }

    /// Handle one decoded incoming message: look it up, run it in-process
    /// or enqueue it, emitting the `incoming_websocket_message` signal on
    /// every passing message, or `incoming_internal_message` for a message
    /// re-dispatched off the layer rather than read off the wire (spec
    /// §4.3, §4.4, §6).
    pub async fn dispatch(
        &self,
        message: Message,
        session: &dyn SessionHandle,
        jobs: &dyn JobSink,
    ) -> Result<(), EnvelopeError> {
        if message.meta.envelope_kind == EnvelopeKind::Internal {
            tracing::debug!(signal = ?SignalKind::IncomingInternalMessage, tag = %message.tag, "dispatching internal message");
            self.on_incoming_internal.fire(&message, ListenerShape::Cooperative);
        } else {
            tracing::debug!(signal = ?SignalKind::IncomingWebsocketMessage, tag = %message.tag, "dispatching incoming message");
            self.on_incoming.fire(&message, ListenerShape::Cooperative);
        }

        let Some(descriptor) = self
            .catalog
            .lookup(message.meta.envelope_kind, &message.tag)
        else {
            let err = EnvelopeError::MsgType {
                type_name: message.tag.clone(),
                envelope: message.meta.envelope_kind.as_str().to_owned(),
            };
            session.send_ws_error(&err, &message.meta);
            return Err(err);
        };

        match descriptor.handler_kind {
            MessageHandlerKind::AsyncRunnable => {
                let handler = descriptor
                    .runnable
                    .clone()
                    .expect("runnable descriptor missing handler");
                match handler.run(message.payload.clone(), &message.meta, session).await {
                    Ok(()) => Ok(()),
                    Err(err) => {
                        session.send_ws_error(&err, &message.meta);
                        Err(err)
                    }
                }
            }
            MessageHandlerKind::DeferredJob => {
                let handler = descriptor.job.clone().expect("job descriptor missing handler");
                session.note_job_dispatched();
                let override_payload = match handler.pre_queue(&message.payload, &message.meta, session) {
                    Ok(payload) => payload,
                    Err(err) => {
                        session.send_ws_error(&err, &message.meta);
                        return Err(err);
                    }
                };
                let job = JobDescriptor {
                    tag: message.tag.clone(),
                    payload: override_payload.or_else(|| message.payload.clone()),
                    meta: message.meta.clone(),
                    ttl: Some(self.policy.ttl),
                    job_timeout: Some(self.policy.job_timeout),
                };
                jobs.enqueue(job).await.map(|_handle| ())
            }
        }
    }

    /// Fire `outgoing_websocket_message` for a message that just reached a
    /// socket (spec §6). Called from `ConsumerSession::deliver` rather than
    /// from the enqueue-side `send_ws_message`, since the signal documents
    /// what actually went out, not what was merely buffered.
    pub fn record_outgoing(&self, message: &Message) {
        tracing::debug!(signal = ?SignalKind::OutgoingWebsocketMessage, tag = %message.tag, "outgoing message delivered");
        self.on_outgoing.fire(message, ListenerShape::Cooperative);
    }

    /// Fire `outgoing_websocket_error` for an error envelope that just
    /// reached a socket (spec §6).
    pub fn record_outgoing_error(&self, message: &Message) {
        tracing::debug!(signal = ?SignalKind::OutgoingWebsocketError, tag = %message.tag, "outgoing error delivered");
        self.on_outgoing_error.fire(message, ListenerShape::Cooperative);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EnvelopeKind;
    use crate::handler::{AsyncRunnable, SessionHandle};
    use crate::message::MessageMeta;
    use crate::registry::{CatalogBuilder, MessageDescriptor};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct RecordingSession {
        errors: Mutex<Vec<String>>,
    }

    impl SessionHandle for RecordingSession {
        fn channel_name(&self) -> &str {
            "test-session"
        }
        fn user_pk(&self) -> Option<i64> {
            Some(7)
        }
        fn send_ws_message(&self, _tag: &str, _payload: Option<serde_json::Value>, _meta: &MessageMeta) {}
        fn send_ws_error(&self, error: &EnvelopeError, _meta: &MessageMeta) {
            self.errors.lock().unwrap().push(error.tag().to_owned());
        }
    }

    struct CountingRunnable(Arc<AtomicUsize>);

    #[async_trait]
    impl AsyncRunnable for CountingRunnable {
        async fn run(
            &self,
            _payload: Option<serde_json::Value>,
            _meta: &MessageMeta,
            _session: &dyn SessionHandle,
        ) -> Result<(), EnvelopeError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct NoJobs;

    #[async_trait]
    impl JobSink for NoJobs {
        async fn enqueue(&self, _job: JobDescriptor) -> Result<JobHandle, EnvelopeError> {
            panic!("no jobs expected in this test")
        }
    }

    fn meta() -> MessageMeta {
        MessageMeta {
            id: Some("a".to_owned()),
            user_pk: Some(7),
            consumer_name: "test-session".to_owned(),
            language: None,
            state: None,
            envelope_kind: EnvelopeKind::Incoming,
        }
    }

    #[tokio::test]
    async fn unknown_tag_yields_msg_type_error() {
        let catalog = Arc::new(CatalogBuilder::new().freeze());
        let dispatcher = Dispatcher::new(catalog);
        let session = RecordingSession { errors: Mutex::new(Vec::new()) };
        let message = Message { tag: "jeff".to_owned(), payload: None, meta: meta() };

        let result = dispatcher.dispatch(message, &session, &NoJobs).await;

        assert!(result.is_err());
        assert_eq!(session.errors.lock().unwrap().as_slice(), ["error.msg_type"]);
    }

    #[tokio::test]
    async fn runnable_message_executes_inline() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut builder = CatalogBuilder::new();
        builder.register(MessageDescriptor::runnable(
            "s.ping",
            vec![EnvelopeKind::Incoming],
            Arc::new(CountingRunnable(count.clone())),
        ));
        let dispatcher = Dispatcher::new(Arc::new(builder.freeze()));
        let session = RecordingSession { errors: Mutex::new(Vec::new()) };
        let message = Message { tag: "s.ping".to_owned(), payload: None, meta: meta() };

        dispatcher.dispatch(message, &session, &NoJobs).await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
