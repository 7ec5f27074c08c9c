//! Channel Layer Adapter (spec component E). An abstract contract over
//! whatever pub/sub transport sits underneath — the spec deliberately
//! describes only this trait (§4.5), not a concrete backend.

use async_trait::async_trait;

use crate::envelope::LayerPayload;
use crate::error::EnvelopeError;

/// Best-effort fan-out to currently joined members. No delivery guarantee
/// beyond that: duplicate delivery does not occur, but lost messages on
/// broker failure are acceptable (spec §4.5, §5).
#[async_trait]
pub trait ChannelLayer: Send + Sync {
    async fn send(&self, channel_name: &str, payload: LayerPayload) -> Result<(), EnvelopeError>;
    async fn group_send(&self, group_name: &str, payload: LayerPayload) -> Result<(), EnvelopeError>;
    async fn group_add(&self, group_name: &str, channel_name: &str) -> Result<(), EnvelopeError>;
    async fn group_discard(&self, group_name: &str, channel_name: &str) -> Result<(), EnvelopeError>;
}
