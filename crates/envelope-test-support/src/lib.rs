//! Mocks and a WebSocket test client for exercising the messaging fabric
//! without a real broker or a real browser, mirroring the teacher's
//! `rt-test-utils` split between unit-test doubles and a live-socket
//! integration client.

pub mod in_memory_layer;
pub mod mock_session;
pub mod ws_client;

pub use in_memory_layer::InMemoryLayer;
pub use mock_session::{MockSession, SentMessage};
pub use ws_client::TestClient;
