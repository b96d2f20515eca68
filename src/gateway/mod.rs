//! Gateway: the in-sandbox process holding the one upstream session to the
//! local LLM engine and multiplexing it to downstream WS/HTTP clients.

pub mod daemon;
pub mod protocol;
pub mod routes;
pub mod state;
pub mod upstream;
pub mod ws;

pub use daemon::{run, GatewayConfig};
pub use protocol::{ClientFrame, DownstreamFrame, InstanceInfo};
pub use state::GatewayState;
pub use upstream::EngineAuth;
