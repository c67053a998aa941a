//! floatchart-llm: text-completion provider abstraction.
//! Interchangeable backends behind one trait, tried in priority order by the gateway.

pub mod backend;
pub mod gateway;
pub mod audit;

pub use backend::{LlmBackend, LlmError, LlmRequest, LlmResponse, Message};
pub use gateway::{build_gateway, BackendConfig, BackendKind, GatewayReply, GatewaySettings, ProviderGateway, ProviderUnavailable};
