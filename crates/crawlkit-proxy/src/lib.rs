//! Dispatch clients that execute crawl requests through remote services.
//!
//! [`ProxyClient`] talks to the proxy-manager fleet over JSON RPC and
//! rebuilds the full response graph, redirect hops included.
//! [`GatewayClient`] reaches a third-party proxying gateway over plain
//! HTTPS. [`FallbackClient`] pairs the two. All of them implement
//! [`crawlkit_http::Client`], so spiders never see which transport ran.

pub mod dispatch;
pub mod fallback;
pub mod gateway;
pub mod reconstruct;
pub mod rpc;
pub mod session;
pub mod wire;

pub use dispatch::{ProxyClient, ProxyClientBuilder};
pub use fallback::FallbackClient;
pub use gateway::{GatewayClient, GatewayConfig, DEFAULT_GATEWAY_BASE_URL};
pub use reconstruct::MAX_REDIRECT_DEPTH;
pub use rpc::{RpcChannel, RpcConfig};
pub use session::RemoteCookieJar;
