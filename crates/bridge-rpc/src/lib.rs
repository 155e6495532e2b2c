//! bridge-rpc: llamadas salientes host → hijo.
//!
//! - `medium` + `file_channel`: intercambio por archivos con sondeo.
//! - `frame` + `socket_channel`: socket local con frames y multiplexor.
//! - `client`, `proxy`, `registry`, `macros`: la cara tipada para el
//!   llamador.

pub mod channel;
pub mod client;
pub mod file_channel;
pub mod frame;
pub mod macros;
pub mod medium;
pub mod proxy;
pub mod registry;
pub mod socket_channel;

pub use bridge_core;

pub use channel::CallChannel;
pub use client::BridgeClient;
pub use file_channel::{FileCallChannel, FileChannelOptions};
pub use medium::ExchangeMedium;
pub use proxy::{ClassProxy, InstanceProxy, NestedProxy};
pub use registry::InstanceRegistry;
pub use socket_channel::SocketCallChannel;
