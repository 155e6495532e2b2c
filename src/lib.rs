//! sagabridge
//!
//! Puente entre el host y un proceso hijo JVM que orquesta SAGA/TCC:
//! - llamadas salientes host → hijo (`bridge_rpc`), por archivos o socket;
//! - callbacks hijo → host (`bridge_callback`) sobre HTTP local;
//! - ciclo de vida del hijo (`bridge_process`).
//!
//! `Bridge` junta las tres piezas a partir de un `BridgeConfig`.

pub mod bridge;
pub mod config;

pub use bridge::{Bridge, BridgeBuilder};
pub use config::{init_dotenv, BridgeConfig};

pub use bridge_callback::{ContextCell, Handler, WorkflowRegistration};
pub use bridge_core::{BridgeError, ExecutionContextSnapshot, Payload, PayloadSchema, RemoteHandle};
pub use bridge_rpc::{remote_class, BridgeClient, InstanceProxy};
