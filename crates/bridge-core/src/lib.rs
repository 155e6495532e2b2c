//! bridge-core: tipos y reglas compartidas del bridge host⇄hijo.
//!
//! - `model`: registros de llamada saliente, handles remotos, callbacks y
//!   snapshot de contexto.
//! - `marshal`: TypeMarshaller (valores nativos ⇄ JSON) y coerción de
//!   payloads.
//! - `errors`: taxonomía `BridgeError`.
pub mod constants;
pub mod errors;
pub mod marshal;
pub mod model;

pub use errors::{BridgeError, BridgeResult};
pub use marshal::{coerce_payload, from_wire, to_wire, FromWire, Payload, PayloadSchema, ToWire};
pub use model::{CallRequest, CallResponse, CallbackInvocation, CallbackResult, ExecutionContextSnapshot,
                InvocationKind, MethodKind, RemoteHandle};
