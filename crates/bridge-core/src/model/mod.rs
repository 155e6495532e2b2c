//! Modelos de datos que cruzan la frontera de proceso (llamadas salientes,
//! handles remotos, callbacks y snapshot de contexto).

pub mod call;
pub mod callback;
pub mod context;
pub mod handle;

pub use call::{new_request_id, CallRequest, CallResponse, MethodKind};
pub use callback::{CallbackInvocation, CallbackResult, InvocationKind};
pub use context::ExecutionContextSnapshot;
pub use handle::RemoteHandle;
