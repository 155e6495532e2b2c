//! bridge-callback: callbacks hijo → host.
//!
//! - `registry`: workflows registrados y resolución `(kind, target)`.
//! - `method`: adaptación de aridad (sin args / payload / payload+contexto).
//! - `dispatch`: frontera de una invocación, nunca propaga pánicos.
//! - `pool` + `server` + `http`: transporte HTTP y workers persistentes.

pub mod dispatch;
pub mod http;
pub mod method;
pub mod pool;
pub mod registry;
pub mod server;

pub use bridge_core;

pub use dispatch::dispatch;
pub use method::{CallbackMethod, ContextCell, Handler, IntoOutcome, Invocation, MethodShape};
pub use pool::{SubmitError, WorkerPool};
pub use registry::{RegisteredWorkflow, WorkflowRegistration, WorkflowRouter};
pub use server::{CallbackServer, CallbackServerOptions};
