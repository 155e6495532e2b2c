//! Taxonomía de errores del bridge.
//!
//! - `Transport`, `Timeout` y `Remote` se propagan al llamador saliente.
//! - `Resolution`, `Coercion` y `Execution` nunca cruzan la frontera de una
//!   petición de callback: se convierten en `CallbackResult { success: false }`.
//! - `ProcessStart` es fatal y lleva la salida capturada del hijo.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum BridgeError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("timed out after {waited:?} waiting for response to request {request_id}")]
    Timeout { request_id: String, waited: Duration },
    #[error("remote error: {0}")]
    Remote(String),
    #[error("no callback target for {kind} '{target}'")]
    Resolution { kind: String, target: String },
    #[error("payload coercion failed: {0}")]
    Coercion(String),
    #[error("{0}")]
    Execution(String),
    #[error("child process failed to start: {message}\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}")]
    ProcessStart { message: String, stdout: String, stderr: String },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Atajo para errores de I/O sobre el medio de intercambio.
    pub fn transport(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Transport(format!("{context}: {err}"))
    }

    /// `true` para los fallos que el llamador saliente puede reintentar.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transport(_))
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Transport(format!("json: {err}"))
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
