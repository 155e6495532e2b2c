//! Registros de callback (hijo → host, sobre HTTP).
//!
//! El cuerpo entrante acepta las dos variantes que emite el hijo:
//! - SAGA: `method_type` + `step_id`
//! - TCC: `phase` + `participant_id`

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::context::ExecutionContextSnapshot;
use crate::errors::BridgeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationKind {
    Step,
    Compensation,
    Try,
    Confirm,
    Cancel,
}

impl InvocationKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "step" | "execute" => Some(Self::Step),
            "compensation" | "compensate" => Some(Self::Compensation),
            "try" => Some(Self::Try),
            "confirm" => Some(Self::Confirm),
            "cancel" => Some(Self::Cancel),
            _ => None,
        }
    }

    /// `true` para las fases TCC (el target es un participante).
    pub fn is_tcc(self) -> bool {
        matches!(self, Self::Try | Self::Confirm | Self::Cancel)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Step => "step",
            Self::Compensation => "compensation",
            Self::Try => "try",
            Self::Confirm => "confirm",
            Self::Cancel => "cancel",
        }
    }
}

impl fmt::Display for InvocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cuerpo HTTP tal como llega; todos los campos opcionales para poder
/// reportar qué falta en vez de un error de serde genérico.
#[derive(Debug, Default, Deserialize)]
struct CallbackBody {
    method_type: Option<String>,
    phase: Option<String>,
    #[serde(default)]
    method_name: String,
    step_id: Option<String>,
    participant_id: Option<String>,
    #[serde(default)]
    input_data: Value,
    #[serde(default)]
    context_data: Value,
    workflow: Option<String>,
}

/// Invocación independiente; sin estado más allá de la petición.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackInvocation {
    pub invocation_kind: InvocationKind,
    pub target_id: String,
    pub method_name: String,
    pub input_payload: Value,
    pub context_snapshot: ExecutionContextSnapshot,
    /// Workflow destino si el hijo lo indica (cuerpo o ruta).
    pub workflow: Option<String>,
}

impl CallbackInvocation {
    pub fn from_wire(body: Value) -> Result<Self, BridgeError> {
        let raw: CallbackBody =
            serde_json::from_value(body).map_err(|e| BridgeError::Transport(format!("malformed callback body: {e}")))?;
        let kind_raw = raw.method_type
                          .as_deref()
                          .or(raw.phase.as_deref())
                          .ok_or_else(|| BridgeError::Transport("callback body lacks method_type/phase".into()))?;
        let invocation_kind = InvocationKind::parse(kind_raw)
            .ok_or_else(|| BridgeError::Transport(format!("unknown callback kind '{kind_raw}'")))?;
        let target_id = raw.step_id
                           .or(raw.participant_id)
                           .filter(|s| !s.is_empty())
                           .ok_or_else(|| BridgeError::Transport("callback body lacks step_id/participant_id".into()))?;
        let input_payload = match raw.input_data {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        Ok(Self { invocation_kind,
                  target_id,
                  method_name: raw.method_name,
                  input_payload,
                  context_snapshot: ExecutionContextSnapshot::from_wire(&raw.context_data),
                  workflow: raw.workflow })
    }
}

/// Resultado devuelto una vez por petición HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_updates: Option<ExecutionContextSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallbackResult {
    pub fn ok(result: Value, context: ExecutionContextSnapshot) -> Self {
        Self { success: true,
               result: Some(result),
               context_updates: Some(context),
               error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false,
               result: None,
               context_updates: None,
               error: Some(error.into()) }
    }

    pub fn from_error(err: &BridgeError) -> Self {
        Self::failed(err.to_string())
    }

    pub fn to_wire(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
                                      serde_json::json!({"success": false, "error": format!("serialize result: {e}")})
                                  })
    }
}
