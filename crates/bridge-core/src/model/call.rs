//! Registros de llamada saliente (host → hijo).
//!
//! El formato JSON es el contrato con el proceso hijo: claves en camelCase,
//! `methodType` en minúsculas e `instanceId` omitido cuando no aplica.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::constants::CONSTRUCTOR_METHOD;
use crate::errors::BridgeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodKind {
    Static,
    Instance,
    Constructor,
}

/// Genera un identificador de petición único para la vida del bridge.
pub fn new_request_id() -> String {
    format!("req-{}", Uuid::new_v4().simple())
}

/// Petición inmutable; se descarta tras consumir su respuesta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    pub request_id: String,
    #[serde(rename = "className")]
    pub target_class: String,
    pub method_name: String,
    #[serde(rename = "methodType")]
    pub method_kind: MethodKind,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

impl CallRequest {
    pub fn new_static(class: impl Into<String>, method: impl Into<String>, args: Vec<Value>) -> Self {
        Self { request_id: new_request_id(),
               target_class: class.into(),
               method_name: method.into(),
               method_kind: MethodKind::Static,
               args,
               instance_id: None }
    }

    pub fn new_constructor(class: impl Into<String>, args: Vec<Value>) -> Self {
        Self { request_id: new_request_id(),
               target_class: class.into(),
               method_name: CONSTRUCTOR_METHOD.to_string(),
               method_kind: MethodKind::Constructor,
               args,
               instance_id: None }
    }

    pub fn new_instance(class: impl Into<String>,
                        instance_id: impl Into<String>,
                        method: impl Into<String>,
                        args: Vec<Value>)
                        -> Self {
        Self { request_id: new_request_id(),
               target_class: class.into(),
               method_name: method.into(),
               method_kind: MethodKind::Instance,
               args,
               instance_id: Some(instance_id.into()) }
    }

    /// Sustituye el id generado (útil cuando el llamador ya reservó uno).
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Valida la coherencia entre `method_kind` e `instance_id`.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.request_id.is_empty() {
            return Err(BridgeError::Internal("request_id must not be empty".into()));
        }
        match (self.method_kind, &self.instance_id) {
            (MethodKind::Instance, None) => {
                Err(BridgeError::Internal(format!("instance call {}.{} without instance_id",
                                                  self.target_class, self.method_name)))
            }
            (MethodKind::Static | MethodKind::Constructor, Some(_)) => {
                Err(BridgeError::Internal(format!("{:?} call {}.{} must not carry instance_id",
                                                  self.method_kind, self.target_class, self.method_name)))
            }
            _ => Ok(()),
        }
    }
}

/// Respuesta producida una sola vez por el hijo.
///
/// `request_id` no viaja necesariamente en el cuerpo (el nombre del archivo
/// ya lo identifica); el canal lo rellena al leerla.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResponse {
    #[serde(default)]
    pub request_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

impl CallResponse {
    pub fn ok(request_id: impl Into<String>, result: Value) -> Self {
        Self { request_id: request_id.into(),
               success: true,
               result: Some(result),
               error: None,
               instance_id: None }
    }

    pub fn constructed(request_id: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self { request_id: request_id.into(),
               success: true,
               result: None,
               error: None,
               instance_id: Some(instance_id.into()) }
    }

    pub fn failed(request_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self { request_id: request_id.into(),
               success: false,
               result: None,
               error: Some(error.into()),
               instance_id: None }
    }

    /// Convierte `success=false` en `BridgeError::Remote`.
    pub fn into_result(self) -> Result<Self, BridgeError> {
        if self.success {
            Ok(self)
        } else {
            let msg = self.error.unwrap_or_else(|| "remote call failed without message".to_string());
            Err(BridgeError::Remote(msg))
        }
    }

    /// Valor de retorno, `Null` si el hijo no envió `result`.
    pub fn result_value(&self) -> Value {
        self.result.clone().unwrap_or(Value::Null)
    }
}
