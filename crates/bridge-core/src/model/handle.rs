use serde::{Deserialize, Serialize};
use std::fmt;

/// Referencia opaca a un objeto que vive en el proceso hijo.
///
/// El host nunca posee la memoria del objeto: sólo el id que se reenvía en
/// `CallRequest.instance_id`. No existe protocolo de destrucción por objeto;
/// la referencia deja de ser válida cuando el bridge se apaga.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteHandle {
    pub class_name: String,
    pub instance_id: String,
}

impl RemoteHandle {
    pub fn new(class_name: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self { class_name: class_name.into(),
               instance_id: instance_id.into() }
    }
}

impl fmt::Display for RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.class_name, self.instance_id)
    }
}
