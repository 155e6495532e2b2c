//! Proxies de clases e instancias remotas.
//!
//! Un proxy es un valor: `(clase, id)` más el cliente por el que viaja.
//! Igualdad y hash ignoran el cliente. Ningún proxy posee memoria remota.

use serde_json::Value;
use std::fmt;
use std::hash::{Hash, Hasher};

use bridge_core::constants::{CONSTANT_LOOKUP_METHOD, NESTED_CLASS_SEPARATOR};
use bridge_core::{from_wire, BridgeError, CallRequest, FromWire, RemoteHandle};

use crate::client::BridgeClient;

#[derive(Clone)]
pub struct ClassProxy {
    client: BridgeClient,
    class_name: String,
}

impl ClassProxy {
    pub fn new(client: BridgeClient, class_name: impl Into<String>) -> Self {
        Self { client,
               class_name: class_name.into() }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub async fn construct(&self, args: Vec<Value>) -> Result<InstanceProxy, BridgeError> {
        self.client.construct(&self.class_name, args).await
    }

    pub async fn call_static(&self, method: &str, args: Vec<Value>) -> Result<Value, BridgeError> {
        self.client.call_static(&self.class_name, method, args).await
    }

    pub async fn call_static_as<T: FromWire>(&self, method: &str, args: Vec<Value>) -> Result<T, BridgeError> {
        self.client.call_static_as(&self.class_name, method, args).await
    }
}

impl fmt::Debug for ClassProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassProxy({})", self.class_name)
    }
}

impl PartialEq for ClassProxy {
    fn eq(&self, other: &Self) -> bool {
        self.class_name == other.class_name
    }
}

impl Eq for ClassProxy {}

#[derive(Clone)]
pub struct InstanceProxy {
    client: BridgeClient,
    handle: RemoteHandle,
}

impl InstanceProxy {
    pub fn new(client: BridgeClient, handle: RemoteHandle) -> Self {
        Self { client, handle }
    }

    pub fn handle(&self) -> &RemoteHandle {
        &self.handle
    }

    pub fn class_name(&self) -> &str {
        &self.handle.class_name
    }

    pub fn instance_id(&self) -> &str {
        &self.handle.instance_id
    }

    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, BridgeError> {
        self.client.call_instance(&self.handle, method, args).await
    }

    pub async fn call_as<T: FromWire>(&self, method: &str, args: Vec<Value>) -> Result<T, BridgeError> {
        from_wire(&self.call(method, args).await?)
    }
}

impl fmt::Debug for InstanceProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceProxy({})", self.handle)
    }
}

impl fmt::Display for InstanceProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.handle, f)
    }
}

impl PartialEq for InstanceProxy {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for InstanceProxy {}

impl Hash for InstanceProxy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.handle.hash(state);
    }
}

/// Proxy restringido para clases anidadas del hijo (típicamente enums):
/// sólo resuelve constantes por nombre.
#[derive(Clone)]
pub struct NestedProxy {
    client: BridgeClient,
    class_name: String,
}

impl NestedProxy {
    pub fn new(client: BridgeClient, outer: &str, inner: &str) -> Self {
        Self { client,
               class_name: format!("{outer}{NESTED_CLASS_SEPARATOR}{inner}") }
    }

    /// Nombre binario de la clase (`Outer$Inner`).
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Valor de la constante tal como lo serializa el hijo.
    pub async fn constant(&self, name: &str) -> Result<Value, BridgeError> {
        self.client
            .call_static(&self.class_name, CONSTANT_LOOKUP_METHOD, vec![Value::String(name.to_string())])
            .await
    }

    /// La constante como instancia remota, para pasarla a otras llamadas.
    pub async fn constant_instance(&self, name: &str) -> Result<InstanceProxy, BridgeError> {
        let req = CallRequest::new_static(&self.class_name,
                                          CONSTANT_LOOKUP_METHOD,
                                          vec![Value::String(name.to_string())]);
        let resp = self.client.invoke(req, None).await?;
        let id = resp.instance_id.ok_or_else(|| {
                                     BridgeError::Remote(format!("{}.{name} is not an addressable constant",
                                                                 self.class_name))
                                 })?;
        Ok(self.client.attach(RemoteHandle::new(&self.class_name, id)))
    }
}

impl fmt::Debug for NestedProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NestedProxy({})", self.class_name)
    }
}
