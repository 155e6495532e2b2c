//! Cliente saliente: punto de entrada para llamar al hijo.
//!
//! Se construye explícitamente sobre un `CallChannel` y se pasa por
//! contexto; no hay instancia global. Clonar es barato.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bridge_core::constants::DEFAULT_CALL_TIMEOUT;
use bridge_core::{from_wire, BridgeError, CallRequest, CallResponse, FromWire, RemoteHandle};

use crate::channel::CallChannel;
use crate::proxy::{ClassProxy, InstanceProxy, NestedProxy};
use crate::registry::InstanceRegistry;

#[derive(Clone)]
pub struct BridgeClient {
    channel: Arc<dyn CallChannel>,
    default_timeout: Duration,
    instances: InstanceRegistry,
}

impl fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeClient")
         .field("channel", &self.channel.name())
         .field("default_timeout", &self.default_timeout)
         .field("instances", &self.instances.len())
         .finish()
    }
}

impl BridgeClient {
    pub fn new(channel: Arc<dyn CallChannel>) -> Self {
        Self { channel,
               default_timeout: DEFAULT_CALL_TIMEOUT,
               instances: InstanceRegistry::new() }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn instances(&self) -> &InstanceRegistry {
        &self.instances
    }

    pub fn channel(&self) -> &Arc<dyn CallChannel> {
        &self.channel
    }

    /// Envía una petición ya construida; `success=false` es `Remote`.
    pub async fn invoke(&self, request: CallRequest, timeout: Option<Duration>) -> Result<CallResponse, BridgeError> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let (class, method) = (request.target_class.clone(), request.method_name.clone());
        self.channel.call(request, timeout).await.map_err(|e| {
                                                    log::debug!("outbound call failed class={class} method={method}: {e}");
                                                    e
                                                })
    }

    pub async fn call_static(&self, class: &str, method: &str, args: Vec<Value>) -> Result<Value, BridgeError> {
        let resp = self.invoke(CallRequest::new_static(class, method, args), None).await?;
        Ok(resp.result_value())
    }

    pub async fn call_static_as<T: FromWire>(&self,
                                             class: &str,
                                             method: &str,
                                             args: Vec<Value>)
                                             -> Result<T, BridgeError> {
        from_wire(&self.call_static(class, method, args).await?)
    }

    /// Construye una instancia remota; el handle queda en el registro.
    pub async fn construct(&self, class: &str, args: Vec<Value>) -> Result<InstanceProxy, BridgeError> {
        let resp = self.invoke(CallRequest::new_constructor(class, args), None).await?;
        let instance_id = resp.instance_id.ok_or_else(|| {
                                              BridgeError::Transport(format!("constructor of {class} returned no instanceId"))
                                          })?;
        let handle = RemoteHandle::new(class, instance_id);
        self.instances.record(handle.clone());
        log::debug!("remote instance created {handle}");
        Ok(InstanceProxy::new(self.clone(), handle))
    }

    pub async fn call_instance(&self,
                               handle: &RemoteHandle,
                               method: &str,
                               args: Vec<Value>)
                               -> Result<Value, BridgeError> {
        let req = CallRequest::new_instance(&handle.class_name, &handle.instance_id, method, args);
        Ok(self.invoke(req, None).await?.result_value())
    }

    pub fn class(&self, class_name: impl Into<String>) -> ClassProxy {
        ClassProxy::new(self.clone(), class_name)
    }

    /// Proxy de la clase anidada `outer$inner`.
    pub fn nested(&self, outer: &str, inner: &str) -> NestedProxy {
        NestedProxy::new(self.clone(), outer, inner)
    }

    /// Reenlaza un handle conocido (p.ej. recibido en un callback).
    pub fn attach(&self, handle: RemoteHandle) -> InstanceProxy {
        InstanceProxy::new(self.clone(), handle)
    }

    pub async fn close(&self) {
        let forgotten = self.instances.clear();
        if forgotten > 0 {
            log::debug!("forgetting {forgotten} remote instance handles");
        }
        self.channel.close().await;
    }
}
