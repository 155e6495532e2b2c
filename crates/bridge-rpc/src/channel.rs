//! Contrato del canal de llamadas salientes.

use async_trait::async_trait;
use std::time::Duration;

use bridge_core::{BridgeError, CallRequest, CallResponse};

/// Transporte de una `CallRequest` al hijo y de su única `CallResponse` de
/// vuelta. Cada implementación empareja por `request_id`; no hay orden
/// entre llamadas distintas.
#[async_trait]
pub trait CallChannel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Envía la petición y espera la respuesta cruda (incluida
    /// `success=false`). Falla con `Timeout` o `Transport`.
    async fn exchange(&self, request: CallRequest, timeout: Duration) -> Result<CallResponse, BridgeError>;

    /// Como `exchange`, pero `success=false` se convierte en `Remote`.
    async fn call(&self, request: CallRequest, timeout: Duration) -> Result<CallResponse, BridgeError> {
        request.validate()?;
        self.exchange(request, timeout).await?.into_result()
    }

    /// Libera recursos del transporte. Nunca falla.
    async fn close(&self) {}
}
