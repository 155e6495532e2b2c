//! Canal saliente sobre un socket local con frames y multiplexor por
//! `request_id`.
//!
//! Un único lector despacha cada respuesta al `oneshot` pendiente de su id.
//! Las respuestas sin entrada pendiente (llegadas tras un timeout) se
//! descartan en el acto, así que no quedan huérfanas.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use bridge_core::{BridgeError, CallRequest, CallResponse};

use crate::channel::CallChannel;
use crate::frame::{read_frame, write_frame};

type Pending = Arc<DashMap<String, oneshot::Sender<CallResponse>>>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub struct SocketCallChannel {
    writer: Mutex<BoxedWriter>,
    pending: Pending,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl std::fmt::Debug for SocketCallChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketCallChannel")
         .field("pending", &self.pending.len())
         .field("closed", &self.closed.load(Ordering::Relaxed))
         .finish()
    }
}

impl SocketCallChannel {
    pub async fn connect_tcp(addr: impl ToSocketAddrs) -> Result<Self, BridgeError> {
        let stream = TcpStream::connect(addr).await.map_err(|e| BridgeError::transport("connect", e))?;
        stream.set_nodelay(true).map_err(|e| BridgeError::transport("set_nodelay", e))?;
        Ok(Self::from_stream(stream))
    }

    #[cfg(unix)]
    pub async fn connect_unix(path: impl AsRef<std::path::Path>) -> Result<Self, BridgeError> {
        let stream = tokio::net::UnixStream::connect(path.as_ref()).await
                                                                   .map_err(|e| BridgeError::transport("connect", e))?;
        Ok(Self::from_stream(stream))
    }

    /// Construye el canal sobre cualquier stream bidireccional. Debe
    /// llamarse dentro de un runtime tokio.
    pub fn from_stream<S>(stream: S) -> Self
        where S: AsyncRead + AsyncWrite + Send + 'static
    {
        let (rd, wr) = tokio::io::split(stream);
        let pending: Pending = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(read_loop(rd, pending.clone(), closed.clone()));
        Self { writer: Mutex::new(Box::new(wr)),
               pending,
               closed,
               reader }
    }

    /// Llamadas en vuelo.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

async fn read_loop<S: AsyncRead>(mut rd: ReadHalf<S>, pending: Pending, closed: Arc<AtomicBool>) {
    loop {
        match read_frame::<_, CallResponse>(&mut rd).await {
            Ok(Some(resp)) => match pending.remove(&resp.request_id) {
                Some((_, tx)) => {
                    let _ = tx.send(resp);
                }
                None => log::warn!("dropping response with no pending call request_id={}", resp.request_id),
            },
            Ok(None) => {
                log::info!("socket channel closed by peer");
                break;
            }
            Err(e) => {
                log::error!("socket channel read failed: {e}");
                break;
            }
        }
    }
    closed.store(true, Ordering::Release);
    // soltar los senders despierta a los llamadores con error
    pending.clear();
}

#[async_trait]
impl CallChannel for SocketCallChannel {
    fn name(&self) -> &'static str {
        "socket"
    }

    async fn exchange(&self, request: CallRequest, timeout: Duration) -> Result<CallResponse, BridgeError> {
        if self.is_closed() {
            return Err(BridgeError::Transport("socket channel is closed".into()));
        }
        let request_id = request.request_id.clone();
        let (tx, rx) = oneshot::channel();
        if self.pending.insert(request_id.clone(), tx).is_some() {
            self.pending.remove(&request_id);
            return Err(BridgeError::Internal(format!("duplicate in-flight request_id {request_id}")));
        }
        // el lector pudo cerrar entre la comprobación y el insert
        if self.is_closed() {
            self.pending.remove(&request_id);
            return Err(BridgeError::Transport("socket channel is closed".into()));
        }

        // un único plazo cubre el lock del writer, la escritura y la espera
        let deadline = tokio::time::Instant::now() + timeout;
        let sent = tokio::time::timeout_at(deadline, async {
                       let mut writer = self.writer.lock().await;
                       write_frame(&mut *writer, &request).await
                   }).await;
        match sent {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.pending.remove(&request_id);
                return Err(e);
            }
            Err(_) => {
                self.pending.remove(&request_id);
                // una trama a medias deja el stream desalineado
                self.closed.store(true, Ordering::Release);
                log::warn!("outbound write stalled request_id={request_id} after {timeout:?}; channel closed");
                return Err(BridgeError::Timeout { request_id,
                                                  waited: timeout });
            }
        }

        match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(_)) => Err(BridgeError::Transport(format!("connection closed before response to {request_id}"))),
            Err(_) => {
                self.pending.remove(&request_id);
                log::warn!("outbound call timed out request_id={request_id} after {timeout:?}");
                Err(BridgeError::Timeout { request_id,
                                           waited: timeout })
            }
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Err(e) = self.writer.lock().await.shutdown().await {
            log::debug!("socket shutdown: {e}");
        }
        self.reader.abort();
        self.pending.clear();
    }
}

impl Drop for SocketCallChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
