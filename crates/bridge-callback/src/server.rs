//! Servidor HTTP de callbacks hijo → host.
//!
//! El bucle de aceptación vive en el runtime del llamador; cada invocación
//! se entrega al `WorkerPool` y la conexión espera su resultado por un
//! oneshot, acotado por `callback_timeout`. Los fallos de negocio viajan
//! con 200 y `success: false`; los de framework con 4xx/5xx.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use bridge_core::constants::{DEFAULT_CALLBACK_TIMEOUT, DEFAULT_CALLBACK_WORKERS};
use bridge_core::{BridgeError, CallbackInvocation, CallbackResult};

use crate::dispatch::dispatch;
use crate::http::{read_request, write_json, HttpError, HttpRequest};
use crate::pool::{SubmitError, WorkerPool};
use crate::registry::{RegisteredWorkflow, WorkflowRouter};

#[derive(Debug, Clone)]
pub struct CallbackServerOptions {
    pub workers: usize,
    pub queue_capacity: usize,
    pub callback_timeout: Duration,
    /// Tiempo máximo para recibir la petición completa.
    pub read_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for CallbackServerOptions {
    fn default() -> Self {
        Self { workers: DEFAULT_CALLBACK_WORKERS,
               queue_capacity: 64,
               callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
               read_timeout: Duration::from_secs(30),
               shutdown_timeout: Duration::from_secs(5) }
    }
}

struct Shared {
    router: WorkflowRouter,
    pool: WorkerPool,
    opts: CallbackServerOptions,
}

struct Running {
    url: String,
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    accept: JoinHandle<()>,
    shared: Arc<Shared>,
}

/// Ruta HTTP reconocida.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Route {
    Health,
    Callback { workflow: Option<String> },
}

fn route(path: &str) -> Option<Route> {
    match path.trim_end_matches('/') {
        "/health" => Some(Route::Health),
        "/callback" | "/saga/callback" | "/tcc/callback" => Some(Route::Callback { workflow: None }),
        other => {
            let name = other.strip_prefix("/workflows/")?.strip_suffix("/callback")?;
            if name.is_empty() || name.contains('/') {
                return None;
            }
            Some(Route::Callback { workflow: Some(name.to_string()) })
        }
    }
}

pub struct CallbackServer {
    router: WorkflowRouter,
    opts: CallbackServerOptions,
    running: Option<Running>,
}

impl std::fmt::Debug for CallbackServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackServer")
         .field("url", &self.url())
         .field("workflows", &self.router.names())
         .finish()
    }
}

impl CallbackServer {
    pub fn new(router: WorkflowRouter, opts: CallbackServerOptions) -> Self {
        Self { router,
               opts,
               running: None }
    }

    pub fn router(&self) -> &WorkflowRouter {
        &self.router
    }

    /// Registra un workflow; vale también con el servidor en marcha.
    pub fn register(&self, workflow: RegisteredWorkflow) -> Result<(), BridgeError> {
        self.router.register(workflow)
    }

    /// URL base anunciada al hijo (`http://host:port`).
    pub fn url(&self) -> Option<&str> {
        self.running.as_ref().map(|r| r.url.as_str())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.addr)
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Enlaza `host:port` (0 = efímero) y empieza a aceptar. Devuelve la
    /// URL efectiva. Llamarlo con el servidor ya arrancado devuelve la
    /// misma URL.
    pub async fn start(&mut self, host: &str, port: u16) -> Result<String, BridgeError> {
        if let Some(r) = &self.running {
            return Ok(r.url.clone());
        }
        let listener = TcpListener::bind((host, port)).await
                                                      .map_err(|e| BridgeError::transport(&format!("bind {host}:{port}"), e))?;
        let addr = listener.local_addr()
                           .map_err(|e| BridgeError::transport("callback listener address", e))?;
        let advertised = if addr.ip().is_unspecified() {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
        } else {
            addr
        };
        let url = format!("http://{advertised}");

        let pool = WorkerPool::new(self.opts.workers, self.opts.queue_capacity)?;
        let shared = Arc::new(Shared { router: self.router.clone(),
                                       pool,
                                       opts: self.opts.clone() });
        let (shutdown, shutdown_rx) = watch::channel(false);
        let accept = tokio::spawn(accept_loop(listener, shared.clone(), shutdown_rx));

        log::info!("callback server listening url={url} workers={} queue={}",
                   self.opts.workers,
                   self.opts.queue_capacity);
        self.running = Some(Running { url: url.clone(),
                                      addr,
                                      shutdown,
                                      accept,
                                      shared });
        Ok(url)
    }

    /// Deja de aceptar, drena el pool y libera el puerto. Idempotente.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        let _ = running.shutdown.send(true);
        let _ = running.accept.await;
        let shared = running.shared;
        let timeout = shared.opts.shutdown_timeout;
        let _ = tokio::task::spawn_blocking(move || shared.pool.shutdown(timeout)).await;
        log::info!("callback server stopped url={}", running.url);
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.shutdown.send(true);
            running.accept.abort();
        }
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let shared = shared.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &shared).await {
                            log::debug!("callback connection from {peer} ended with error: {e}");
                        }
                    });
                }
                Err(e) => {
                    log::warn!("callback accept failed: {e}");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, shared: &Shared) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);
    let (status, body) = match tokio::time::timeout(shared.opts.read_timeout, read_request(&mut reader)).await {
        Err(_) => (500, failure("timed out reading request")),
        Ok(Err(HttpError::Io(e))) => return Err(e),
        Ok(Err(HttpError::TooLarge(n))) => (413, failure(&HttpError::TooLarge(n).to_string())),
        Ok(Err(e)) => (500, failure(&e.to_string())),
        Ok(Ok(req)) => respond(req, shared).await,
    };
    let mut stream = reader.into_inner();
    write_json(&mut stream, status, &body).await?;
    stream.shutdown().await
}

async fn respond(req: HttpRequest, shared: &Shared) -> (u16, Value) {
    match (route(&req.path), req.method.as_str()) {
        (None, _) => (404, failure(&format!("no route for {}", req.path))),
        (Some(Route::Health), "GET") => (200, health(shared)),
        (Some(Route::Callback { workflow }), "POST") => handle_callback(&req.body, workflow, shared).await,
        (Some(_), method) => (405, failure(&format!("method {method} not allowed on {}", req.path))),
    }
}

fn health(shared: &Shared) -> Value {
    json!({
        "status": "ok",
        "workflows": shared.router.names(),
        "workers": shared.pool.size(),
        "busy": shared.pool.busy(),
        "queued": shared.pool.queued(),
    })
}

async fn handle_callback(body: &[u8], path_workflow: Option<String>, shared: &Shared) -> (u16, Value) {
    let mut invocation = match serde_json::from_slice::<Value>(body).map_err(|e| BridgeError::Transport(format!("malformed callback body: {e}")))
                                                                    .and_then(CallbackInvocation::from_wire)
    {
        Ok(inv) => inv,
        Err(e) => {
            log::warn!("rejecting callback: {e}");
            return (500, failure(&e.to_string()));
        }
    };
    if path_workflow.is_some() {
        invocation.workflow = path_workflow;
    }

    let kind = invocation.invocation_kind;
    let target = invocation.target_id.clone();
    let correlation = invocation.context_snapshot.correlation_id.clone();
    log::debug!("callback received {kind} '{target}' correlation_id={correlation}");

    let (tx, rx) = oneshot::channel::<CallbackResult>();
    let router = shared.router.clone();
    let submitted = shared.pool.try_submit(move |rt: &tokio::runtime::Runtime| {
                                    let _ = tx.send(dispatch(&router, invocation, rt));
                                });
    match submitted {
        Ok(()) => {}
        Err(SubmitError::QueueFull) => {
            log::warn!("callback queue full, rejecting {kind} '{target}'");
            return (503, failure("callback workers saturated, retry later"));
        }
        Err(SubmitError::Closed) => return (503, failure("callback server shutting down")),
    }

    match tokio::time::timeout(shared.opts.callback_timeout, rx).await {
        Ok(Ok(result)) => (200, result.to_wire()),
        Ok(Err(_)) => (500, failure("callback worker dropped the invocation")),
        Err(_) => {
            log::error!("{kind} '{target}' exceeded {:?} correlation_id={correlation}",
                        shared.opts.callback_timeout);
            (200,
             failure(&format!("callback {kind} '{target}' timed out after {:?}", shared.opts.callback_timeout)))
        }
    }
}

fn failure(message: &str) -> Value {
    CallbackResult::failed(message).to_wire()
}
