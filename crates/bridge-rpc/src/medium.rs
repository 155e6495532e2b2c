//! Medio de intercambio basado en archivos.
//!
//! Layout bajo la raíz compartida con el hijo:
//!
//! ```text
//! <root>/requests/<request_id>.json    escrito por el host, consumido por el hijo
//! <root>/responses/<request_id>.json   escrito por el hijo, consumido por el host
//! ```
//!
//! Todo mensaje se escribe primero a `.<id>.json.tmp` en el mismo directorio
//! y se publica con `rename`, que es atómico dentro de un filesystem: un
//! lector nunca ve un mensaje a medio escribir con el nombre definitivo.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tokio::fs;

use bridge_core::{BridgeError, CallRequest, CallResponse};

pub const REQUESTS_DIR: &str = "requests";
pub const RESPONSES_DIR: &str = "responses";
const MESSAGE_EXT: &str = "json";

/// Resultado de intentar leer una respuesta.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseRead {
    Missing,
    Parsed(CallResponse),
    /// Existe pero no se pudo decodificar (p.ej. escritura parcial de un
    /// hijo que no usa rename).
    Unreadable(String),
}

#[derive(Debug, Clone)]
pub struct ExchangeMedium {
    root: PathBuf,
    requests: PathBuf,
    responses: PathBuf,
}

impl ExchangeMedium {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self { requests: root.join(REQUESTS_DIR),
               responses: root.join(RESPONSES_DIR),
               root }
    }

    pub async fn ensure_dirs(&self) -> Result<(), BridgeError> {
        for dir in [&self.requests, &self.responses] {
            fs::create_dir_all(dir).await
                                   .map_err(|e| BridgeError::transport(&format!("create {}", dir.display()), e))?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn request_path(&self, request_id: &str) -> PathBuf {
        self.requests.join(format!("{request_id}.{MESSAGE_EXT}"))
    }

    pub fn response_path(&self, request_id: &str) -> PathBuf {
        self.responses.join(format!("{request_id}.{MESSAGE_EXT}"))
    }

    pub async fn write_request(&self, request: &CallRequest) -> Result<PathBuf, BridgeError> {
        ensure_safe_id(&request.request_id)?;
        publish(&self.requests, &request.request_id, request).await
    }

    /// Lado hijo del contrato; lo usan el hijo simulado de los tests y las
    /// herramientas de diagnóstico.
    pub async fn write_response(&self, response: &CallResponse) -> Result<PathBuf, BridgeError> {
        ensure_safe_id(&response.request_id)?;
        publish(&self.responses, &response.request_id, response).await
    }

    pub async fn read_response(&self, request_id: &str) -> ResponseRead {
        let path = self.response_path(request_id);
        let bytes = match fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return ResponseRead::Missing,
            Err(e) => return ResponseRead::Unreadable(format!("read {}: {e}", path.display())),
        };
        match serde_json::from_slice::<CallResponse>(&bytes) {
            Ok(mut resp) => {
                if resp.request_id.is_empty() {
                    resp.request_id = request_id.to_string();
                }
                ResponseRead::Parsed(resp)
            }
            Err(e) => ResponseRead::Unreadable(format!("decode {}: {e}", path.display())),
        }
    }

    /// `true` si el archivo existía y fue borrado por esta llamada.
    pub async fn remove_response(&self, request_id: &str) -> bool {
        remove_quiet(&self.response_path(request_id)).await
    }

    pub async fn remove_request(&self, request_id: &str) -> bool {
        remove_quiet(&self.request_path(request_id)).await
    }

    pub async fn response_exists(&self, request_id: &str) -> bool {
        fs::try_exists(self.response_path(request_id)).await.unwrap_or(false)
    }

    /// Lado hijo: toma (lee y borra) todas las peticiones publicadas.
    pub async fn take_requests(&self) -> Result<Vec<CallRequest>, BridgeError> {
        let mut taken = Vec::new();
        for (id, path) in list_messages(&self.requests).await? {
            let bytes = match fs::read(&path).await {
                Ok(b) => b,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(BridgeError::transport(&format!("read {}", path.display()), e)),
            };
            remove_quiet(&path).await;
            match serde_json::from_slice::<CallRequest>(&bytes) {
                Ok(req) => taken.push(req),
                Err(e) => log::warn!("discarding undecodable request id={id}: {e}"),
            }
        }
        Ok(taken)
    }

    /// Ids de las respuestas publicadas y aún no consumidas.
    pub async fn response_ids(&self) -> Result<Vec<String>, BridgeError> {
        Ok(list_messages(&self.responses).await?.into_iter().map(|(id, _)| id).collect())
    }

    /// Borra respuestas sin reclamar (y temporales abandonados) con
    /// antigüedad mayor que `max_age`. Devuelve cuántos archivos borró.
    pub async fn purge_stale(&self, max_age: Duration) -> Result<usize, BridgeError> {
        let now = SystemTime::now();
        let mut purged = 0;
        let mut dir = fs::read_dir(&self.responses).await
                                                   .map_err(|e| BridgeError::transport("list responses", e))?;
        while let Some(entry) = dir.next_entry().await.map_err(|e| BridgeError::transport("list responses", e))? {
            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(m) => m,
                Err(_) => continue,
            };
            let age = now.duration_since(modified).unwrap_or_default();
            if age > max_age && remove_quiet(&entry.path()).await {
                log::info!("purged stale response file={} age={age:?}", entry.path().display());
                purged += 1;
            }
        }
        Ok(purged)
    }
}

/// Los ids terminan en nombres de archivo: sólo `[A-Za-z0-9_-]`.
fn ensure_safe_id(id: &str) -> Result<(), BridgeError> {
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        Ok(())
    } else {
        Err(BridgeError::Internal(format!("request id '{id}' is not usable as a file name")))
    }
}

async fn publish<T: Serialize>(dir: &Path, id: &str, message: &T) -> Result<PathBuf, BridgeError> {
    let bytes = serde_json::to_vec(message)?;
    let tmp = dir.join(format!(".{id}.{MESSAGE_EXT}.tmp"));
    let target = dir.join(format!("{id}.{MESSAGE_EXT}"));
    fs::write(&tmp, &bytes).await
                           .map_err(|e| BridgeError::transport(&format!("write {}", tmp.display()), e))?;
    if let Err(e) = fs::rename(&tmp, &target).await {
        remove_quiet(&tmp).await;
        return Err(BridgeError::transport(&format!("publish {}", target.display()), e));
    }
    Ok(target)
}

async fn remove_quiet(path: &Path) -> bool {
    match fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            log::warn!("could not remove {}: {e}", path.display());
            false
        }
    }
}

/// Mensajes publicados (`<id>.json`), ignorando temporales ocultos.
async fn list_messages(dir: &Path) -> Result<Vec<(String, PathBuf)>, BridgeError> {
    let mut out = Vec::new();
    let mut entries = fs::read_dir(dir).await
                                       .map_err(|e| BridgeError::transport(&format!("list {}", dir.display()), e))?;
    while let Some(entry) = entries.next_entry()
                                   .await
                                   .map_err(|e| BridgeError::transport(&format!("list {}", dir.display()), e))?
    {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        if let Some(id) = name.strip_suffix(&format!(".{MESSAGE_EXT}")) {
            out.push((id.to_string(), path.clone()));
        }
    }
    out.sort();
    Ok(out)
}
