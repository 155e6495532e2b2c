//! Canal saliente sobre el medio de archivos (sondeo con intervalo fijo).
//!
//! Respuestas huérfanas: cuando una llamada agota su timeout, su id queda
//! en un conjunto de ids vencidos durante `orphan_ttl`. Cada llamada (y
//! `sweep_orphans`) borra las respuestas que aparezcan para esos ids. Lo
//! que escape a ese conjunto lo recoge `purge_stale`.

use async_trait::async_trait;
use dashmap::DashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use bridge_core::constants::{DEFAULT_POLL_INTERVAL, RESPONSE_PARSE_RETRIES};
use bridge_core::{BridgeError, CallRequest, CallResponse};

use crate::channel::CallChannel;
use crate::medium::{ExchangeMedium, ResponseRead};

#[derive(Debug, Clone)]
pub struct FileChannelOptions {
    pub poll_interval: Duration,
    /// Lecturas fallidas toleradas antes de reportar `Transport`.
    pub parse_retries: u32,
    /// Tiempo que se recuerda un id vencido.
    pub orphan_ttl: Duration,
}

impl Default for FileChannelOptions {
    fn default() -> Self {
        Self { poll_interval: DEFAULT_POLL_INTERVAL,
               parse_retries: RESPONSE_PARSE_RETRIES,
               orphan_ttl: Duration::from_secs(600) }
    }
}

#[derive(Debug)]
pub struct FileCallChannel {
    medium: ExchangeMedium,
    opts: FileChannelOptions,
    timed_out: DashMap<String, Instant>,
}

impl FileCallChannel {
    /// Abre el medio bajo `root`, creando `requests/` y `responses/`.
    pub async fn open(root: impl Into<PathBuf>, opts: FileChannelOptions) -> Result<Self, BridgeError> {
        let medium = ExchangeMedium::new(root);
        medium.ensure_dirs().await?;
        Ok(Self { medium,
                  opts,
                  timed_out: DashMap::new() })
    }

    pub fn medium(&self) -> &ExchangeMedium {
        &self.medium
    }

    pub fn options(&self) -> &FileChannelOptions {
        &self.opts
    }

    /// Ids vencidos que aún se vigilan.
    pub fn orphan_watch_len(&self) -> usize {
        self.timed_out.len()
    }

    /// Borra respuestas llegadas después del timeout de su llamada y olvida
    /// los ids vencidos hace más de `orphan_ttl`. Devuelve cuántas borró.
    pub async fn sweep_orphans(&self) -> usize {
        if self.timed_out.is_empty() {
            return 0;
        }
        let ids: Vec<(String, Instant)> = self.timed_out.iter().map(|e| (e.key().clone(), *e.value())).collect();
        let mut removed = 0;
        for (id, since) in ids {
            if self.medium.remove_response(&id).await {
                log::info!("removed orphaned response request_id={id} late_by={:?}", since.elapsed());
                self.timed_out.remove(&id);
                removed += 1;
            } else if since.elapsed() > self.opts.orphan_ttl {
                self.timed_out.remove(&id);
            }
        }
        removed
    }

    pub async fn purge_stale(&self, max_age: Duration) -> Result<usize, BridgeError> {
        self.sweep_orphans().await;
        self.medium.purge_stale(max_age).await
    }

    async fn abandon(&self, request_id: &str) {
        // si el hijo nunca la tomó no habrá respuesta que vigilar
        if self.medium.remove_request(request_id).await {
            log::debug!("request never picked up request_id={request_id}");
        } else {
            self.timed_out.insert(request_id.to_string(), Instant::now());
        }
        // la respuesta pudo aparecer entre el último sondeo y aquí
        if self.medium.remove_response(request_id).await {
            self.timed_out.remove(request_id);
        }
    }
}

#[async_trait]
impl CallChannel for FileCallChannel {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn exchange(&self, request: CallRequest, timeout: Duration) -> Result<CallResponse, BridgeError> {
        self.sweep_orphans().await;

        let request_id = request.request_id.clone();
        let started = Instant::now();
        let deadline = started + timeout;
        self.medium.write_request(&request).await?;
        log::debug!("request published request_id={request_id} class={} method={} kind={:?}",
                    request.target_class,
                    request.method_name,
                    request.method_kind);

        let mut failures = 0u32;
        loop {
            match self.medium.read_response(&request_id).await {
                ResponseRead::Parsed(resp) => {
                    self.medium.remove_response(&request_id).await;
                    log::debug!("response consumed request_id={request_id} success={} elapsed={:?}",
                                resp.success,
                                started.elapsed());
                    return Ok(resp);
                }
                ResponseRead::Unreadable(reason) => {
                    failures += 1;
                    if failures > self.opts.parse_retries {
                        log::error!("response unreadable after {failures} attempts request_id={request_id}: {reason}");
                        self.medium.remove_response(&request_id).await;
                        return Err(BridgeError::Transport(reason));
                    }
                    log::debug!("response not yet readable request_id={request_id} attempt={failures}: {reason}");
                }
                ResponseRead::Missing => {}
            }

            let now = Instant::now();
            if now >= deadline {
                self.abandon(&request_id).await;
                log::warn!("outbound call timed out request_id={request_id} after {timeout:?}");
                return Err(BridgeError::Timeout { request_id,
                                                  waited: timeout });
            }
            sleep(self.opts.poll_interval.min(deadline - now)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fast() -> FileChannelOptions {
        FileChannelOptions { poll_interval: Duration::from_millis(10),
                             ..FileChannelOptions::default() }
    }

    #[tokio::test]
    async fn garbage_response_becomes_transport_error_after_retries() {
        let dir = tempfile::tempdir().unwrap();
        let channel = FileCallChannel::open(dir.path(), fast()).await.unwrap();
        std::fs::write(channel.medium().response_path("r-bad"), b"not json").unwrap();

        let req = CallRequest::new_static("Foo", "add", vec![]).with_request_id("r-bad");
        let err = channel.exchange(req, Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, BridgeError::Transport(_)));
        assert!(!channel.medium().response_exists("r-bad").await);
    }

    #[tokio::test]
    async fn unclaimed_request_is_withdrawn_on_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let channel = FileCallChannel::open(dir.path(), fast()).await.unwrap();
        let req = CallRequest::new_static("Foo", "slow", vec![json!(1)]).with_request_id("r-idle");

        let err = channel.exchange(req, Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { .. }));
        assert!(!channel.medium().request_path("r-idle").exists());
        assert_eq!(channel.orphan_watch_len(), 0);
    }

    #[tokio::test]
    async fn late_response_is_swept() {
        let dir = tempfile::tempdir().unwrap();
        let channel = FileCallChannel::open(dir.path(), fast()).await.unwrap();
        let medium = channel.medium().clone();

        // hijo que toma la petición pero responde tarde
        let child = tokio::spawn(async move {
            loop {
                let taken = medium.take_requests().await.unwrap();
                if let Some(req) = taken.into_iter().next() {
                    sleep(Duration::from_millis(150)).await;
                    medium.write_response(&CallResponse::ok(req.request_id, json!("late")))
                          .await
                          .unwrap();
                    return;
                }
                sleep(Duration::from_millis(5)).await;
            }
        });

        let req = CallRequest::new_static("Foo", "slow", vec![]).with_request_id("r-late");
        let err = channel.exchange(req, Duration::from_millis(60)).await.unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { .. }));
        assert_eq!(channel.orphan_watch_len(), 1);

        child.await.unwrap();
        assert!(channel.medium().response_exists("r-late").await);
        assert_eq!(channel.sweep_orphans().await, 1);
        assert!(!channel.medium().response_exists("r-late").await);
        assert_eq!(channel.orphan_watch_len(), 0);
    }
}
