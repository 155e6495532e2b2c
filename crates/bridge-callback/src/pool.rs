//! Pool fijo de workers persistentes.
//!
//! Cada worker es un hilo del sistema con su propio runtime tokio
//! `current_thread`, creado una vez y reutilizado para todas las
//! invocaciones que atiende. La cola es acotada: si está llena el envío
//! falla en el acto y el servidor responde 503.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::runtime::{Builder, Runtime};

use bridge_core::BridgeError;

pub type Job = Box<dyn FnOnce(&Runtime) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    QueueFull,
    Closed,
}

pub struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
    busy: Arc<AtomicUsize>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
         .field("size", &self.size)
         .field("busy", &self.busy.load(Ordering::Relaxed))
         .finish()
    }
}

fn build_runtime() -> std::io::Result<Runtime> {
    Builder::new_current_thread().enable_all().build()
}

impl WorkerPool {
    /// Arranca `size` workers con una cola de `queue_capacity` trabajos.
    pub fn new(size: usize, queue_capacity: usize) -> Result<Self, BridgeError> {
        if size == 0 {
            return Err(BridgeError::Config("worker pool size must be at least 1".into()));
        }
        let (tx, rx) = bounded::<Job>(queue_capacity.max(1));
        let busy = Arc::new(AtomicUsize::new(0));
        let mut workers = Vec::with_capacity(size);
        for idx in 0..size {
            let rt = build_runtime().map_err(|e| BridgeError::Internal(format!("worker runtime: {e}")))?;
            let rx = rx.clone();
            let busy = busy.clone();
            let handle = thread::Builder::new().name(format!("sagabridge-cb-{idx}"))
                                               .spawn(move || worker_loop(idx, rt, rx, busy))
                                               .map_err(|e| BridgeError::Internal(format!("spawn worker: {e}")))?;
            workers.push(handle);
        }
        log::debug!("callback worker pool started size={size} queue={}", queue_capacity.max(1));
        Ok(Self { sender: Mutex::new(Some(tx)),
                  workers: Mutex::new(workers),
                  size,
                  busy })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Workers ejecutando un trabajo en este momento.
    pub fn busy(&self) -> usize {
        self.busy.load(Ordering::Relaxed)
    }

    /// Trabajos aceptados que aún esperan worker.
    pub fn queued(&self) -> usize {
        self.sender.lock().unwrap_or_else(|p| p.into_inner()).as_ref().map_or(0, |tx| tx.len())
    }

    pub fn try_submit<F>(&self, job: F) -> Result<(), SubmitError>
        where F: FnOnce(&Runtime) + Send + 'static
    {
        let guard = self.sender.lock().unwrap_or_else(|p| p.into_inner());
        let Some(tx) = guard.as_ref() else {
            return Err(SubmitError::Closed);
        };
        tx.try_send(Box::new(job) as Job).map_err(|e| match e {
                            TrySendError::Full(_) => SubmitError::QueueFull,
                            TrySendError::Disconnected(_) => SubmitError::Closed,
                        })
    }

    /// Cierra la cola y espera a que los workers drenen, como mucho
    /// `timeout` en total. Idempotente.
    pub fn shutdown(&self, timeout: Duration) {
        self.sender.lock().unwrap_or_else(|p| p.into_inner()).take();
        let handles: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.workers.lock().unwrap_or_else(|p| p.into_inner()));
        let deadline = Instant::now() + timeout;
        for handle in handles {
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                log::warn!("callback worker still busy at shutdown, detaching");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown(Duration::from_secs(5));
    }
}

fn worker_loop(idx: usize, mut rt: Runtime, rx: Receiver<Job>, busy: Arc<AtomicUsize>) {
    while let Ok(job) = rx.recv() {
        busy.fetch_add(1, Ordering::Relaxed);
        let panicked = catch_unwind(AssertUnwindSafe(|| job(&rt))).is_err();
        busy.fetch_sub(1, Ordering::Relaxed);
        if panicked {
            log::error!("callback worker {idx} job panicked, rebuilding its runtime");
            match build_runtime() {
                Ok(fresh) => rt = fresh,
                Err(e) => {
                    log::error!("callback worker {idx} cannot rebuild runtime, exiting: {e}");
                    return;
                }
            }
        }
    }
    log::debug!("callback worker {idx} stopped");
}
