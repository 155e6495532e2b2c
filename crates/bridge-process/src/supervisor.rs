//! Supervisión del proceso hijo.
//!
//! Dos hilos lectores (stdout / stderr) etiquetan cada línea, la guardan en
//! el `LogRing`, la reenvían al facade `log` con target `sagabridge::child`
//! y opcionalmente la copian a un archivo. Si el hijo muere dentro de la
//! ventana de gracia el arranque falla con su salida literal.

use std::ffi::OsStr;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use indexmap::IndexMap;

use crate::launch::LaunchSpec;
use crate::log_buffer::{classify, LogLine, LogRing, LogStream};
use bridge_core::BridgeError;

pub const CHILD_LOG_TARGET: &str = "sagabridge::child";

const EXIT_POLL: Duration = Duration::from_millis(25);
const READER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Ventana tras el spawn en la que una salida cuenta como fallo de arranque.
    pub startup_grace: Duration,
    pub log_capacity: usize,
    pub log_file: Option<PathBuf>,
    pub env: IndexMap<String, String>,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self { startup_grace: Duration::from_millis(500),
               log_capacity: 1000,
               log_file: None,
               env: IndexMap::new() }
    }
}

type SharedSink = Arc<Mutex<Option<File>>>;

pub struct ProcessSupervisor {
    child: Mutex<Option<Child>>,
    pid: u32,
    logs: Arc<LogRing>,
    readers: Mutex<Vec<JoinHandle<()>>>,
    exit: Mutex<Option<ExitStatus>>,
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor").field("pid", &self.pid).finish_non_exhaustive()
    }
}

impl ProcessSupervisor {
    /// Lanza el hijo descrito por `spec` (ejecutable `spec.java`).
    pub fn start(spec: &LaunchSpec, opts: SupervisorOptions) -> Result<Self, BridgeError> {
        let args = spec.build_args()?;
        std::fs::create_dir_all(&spec.work_dir).map_err(|e| start_error(format!("create work dir {}: {e}",
                                                                                 spec.work_dir.display())))?;
        Self::start_command(&spec.java, &args, Some(&spec.work_dir), opts)
    }

    /// Variante cruda: cualquier ejecutable con sus argumentos.
    pub fn start_command(program: impl AsRef<OsStr>,
                         args: &[String],
                         work_dir: Option<&Path>,
                         opts: SupervisorOptions)
                         -> Result<Self, BridgeError> {
        let program = program.as_ref();
        let mut cmd = Command::new(program);
        cmd.args(args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
        if let Some(dir) = work_dir {
            cmd.current_dir(dir);
        }
        cmd.envs(&opts.env);

        let sink: SharedSink = Arc::new(Mutex::new(match &opts.log_file {
                                                       Some(path) => Some(open_log_file(path)?),
                                                       None => None,
                                                   }));

        let mut child =
            cmd.spawn().map_err(|e| start_error(format!("spawn {}: {e}", program.to_string_lossy())))?;
        let pid = child.id();
        log::info!("child process started (pid {pid}): {} {}", program.to_string_lossy(), args.join(" "));

        let logs = Arc::new(LogRing::new(opts.log_capacity));
        let mut readers = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            readers.push(spawn_reader(out, LogStream::Stdout, logs.clone(), sink.clone()));
        }
        if let Some(err) = child.stderr.take() {
            readers.push(spawn_reader(err, LogStream::Stderr, logs.clone(), sink));
        }

        let sup = Self { child: Mutex::new(Some(child)),
                         pid,
                         logs,
                         readers: Mutex::new(readers),
                         exit: Mutex::new(None) };

        if let Some(status) = sup.wait_for_exit(opts.startup_grace) {
            sup.join_readers();
            let stdout = sup.logs.stream_text(LogStream::Stdout);
            let stderr = sup.logs.stream_text(LogStream::Stderr);
            log::error!("child process (pid {pid}) exited during startup: {status}");
            return Err(BridgeError::ProcessStart { message: format!("exited immediately with {status}"),
                                                   stdout,
                                                   stderr });
        }
        Ok(sup)
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_running(&self) -> bool {
        self.poll_exit().is_none()
    }

    /// Código de salida si el hijo ya terminó.
    pub fn exit_code(&self) -> Option<i32> {
        self.poll_exit().and_then(|s| s.code())
    }

    pub fn recent_logs(&self, n: usize) -> Vec<LogLine> {
        self.logs.recent(n)
    }

    pub fn logs(&self) -> Arc<LogRing> {
        self.logs.clone()
    }

    /// Terminación ordenada: SIGTERM, espera `graceful_timeout`, luego kill.
    /// Nunca falla; los errores sólo se registran.
    pub fn stop(&self, graceful_timeout: Duration) {
        if self.poll_exit().is_some() {
            self.join_readers();
            return;
        }
        log::info!("stopping child process (pid {})", self.pid);
        self.terminate();
        if self.wait_for_exit(graceful_timeout).is_none() {
            log::warn!("child process (pid {}) ignored termination after {graceful_timeout:?}, killing",
                       self.pid);
            let status = {
                let mut guard = self.child.lock().unwrap_or_else(|p| p.into_inner());
                guard.as_mut().and_then(|child| {
                                   if let Err(e) = child.kill() {
                                       log::warn!("kill pid {}: {e}", self.pid);
                                   }
                                   child.wait().map_err(|e| log::warn!("wait pid {}: {e}", self.pid)).ok()
                               })
            };
            if let Some(status) = status {
                *self.exit.lock().unwrap_or_else(|p| p.into_inner()) = Some(status);
            }
        }
        self.join_readers();
        log::info!("child process (pid {}) stopped", self.pid);
    }

    #[cfg(unix)]
    fn terminate(&self) {
        let Ok(pid) = libc::pid_t::try_from(self.pid) else {
            return;
        };
        // SAFETY: señal a un pid que todavía es hijo nuestro (no reaped).
        let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
        if rc != 0 {
            log::warn!("SIGTERM to pid {pid} failed: {}", std::io::Error::last_os_error());
        }
    }

    #[cfg(not(unix))]
    fn terminate(&self) {
        let mut guard = self.child.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(child) = guard.as_mut() {
            if let Err(e) = child.kill() {
                log::warn!("terminate pid {}: {e}", self.pid);
            }
        }
    }

    fn poll_exit(&self) -> Option<ExitStatus> {
        let mut exit = self.exit.lock().unwrap_or_else(|p| p.into_inner());
        if exit.is_some() {
            return *exit;
        }
        let mut guard = self.child.lock().unwrap_or_else(|p| p.into_inner());
        let child = guard.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => {
                *exit = Some(status);
                Some(status)
            }
            Ok(None) => None,
            Err(e) => {
                log::warn!("try_wait pid {}: {e}", self.pid);
                None
            }
        }
    }

    fn wait_for_exit(&self, within: Duration) -> Option<ExitStatus> {
        let deadline = Instant::now() + within;
        loop {
            if let Some(status) = self.poll_exit() {
                return Some(status);
            }
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(EXIT_POLL);
        }
    }

    /// Espera a los lectores como mucho `READER_JOIN_TIMEOUT`; los que no
    /// terminen quedan desacoplados.
    fn join_readers(&self) {
        let handles: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.readers.lock().unwrap_or_else(|p| p.into_inner()));
        let deadline = Instant::now() + READER_JOIN_TIMEOUT;
        for handle in handles {
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                log::debug!("log reader for pid {} still running, detaching", self.pid);
            }
        }
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop(Duration::from_secs(2));
        }
    }
}

fn start_error(message: String) -> BridgeError {
    BridgeError::ProcessStart { message,
                                stdout: String::new(),
                                stderr: String::new() }
}

fn open_log_file(path: &Path) -> Result<File, BridgeError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| BridgeError::Config(format!("log dir {}: {e}", parent.display())))?;
    }
    OpenOptions::new().create(true)
                      .append(true)
                      .open(path)
                      .map_err(|e| BridgeError::Config(format!("log file {}: {e}", path.display())))
}

fn spawn_reader<R>(source: R, stream: LogStream, ring: Arc<LogRing>, sink: SharedSink) -> JoinHandle<()>
    where R: Read + Send + 'static
{
    thread::spawn(move || {
        // bytes crudos: una línea no UTF-8 no puede cortar el drenaje del pipe
        let mut reader = BufReader::new(source);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::debug!("{} reader stopped: {e}", stream.as_str());
                    break;
                }
            }
            let text = String::from_utf8_lossy(&buf).trim_end_matches(['\r', '\n']).to_string();
            let level = classify(stream, &text);
            log::log!(target: CHILD_LOG_TARGET, level, "{text}");
            let entry = LogLine { ts: Utc::now(), stream, level, text };
            if let Some(file) = sink.lock().unwrap_or_else(|p| p.into_inner()).as_mut() {
                if let Err(e) = writeln!(file, "{entry}") {
                    log::debug!("child log tee failed: {e}");
                }
            }
            ring.push(entry);
        }
    })
}
