//! Buffer circular de líneas emitidas por el proceso hijo.
//!
//! Cada línea lleva timestamp y stream de origen. Al llenarse se descarta
//! la más antigua. La severidad se infiere del stream y del contenido.

use chrono::{DateTime, Utc};
use log::Level;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl LogStream {
    pub fn as_str(self) -> &'static str {
        match self {
            LogStream::Stdout => "stdout",
            LogStream::Stderr => "stderr",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub ts: DateTime<Utc>,
    pub stream: LogStream,
    pub level: Level,
    pub text: String,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f,
               "{} [{}] {:<5} {}",
               self.ts.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
               self.stream.as_str(),
               self.level,
               self.text)
    }
}

const FAILURE_MARKERS: &[&str] = &["ERROR", "SEVERE", "FATAL", "Exception", "Caused by:", "\tat "];

/// Severidad inferida: en stderr, marcadores de fallo escalan a `Error` y el
/// resto queda en `Warn`; en stdout se respeta el nivel que imprima el
/// logger del hijo.
pub fn classify(stream: LogStream, text: &str) -> Level {
    match stream {
        LogStream::Stderr => {
            if FAILURE_MARKERS.iter().any(|m| text.contains(m)) {
                Level::Error
            } else {
                Level::Warn
            }
        }
        LogStream::Stdout => {
            if text.contains("ERROR") || text.contains("SEVERE") {
                Level::Error
            } else if text.contains("WARN") {
                Level::Warn
            } else if text.contains("DEBUG") || text.contains("TRACE") {
                Level::Debug
            } else {
                Level::Info
            }
        }
    }
}

/// Ring de capacidad fija compartido por los dos lectores.
#[derive(Debug)]
pub struct LogRing {
    capacity: usize,
    lines: Mutex<VecDeque<LogLine>>,
    dropped: Mutex<u64>,
}

impl LogRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity,
               lines: Mutex::new(VecDeque::with_capacity(capacity)),
               dropped: Mutex::new(0) }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&self, line: LogLine) {
        let mut lines = self.lines.lock().unwrap_or_else(|p| p.into_inner());
        if lines.len() == self.capacity {
            lines.pop_front();
            *self.dropped.lock().unwrap_or_else(|p| p.into_inner()) += 1;
        }
        lines.push_back(line);
    }

    /// Últimas `n` líneas en orden cronológico.
    pub fn recent(&self, n: usize) -> Vec<LogLine> {
        let lines = self.lines.lock().unwrap_or_else(|p| p.into_inner());
        let skip = lines.len().saturating_sub(n);
        lines.iter().skip(skip).cloned().collect()
    }

    /// Texto de un stream tal cual fue emitido (una línea por renglón).
    pub fn stream_text(&self, stream: LogStream) -> String {
        let lines = self.lines.lock().unwrap_or_else(|p| p.into_inner());
        lines.iter().filter(|l| l.stream == stream).map(|l| l.text.as_str()).collect::<Vec<_>>().join("\n")
    }

    pub fn dropped(&self) -> u64 {
        *self.dropped.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lines.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
