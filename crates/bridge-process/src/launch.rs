//! Construcción del vector de argumentos del proceso hijo.
//!
//! Orden fijo: flags de heap, GC y su tuning, metaspace, compressed oops,
//! headless, propiedades de sistema, flags extra, classpath, clase main,
//! raíz del medio compartido (posicional) y argumentos de aplicación.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use bridge_core::BridgeError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GcAlgorithm {
    G1 { max_pause_ms: Option<u32>, region_size_mb: Option<u32> },
    Z { generational: bool },
    Parallel { threads: Option<u32> },
    Serial,
}

impl GcAlgorithm {
    fn flags(&self) -> Vec<String> {
        match self {
            GcAlgorithm::G1 { max_pause_ms, region_size_mb } => {
                let mut f = vec!["-XX:+UseG1GC".to_string()];
                if let Some(ms) = max_pause_ms {
                    f.push(format!("-XX:MaxGCPauseMillis={ms}"));
                }
                if let Some(mb) = region_size_mb {
                    f.push(format!("-XX:G1HeapRegionSize={mb}m"));
                }
                f
            }
            GcAlgorithm::Z { generational } => {
                let mut f = vec!["-XX:+UseZGC".to_string()];
                if *generational {
                    f.push("-XX:+ZGenerational".to_string());
                }
                f
            }
            GcAlgorithm::Parallel { threads } => {
                let mut f = vec!["-XX:+UseParallelGC".to_string()];
                if let Some(n) = threads {
                    f.push(format!("-XX:ParallelGCThreads={n}"));
                }
                f
            }
            GcAlgorithm::Serial => vec!["-XX:+UseSerialGC".to_string()],
        }
    }
}

impl FromStr for GcAlgorithm {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "g1" | "g1gc" => Ok(GcAlgorithm::G1 { max_pause_ms: None, region_size_mb: None }),
            "z" | "zgc" => Ok(GcAlgorithm::Z { generational: true }),
            "parallel" => Ok(GcAlgorithm::Parallel { threads: None }),
            "serial" => Ok(GcAlgorithm::Serial),
            other => Err(BridgeError::Config(format!("unknown GC algorithm '{other}'"))),
        }
    }
}

/// Flags de runtime de la JVM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JvmOptions {
    pub heap_min: Option<String>,
    pub heap_max: Option<String>,
    pub gc: Option<GcAlgorithm>,
    pub metaspace_max: Option<String>,
    pub compressed_oops: Option<bool>,
    pub headless: bool,
    pub extra: Vec<String>,
}

impl Default for JvmOptions {
    fn default() -> Self {
        Self { heap_min: None,
               heap_max: Some("512m".to_string()),
               gc: Some(GcAlgorithm::G1 { max_pause_ms: None, region_size_mb: None }),
               metaspace_max: None,
               compressed_oops: None,
               headless: true,
               extra: Vec::new() }
    }
}

/// Valida tamaños estilo JVM: `512m`, `2g`, `65536k`, `1048576`.
pub fn validate_memory_size(raw: &str) -> Result<(), BridgeError> {
    let digits = raw.trim_end_matches(&['k', 'K', 'm', 'M', 'g', 'G'][..]);
    let suffix_len = raw.len() - digits.len();
    if digits.is_empty() || suffix_len > 1 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(BridgeError::Config(format!("invalid memory size '{raw}'")));
    }
    Ok(())
}

impl JvmOptions {
    pub fn validate(&self) -> Result<(), BridgeError> {
        for size in [&self.heap_min, &self.heap_max, &self.metaspace_max].into_iter().flatten() {
            validate_memory_size(size)?;
        }
        Ok(())
    }

    pub fn flags(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(min) = &self.heap_min {
            args.push(format!("-Xms{min}"));
        }
        if let Some(max) = &self.heap_max {
            args.push(format!("-Xmx{max}"));
        }
        if let Some(gc) = &self.gc {
            args.extend(gc.flags());
        }
        if let Some(meta) = &self.metaspace_max {
            args.push(format!("-XX:MaxMetaspaceSize={meta}"));
        }
        match self.compressed_oops {
            Some(true) => args.push("-XX:+UseCompressedOops".to_string()),
            Some(false) => args.push("-XX:-UseCompressedOops".to_string()),
            None => {}
        }
        if self.headless {
            args.push("-Djava.awt.headless=true".to_string());
        }
        args
    }
}

/// Todo lo necesario para lanzar el hijo. La configuración externa llega
/// aplanada en `system_properties`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub java: PathBuf,
    pub classpath: Vec<PathBuf>,
    pub main_class: String,
    pub jvm: JvmOptions,
    pub system_properties: IndexMap<String, String>,
    /// Raíz del medio compartido; también directorio de trabajo del hijo.
    pub work_dir: PathBuf,
    pub app_args: Vec<String>,
}

impl LaunchSpec {
    pub fn new(main_class: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self { java: PathBuf::from("java"),
               classpath: Vec::new(),
               main_class: main_class.into(),
               jvm: JvmOptions::default(),
               system_properties: IndexMap::new(),
               work_dir: work_dir.into(),
               app_args: Vec::new() }
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.system_properties.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.main_class.trim().is_empty() {
            return Err(BridgeError::Config("main class must not be empty".into()));
        }
        for key in self.system_properties.keys() {
            if key.is_empty() || key.contains(char::is_whitespace) || key.contains('=') {
                return Err(BridgeError::Config(format!("invalid system property name '{key}'")));
            }
        }
        self.jvm.validate()
    }

    /// Argumentos completos (sin el ejecutable).
    pub fn build_args(&self) -> Result<Vec<String>, BridgeError> {
        self.validate()?;
        let mut args = self.jvm.flags();
        for (k, v) in &self.system_properties {
            args.push(format!("-D{k}={v}"));
        }
        args.extend(self.jvm.extra.iter().cloned());
        if !self.classpath.is_empty() {
            let joined = std::env::join_paths(&self.classpath)
                .map_err(|e| BridgeError::Config(format!("classpath entry not joinable: {e}")))?;
            args.push("-cp".to_string());
            args.push(joined.to_string_lossy().into_owned());
        }
        args.push(self.main_class.clone());
        args.push(self.work_dir.to_string_lossy().into_owned());
        args.extend(self.app_args.iter().cloned());
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_flags_are_heap_g1_and_headless() {
        let flags = JvmOptions::default().flags();
        assert_eq!(flags, vec!["-Xmx512m", "-XX:+UseG1GC", "-Djava.awt.headless=true"]);
    }

    #[test]
    fn full_argument_vector_order() {
        let mut spec = LaunchSpec::new("io.sagaflow.BridgeMain", "/tmp/bridge")
            .property("sagabridge.callback.url", "http://127.0.0.1:4100")
            .property("sagaflow.mode", "saga");
        spec.classpath = vec![PathBuf::from("a.jar"), PathBuf::from("b.jar")];
        spec.jvm = JvmOptions { heap_min: Some("256m".into()),
                                heap_max: Some("1g".into()),
                                gc: Some(GcAlgorithm::Z { generational: true }),
                                metaspace_max: Some("128m".into()),
                                compressed_oops: Some(false),
                                headless: true,
                                extra: vec!["-XX:+ExitOnOutOfMemoryError".into()] };
        spec.app_args = vec!["--verbose".into()];

        let args = spec.build_args().unwrap();
        let sep = if cfg!(windows) { ";" } else { ":" };
        let expected: Vec<String> = vec!["-Xms256m".into(),
                                         "-Xmx1g".into(),
                                         "-XX:+UseZGC".into(),
                                         "-XX:+ZGenerational".into(),
                                         "-XX:MaxMetaspaceSize=128m".into(),
                                         "-XX:-UseCompressedOops".into(),
                                         "-Djava.awt.headless=true".into(),
                                         "-Dsagabridge.callback.url=http://127.0.0.1:4100".into(),
                                         "-Dsagaflow.mode=saga".into(),
                                         "-XX:+ExitOnOutOfMemoryError".into(),
                                         "-cp".into(),
                                         format!("a.jar{sep}b.jar"),
                                         "io.sagaflow.BridgeMain".into(),
                                         "/tmp/bridge".into(),
                                         "--verbose".into()];
        assert_eq!(args, expected);
    }

    #[test]
    fn g1_and_parallel_tuning_flags() {
        let g1 = GcAlgorithm::G1 { max_pause_ms: Some(200), region_size_mb: Some(4) };
        assert_eq!(g1.flags(), vec!["-XX:+UseG1GC", "-XX:MaxGCPauseMillis=200", "-XX:G1HeapRegionSize=4m"]);
        let par = GcAlgorithm::Parallel { threads: Some(2) };
        assert_eq!(par.flags(), vec!["-XX:+UseParallelGC", "-XX:ParallelGCThreads=2"]);
    }

    #[test]
    fn gc_parses_from_config_string() {
        assert_eq!("ZGC".parse::<GcAlgorithm>().unwrap(), GcAlgorithm::Z { generational: true });
        assert_eq!("serial".parse::<GcAlgorithm>().unwrap(), GcAlgorithm::Serial);
        assert!("cms".parse::<GcAlgorithm>().is_err());
    }

    #[test]
    fn invalid_sizes_and_properties_are_rejected() {
        assert!(validate_memory_size("512m").is_ok());
        assert!(validate_memory_size("1048576").is_ok());
        assert!(validate_memory_size("lots").is_err());
        assert!(validate_memory_size("12mg").is_err());

        let spec = LaunchSpec::new("Main", "/tmp").property("bad key", "v");
        assert!(matches!(spec.build_args(), Err(BridgeError::Config(_))));
    }
}
