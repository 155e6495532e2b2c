//! Configuración del bridge desde variables de entorno.
//!
//! Convención `SAGABRIDGE_*`; `.env` se carga una sola vez. Los valores
//! ausentes toman su default, los inválidos son `BridgeError::Config`.
//! Cualquier `SAGABRIDGE_PROP_<NOMBRE>` se pasa al hijo como propiedad de
//! sistema (`<nombre>` en minúsculas, `_` → `.`).

use dotenvy::dotenv;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use std::ffi::OsString;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use bridge_callback::CallbackServerOptions;
use bridge_core::constants::{DEFAULT_CALLBACK_TIMEOUT, DEFAULT_CALLBACK_WORKERS, DEFAULT_CALL_TIMEOUT,
                             DEFAULT_POLL_INTERVAL};
use bridge_core::BridgeError;
use bridge_process::{GcAlgorithm, JvmOptions, LaunchSpec, SupervisorOptions};
use bridge_rpc::FileChannelOptions;

const PREFIX: &str = "SAGABRIDGE_";
const PROP_PREFIX: &str = "SAGABRIDGE_PROP_";

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv();
});

/// Forzar carga temprana de .env desde binarios.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}

#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Proceso hijo: ejecutable, classpath, clase main, JVM y directorio.
    pub launch: LaunchSpec,
    pub call_timeout: Duration,
    pub poll_interval: Duration,
    pub callback_host: String,
    /// 0 = puerto efímero.
    pub callback_port: u16,
    pub callback_workers: usize,
    pub callback_timeout: Duration,
    pub log_file: Option<PathBuf>,
    pub log_capacity: usize,
}

impl BridgeConfig {
    pub fn new(main_class: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self { launch: LaunchSpec::new(main_class, work_dir),
               call_timeout: DEFAULT_CALL_TIMEOUT,
               poll_interval: DEFAULT_POLL_INTERVAL,
               callback_host: "127.0.0.1".to_string(),
               callback_port: 0,
               callback_workers: DEFAULT_CALLBACK_WORKERS,
               callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
               log_file: None,
               log_capacity: SupervisorOptions::default().log_capacity }
    }

    pub fn from_env() -> Result<Self, BridgeError> {
        // asegura que .env se haya cargado
        init_dotenv();
        Self::from_vars(utf8_vars(std::env::vars_os()))
    }

    /// Igual que `from_env` sobre un conjunto explícito de variables.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, BridgeError>
        where I: IntoIterator<Item = (K, V)>,
              K: Into<String>,
              V: Into<String>
    {
        let vars: IndexMap<String, String> = vars.into_iter()
                                                 .map(|(k, v)| (k.into(), v.into()))
                                                 .filter(|(k, _)| k.starts_with(PREFIX))
                                                 .collect();
        let get = |name: &str| vars.get(&format!("{PREFIX}{name}")).map(|v| v.trim()).filter(|v| !v.is_empty());

        let main_class = get("MAIN_CLASS").ok_or_else(|| BridgeError::Config(format!("{PREFIX}MAIN_CLASS not set")))?;
        let work_dir = get("WORK_DIR").map(PathBuf::from)
                                      .unwrap_or_else(|| std::env::temp_dir().join("sagabridge"));
        let mut cfg = Self::new(main_class, work_dir);

        if let Some(java) = get("JAVA") {
            cfg.launch.java = PathBuf::from(java);
        }
        if let Some(cp) = get("CLASSPATH") {
            cfg.launch.classpath = std::env::split_paths(cp).filter(|p| !p.as_os_str().is_empty()).collect();
        }

        let mut jvm = JvmOptions::default();
        if let Some(v) = get("HEAP_MIN") {
            jvm.heap_min = Some(v.to_string());
        }
        if let Some(v) = get("HEAP_MAX") {
            jvm.heap_max = Some(v.to_string());
        }
        if let Some(v) = get("GC") {
            jvm.gc = Some(v.parse::<GcAlgorithm>()?);
        }
        if let Some(v) = get("GC_PAUSE_MS") {
            let ms = parse::<u32>("GC_PAUSE_MS", v)?;
            match jvm.gc.as_mut() {
                Some(GcAlgorithm::G1 { max_pause_ms, .. }) => *max_pause_ms = Some(ms),
                _ => log::warn!("{PREFIX}GC_PAUSE_MS ignored, only applies to G1"),
            }
        }
        if let Some(v) = get("METASPACE_MAX") {
            jvm.metaspace_max = Some(v.to_string());
        }
        if let Some(v) = get("COMPRESSED_OOPS") {
            jvm.compressed_oops = Some(parse_bool("COMPRESSED_OOPS", v)?);
        }
        jvm.validate()?;
        cfg.launch.jvm = jvm;

        for (key, value) in &vars {
            if let Some(name) = key.strip_prefix(PROP_PREFIX).filter(|n| !n.is_empty()) {
                cfg.launch
                   .system_properties
                   .insert(name.to_ascii_lowercase().replace('_', "."), value.clone());
            }
        }

        if let Some(v) = get("CALL_TIMEOUT_SECS") {
            cfg.call_timeout = Duration::from_secs(parse("CALL_TIMEOUT_SECS", v)?);
        }
        if let Some(v) = get("POLL_INTERVAL_MS") {
            cfg.poll_interval = Duration::from_millis(parse("POLL_INTERVAL_MS", v)?);
        }
        if let Some(v) = get("CALLBACK_HOST") {
            cfg.callback_host = v.to_string();
        }
        if let Some(v) = get("CALLBACK_PORT") {
            cfg.callback_port = parse("CALLBACK_PORT", v)?;
        }
        if let Some(v) = get("CALLBACK_WORKERS") {
            cfg.callback_workers = parse("CALLBACK_WORKERS", v)?;
        }
        if let Some(v) = get("CALLBACK_TIMEOUT_SECS") {
            cfg.callback_timeout = Duration::from_secs(parse("CALLBACK_TIMEOUT_SECS", v)?);
        }
        cfg.log_file = get("LOG_FILE").map(PathBuf::from);
        if let Some(v) = get("LOG_CAPACITY") {
            cfg.log_capacity = parse("LOG_CAPACITY", v)?;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.callback_workers == 0 {
            return Err(BridgeError::Config(format!("{PREFIX}CALLBACK_WORKERS must be at least 1")));
        }
        if self.poll_interval.is_zero() {
            return Err(BridgeError::Config(format!("{PREFIX}POLL_INTERVAL_MS must be positive")));
        }
        self.launch.validate()
    }

    pub fn work_dir(&self) -> &PathBuf {
        &self.launch.work_dir
    }

    pub fn file_channel_options(&self) -> FileChannelOptions {
        FileChannelOptions { poll_interval: self.poll_interval,
                             ..Default::default() }
    }

    pub fn server_options(&self) -> CallbackServerOptions {
        CallbackServerOptions { workers: self.callback_workers,
                                queue_capacity: self.callback_workers.saturating_mul(16),
                                callback_timeout: self.callback_timeout,
                                ..Default::default() }
    }

    pub fn supervisor_options(&self) -> SupervisorOptions {
        SupervisorOptions { log_capacity: self.log_capacity,
                            log_file: self.log_file.clone(),
                            ..Default::default() }
    }
}

// variables no Unicode (ajenas al prefijo casi siempre) se saltan
fn utf8_vars<I>(vars: I) -> impl Iterator<Item = (String, String)>
    where I: IntoIterator<Item = (OsString, OsString)>
{
    vars.into_iter().filter_map(|(k, v)| match (k.into_string(), v.into_string()) {
                        (Ok(k), Ok(v)) => Some((k, v)),
                        (Ok(k), Err(_)) => {
                            if k.starts_with(PREFIX) {
                                log::warn!("{k} ignored, value is not valid unicode");
                            }
                            None
                        }
                        _ => None,
                    })
}

fn parse<T: FromStr>(name: &str, raw: &str) -> Result<T, BridgeError>
    where T::Err: std::fmt::Display
{
    raw.parse::<T>()
       .map_err(|e| BridgeError::Config(format!("{PREFIX}{name}='{raw}': {e}")))
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, BridgeError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(BridgeError::Config(format!("{PREFIX}{name}='{raw}': expected a boolean"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn minimal_config_takes_defaults() {
        let cfg = BridgeConfig::from_vars(vars(&[("SAGABRIDGE_MAIN_CLASS", "io.sagaflow.BridgeMain"),
                                                 ("SAGABRIDGE_WORK_DIR", "/tmp/sb"),
                                                 ("UNRELATED", "x")])).unwrap();
        assert_eq!(cfg.launch.main_class, "io.sagaflow.BridgeMain");
        assert_eq!(cfg.work_dir(), &PathBuf::from("/tmp/sb"));
        assert_eq!(cfg.call_timeout, DEFAULT_CALL_TIMEOUT);
        assert_eq!(cfg.callback_port, 0);
        assert_eq!(cfg.launch.jvm, JvmOptions::default());
    }

    #[test]
    fn jvm_tuning_and_properties_are_read() {
        let cfg = BridgeConfig::from_vars(vars(&[("SAGABRIDGE_MAIN_CLASS", "Main"),
                                                 ("SAGABRIDGE_HEAP_MAX", "2g"),
                                                 ("SAGABRIDGE_GC", "g1"),
                                                 ("SAGABRIDGE_GC_PAUSE_MS", "150"),
                                                 ("SAGABRIDGE_COMPRESSED_OOPS", "off"),
                                                 ("SAGABRIDGE_PROP_SAGAFLOW_MODE", "tcc"),
                                                 ("SAGABRIDGE_CALLBACK_WORKERS", "8")])).unwrap();
        assert_eq!(cfg.launch.jvm.heap_max.as_deref(), Some("2g"));
        assert_eq!(cfg.launch.jvm.gc,
                   Some(GcAlgorithm::G1 { max_pause_ms: Some(150), region_size_mb: None }));
        assert_eq!(cfg.launch.jvm.compressed_oops, Some(false));
        assert_eq!(cfg.launch.system_properties.get("sagaflow.mode").map(String::as_str), Some("tcc"));
        assert_eq!(cfg.server_options().workers, 8);
    }

    #[test]
    fn invalid_values_are_config_errors() {
        for bad in [("SAGABRIDGE_HEAP_MAX", "lots"),
                    ("SAGABRIDGE_GC", "cms"),
                    ("SAGABRIDGE_CALLBACK_PORT", "99999"),
                    ("SAGABRIDGE_CALLBACK_WORKERS", "0"),
                    ("SAGABRIDGE_COMPRESSED_OOPS", "maybe")]
        {
            let err = BridgeConfig::from_vars(vars(&[("SAGABRIDGE_MAIN_CLASS", "Main"), bad])).unwrap_err();
            assert!(matches!(err, BridgeError::Config(_)), "{bad:?} -> {err:?}");
        }
        assert!(matches!(BridgeConfig::from_vars(vars(&[])), Err(BridgeError::Config(_))));
    }

    #[test]
    fn huge_worker_count_saturates_queue_capacity() {
        let cfg = BridgeConfig::from_vars(vars(&[("SAGABRIDGE_MAIN_CLASS", "Main"),
                                                 ("SAGABRIDGE_CALLBACK_WORKERS", usize::MAX.to_string().as_str())])).unwrap();
        assert_eq!(cfg.server_options().queue_capacity, usize::MAX);
    }

    #[cfg(unix)]
    #[test]
    fn non_unicode_env_entries_are_skipped() {
        use std::os::unix::ffi::OsStringExt;

        let raw = vec![(OsString::from("SAGABRIDGE_MAIN_CLASS"), OsString::from("Main")),
                       (OsString::from_vec(vec![0xff, b'K']), OsString::from("x")),
                       (OsString::from("SAGABRIDGE_HEAP_MAX"), OsString::from_vec(vec![b'2', 0xff]))];
        let cfg = BridgeConfig::from_vars(utf8_vars(raw)).unwrap();
        assert_eq!(cfg.launch.main_class, "Main");
        assert_eq!(cfg.launch.jvm.heap_max, None);
    }
}
