use std::path::PathBuf;
use std::time::Duration;

use bridge_core::{BridgeError, CallRequest};
use bridge_rpc::{CallChannel, FileCallChannel, FileChannelOptions};
use log::{LevelFilter, Metadata, Record};
use sagabridge::{Bridge, BridgeConfig};
use serde_json::Value;

const USAGE: &str = "\
Uso:
  sagabridge call --work-dir <DIR> --class <CLASE> --method <METODO>
                  [--kind static|instance|constructor] [--instance <ID>]
                  [--args '<JSON array>'] [--timeout <SEG>]
  sagabridge sweep --work-dir <DIR> [--max-age <SEG>]
  sagabridge launch";

// Logger mínimo a stderr; nivel por SAGABRIDGE_LOG (default info).
struct StderrLogger {
    level: LevelFilter,
}

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let ts = chrono::Utc::now().format("%H:%M:%S%.3f");
        if record.target() == bridge_process::CHILD_LOG_TARGET {
            eprintln!("{ts} child | {}", record.args());
        } else {
            eprintln!("{ts} {:<5} {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

fn init_logger() {
    let level = std::env::var("SAGABRIDGE_LOG").ok()
                                               .and_then(|v| v.parse::<LevelFilter>().ok())
                                               .unwrap_or(LevelFilter::Info);
    if log::set_boxed_logger(Box::new(StderrLogger { level })).is_ok() {
        log::set_max_level(level);
    }
}

#[derive(Debug, Clone, PartialEq)]
struct CallArgs {
    work_dir: PathBuf,
    request: CallRequest,
    timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Call(CallArgs),
    Sweep { work_dir: PathBuf, max_age: Duration },
    Launch,
}

/// `--clave valor` tras el subcomando; claves repetidas: gana la última.
fn flags(args: &[String]) -> Result<Vec<(String, String)>, String> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < args.len() {
        let key = args[i].strip_prefix("--")
                         .ok_or_else(|| format!("argumento inesperado '{}'", args[i]))?;
        let value = args.get(i + 1).ok_or_else(|| format!("falta valor para --{key}"))?;
        out.push((key.to_string(), value.clone()));
        i += 2;
    }
    Ok(out)
}

fn flag<'a>(flags: &'a [(String, String)], key: &str) -> Option<&'a str> {
    flags.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

fn required<'a>(flags: &'a [(String, String)], key: &str) -> Result<&'a str, String> {
    flag(flags, key).ok_or_else(|| format!("--{key} es obligatorio"))
}

fn seconds(raw: &str, key: &str) -> Result<Duration, String> {
    raw.parse::<f64>()
       .ok()
       .filter(|s| *s > 0.0)
       .and_then(|s| Duration::try_from_secs_f64(s).ok())
       .ok_or_else(|| format!("--{key} debe ser un número positivo de segundos"))
}

fn parse_command(args: &[String]) -> Result<Command, String> {
    let (name, rest) = args.split_first().ok_or("falta el subcomando")?;
    let flags = flags(rest)?;
    match name.as_str() {
        "call" => {
            let work_dir = PathBuf::from(required(&flags, "work-dir")?);
            let class = required(&flags, "class")?;
            let call_args: Vec<Value> = match flag(&flags, "args") {
                Some(raw) => serde_json::from_str(raw).map_err(|e| format!("--args no es un array JSON: {e}"))?,
                None => Vec::new(),
            };
            let kind = flag(&flags, "kind").unwrap_or(if flag(&flags, "instance").is_some() { "instance" } else { "static" });
            let request = match kind {
                "static" => CallRequest::new_static(class, required(&flags, "method")?, call_args),
                "constructor" => CallRequest::new_constructor(class, call_args),
                "instance" => CallRequest::new_instance(class,
                                                        required(&flags, "instance")?,
                                                        required(&flags, "method")?,
                                                        call_args),
                other => return Err(format!("--kind desconocido '{other}'")),
            };
            let timeout = flag(&flags, "timeout").map(|t| seconds(t, "timeout")).transpose()?;
            Ok(Command::Call(CallArgs { work_dir,
                                        request,
                                        timeout }))
        }
        "sweep" => {
            let work_dir = PathBuf::from(required(&flags, "work-dir")?);
            let max_age = match flag(&flags, "max-age") {
                Some(raw) => seconds(raw, "max-age")?,
                None => Duration::from_secs(600),
            };
            Ok(Command::Sweep { work_dir, max_age })
        }
        "launch" => Ok(Command::Launch),
        other => Err(format!("subcomando desconocido '{other}'")),
    }
}

fn exit_code(err: &BridgeError) -> i32 {
    match err {
        BridgeError::Remote(_) => 3,
        BridgeError::Timeout { .. } => 4,
        BridgeError::Config(_) => 2,
        _ => 5,
    }
}

async fn run_call(args: CallArgs) -> Result<(), BridgeError> {
    let opts = FileChannelOptions::default();
    let channel = FileCallChannel::open(&args.work_dir, opts).await?;
    let timeout = args.timeout.unwrap_or(bridge_core::constants::DEFAULT_CALL_TIMEOUT);
    let resp = channel.call(args.request, timeout).await?;
    let out = match resp.instance_id {
        Some(id) => serde_json::json!({"instanceId": id, "result": resp.result}),
        None => resp.result.unwrap_or(Value::Null),
    };
    println!("{out}");
    Ok(())
}

async fn run_sweep(work_dir: PathBuf, max_age: Duration) -> Result<(), BridgeError> {
    let channel = FileCallChannel::open(&work_dir, FileChannelOptions::default()).await?;
    let purged = channel.purge_stale(max_age).await?;
    println!("purgadas: {purged}");
    Ok(())
}

async fn run_launch() -> Result<(), BridgeError> {
    let config = BridgeConfig::from_env()?;
    let bridge = Bridge::builder(config).start().await?;
    log::info!("child running, callbacks at {}; Ctrl-C para detener",
               bridge.callback_url().unwrap_or("-"));
    let mut tick = tokio::time::interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("interrupt received, stopping");
                break;
            }
            _ = tick.tick() => {
                if !bridge.is_child_running() {
                    let code = bridge.supervisor().and_then(|s| s.exit_code());
                    log::warn!("child exited code={code:?}");
                    break;
                }
            }
        }
    }
    bridge.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    // Cargar .env si existe para obtener SAGABRIDGE_*
    let _ = dotenvy::dotenv();
    init_logger();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_command(&args) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("[sagabridge] {msg}\n{USAGE}");
            std::process::exit(2);
        }
    };
    let result = match command {
        Command::Call(call) => run_call(call).await,
        Command::Sweep { work_dir, max_age } => run_sweep(work_dir, max_age).await,
        Command::Launch => run_launch().await,
    };
    if let Err(e) = result {
        eprintln!("[sagabridge] error: {e}");
        std::process::exit(exit_code(&e));
    }
}
