pub mod models {
    pub mod mapping;
    pub mod opcua;
    pub mod twin;
}

pub mod client;
pub mod config;
pub mod error;
pub mod services {
    pub mod decoder;
    pub mod mapping_cache;
    pub mod patch;
    pub mod pipeline;
    pub mod reconcile;
    pub mod resolver;
}

use crate::client::TwinClient;
use crate::config::Config;
use crate::error::BridgeError;
use crate::services::mapping_cache::{DocumentMappingSource, MappingSource};
use crate::services::pipeline::Bridge;
use crate::services::reconcile::ExistencePolicy;
use log::{error, info, warn};
use std::io::BufRead;
use std::path::PathBuf;

#[derive(Debug, Default, PartialEq, Eq)]
struct CliArgs {
    env_file: Option<PathBuf>,
    event_file: Option<PathBuf>,
}

#[derive(Debug)]
struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
}

fn log_failure(err: &BridgeError) {
    error!("{} error, exiting run: {}", err.kind().as_str(), err);
}

fn handle_event<S: MappingSource>(bridge: &Bridge<S, TwinClient>, event: &str) -> Result<(), BridgeError> {
    bridge.process_event(event).map(|_| ()).inspect_err(log_failure)
}

/// Feeds each non-blank line to `handle`, which reports whether the event succeeded.
/// A line that is not valid UTF-8 counts as failed and does not stop the loop.
fn read_events<R: BufRead>(mut reader: R, mut handle: impl FnMut(&str) -> bool) -> std::io::Result<(usize, usize)> {
    let mut handled = 0usize;
    let mut failed = 0usize;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok((handled, failed));
        }
        let line = match std::str::from_utf8(&buf) {
            Ok(l) => l.trim(),
            Err(e) => {
                handled += 1;
                failed += 1;
                warn!("input error, skipping event {}: not valid UTF-8 ({})", handled, e);
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }
        handled += 1;
        if !handle(line) {
            failed += 1;
        }
    }
}

pub fn run(event_file: Option<PathBuf>) -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env().map_err(|e| {
        let e = BridgeError::from(e);
        log_failure(&e);
        e.to_string()
    })?;
    info!(
        "Config loaded (twin_store={}, mapping={}, log_level={}, api_version={}, timeout={}s, auth={}, treat_check_failure_as_absent={})",
        cfg.twin_store_url,
        cfg.mapping_url,
        cfg.log_verbosity,
        cfg.api_version,
        cfg.request_timeout.as_secs(),
        if cfg.access_token.is_some() { "bearer" } else { "none" },
        cfg.treat_check_failure_as_absent
    );

    // 2) Wire the pipeline; the mapping table is fetched lazily on the first batch
    let source = DocumentMappingSource::new(&cfg.mapping_url, cfg.request_timeout, cfg.log_verbosity);
    let store = TwinClient::new(&cfg);
    let policy = ExistencePolicy {
        treat_check_failure_as_absent: cfg.treat_check_failure_as_absent,
    };
    let bridge = Bridge::new(source, store, policy, cfg.log_verbosity);

    // 3) One event from a file, or one event per stdin line
    match event_file {
        Some(path) => {
            let event = std::fs::read_to_string(&path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
            handle_event(&bridge, &event).map_err(|e| e.to_string())
        }
        None => {
            info!("Reading events from stdin, one JSON envelope per line");
            let (handled, failed) = read_events(std::io::stdin().lock(), |line| handle_event(&bridge, line).is_ok())
                .map_err(|e| format!("failed to read stdin: {}", e))?;
            info!("Input closed after {} event(s), {} failed", handled, failed);
            Ok(())
        }
    }
}

fn parse_cli_args<I>(args: I) -> Result<CliArgs, String>
where
    I: IntoIterator<Item = std::ffi::OsString>,
{
    let mut args = args.into_iter();
    let mut parsed = CliArgs::default();

    fn set_once(slot: &mut Option<PathBuf>, flag: &str, value: PathBuf) -> Result<(), String> {
        if slot.is_some() {
            return Err(format!("`{}` provided more than once", flag));
        }
        if value.as_os_str().is_empty() {
            return Err(format!("`{}` requires a path argument", flag));
        }
        *slot = Some(value);
        Ok(())
    }

    while let Some(arg) = args.next() {
        let arg = arg.into_string().map_err(|_| "argument contains invalid UTF-8".to_string())?;
        let (flag, inline) = match arg.split_once('=') {
            Some((f, v)) if f.starts_with("--") => (f.to_string(), Some(v.to_string())),
            _ => (arg.clone(), None),
        };
        let slot = match flag.as_str() {
            "--env-file" => &mut parsed.env_file,
            "--event-file" => &mut parsed.event_file,
            "--" => break,
            _ => return Err(format!("unrecognised argument: {}", arg)),
        };
        let value = match inline {
            Some(v) => PathBuf::from(v),
            None => args
                .next()
                .map(PathBuf::from)
                .ok_or_else(|| format!("`{}` requires a path argument", flag))?,
        };
        set_once(slot, &flag, value)?;
    }

    Ok(parsed)
}

fn load_env(env_file: Option<PathBuf>) -> Result<Option<LoadedEnvFile>, String> {
    // Variables already present in the process environment are never overridden.
    if let Some(path) = env_file {
        if !path.is_file() {
            return Err(format!("env file not found: {}", path.display()));
        }
        dotenvy::from_path(&path).map_err(|e| format!("failed to load {}: {}", path.display(), e))?;
        return Ok(Some(LoadedEnvFile { path, explicit: true }));
    }

    let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
    let default_path = cwd.join(".env");
    if !default_path.is_file() {
        return Ok(None);
    }
    dotenvy::from_path(&default_path).map_err(|e| format!("failed to load {}: {}", default_path.display(), e))?;
    Ok(Some(LoadedEnvFile {
        path: default_path,
        explicit: false,
    }))
}

fn main() {
    let (args, loaded_env) = match parse_cli_args(std::env::args_os().skip(1))
        .and_then(|args| load_env(args.env_file.clone()).map(|env| (args, env)))
    {
        Ok(v) => v,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    info!(
        "opc-twin-bridge {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(args.event_file) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
