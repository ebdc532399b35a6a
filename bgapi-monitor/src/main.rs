//! bgapi-monitor: open a BGAPI link, identify the device and log its events.

use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{error, info, warn};

use bgapi_protocol::{BgapiCommand, BgapiEvent, BgapiResponse, DiscoverMode, PacketRegistry};
use bgapi_transport::{BgapiEventListener, BgapiHandler, BgapiHandlerListener, HandlerConfig, TransportError};

mod link;
mod logging;

use link::LinkTarget;

/// bgapi-monitor - BlueGiga BGAPI link monitor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serial-to-TCP bridge address (host:port)
    #[arg(long, conflicts_with = "device")]
    tcp: Option<String>,

    /// Path to an already configured serial device
    #[arg(short, long)]
    device: Option<PathBuf>,

    /// Configuration file path
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory where log files are stored
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Number of days to keep log files
    #[arg(long, default_value = "7")]
    log_retention_days: u64,

    /// Start a generic GAP discovery and log scan responses
    #[arg(long)]
    scan: bool,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    duration: Option<u64>,
}

/// Configuration file format.
#[derive(Debug, serde::Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    link: LinkSection,
    /// Missing fields, or the whole section, fall back to BGAPI_*
    /// environment variables.
    handler: Option<HandlerConfig>,
    #[serde(default)]
    logging: LoggingSection,
}

#[derive(Debug, serde::Deserialize, Default)]
struct LinkSection {
    tcp: Option<String>,
    device: Option<String>,
    connect_timeout_ms: Option<u64>,
    read_timeout_ms: Option<u64>,
}

#[derive(Debug, serde::Deserialize, Default)]
struct LoggingSection {
    log_dir: Option<String>,
    retention_days: Option<u64>,
    level: Option<String>,
}

fn load_config(path: &PathBuf) -> Result<ConfigFile, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: ConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Command line first, then the `[link]` section.
fn resolve_target(args: &Args, link: &LinkSection) -> Option<LinkTarget> {
    if let Some(addr) = &args.tcp {
        return Some(LinkTarget::Tcp(addr.clone()));
    }
    if let Some(path) = &args.device {
        return Some(LinkTarget::Device(path.clone()));
    }
    link.tcp
        .clone()
        .map(LinkTarget::Tcp)
        .or_else(|| link.device.clone().map(|p| LinkTarget::Device(PathBuf::from(p))))
}

/// Why the monitor stopped waiting.
enum Stop {
    Interrupted,
    LinkClosed(TransportError),
}

fn log_response(what: &str, outcome: Result<BgapiResponse, TransportError>) -> Result<BgapiResponse, TransportError> {
    match &outcome {
        Ok(response) => match serde_json::to_string(response) {
            Ok(json) => info!("{}: {}", what, json),
            Err(_) => info!("{}: {:?}", what, response),
        },
        Err(e) => error!("{} failed: {}", what, e),
    }
    outcome
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load config file: explicit path > auto-detect > default
    let config_path = args.config.clone().or_else(|| {
        let default_path = PathBuf::from("bgapi-monitor.toml");
        default_path.exists().then_some(default_path)
    });
    let file_config = match &config_path {
        Some(path) => match load_config(path) {
            Ok(c) => {
                eprintln!("Loaded config from: {}", path.display());
                c
            }
            Err(e) => {
                eprintln!("Failed to load config file: {}", e);
                return Err(e);
            }
        },
        None => ConfigFile::default(),
    };

    // Command line takes precedence over the file
    let log_dir = if args.log_dir.to_string_lossy() != "logs" {
        args.log_dir.clone()
    } else {
        PathBuf::from(file_config.logging.log_dir.as_deref().unwrap_or("logs"))
    };
    let log_retention_days = if args.log_retention_days != 7 {
        args.log_retention_days
    } else {
        file_config.logging.retention_days.unwrap_or(7)
    };
    let _log_guard = logging::init_logging(
        &log_dir,
        log_retention_days,
        args.verbose,
        file_config.logging.level.as_deref(),
    )?;

    let target = match resolve_target(&args, &file_config.link) {
        Some(target) => target,
        None => {
            error!("No link given; use --tcp, --device or a [link] section");
            return Err("no link configured".into());
        }
    };
    let handler_config = file_config.handler.unwrap_or_else(HandlerConfig::load_from_env);
    let connect_timeout = Duration::from_millis(file_config.link.connect_timeout_ms.unwrap_or(5000));
    let read_timeout = Duration::from_millis(file_config.link.read_timeout_ms.unwrap_or(100));

    info!("bgapi-monitor starting...");
    info!("  Link: {}", target);
    info!("  Transaction timeout: {:?}", handler_config.transaction_timeout);

    let link = target.open(connect_timeout, read_timeout).map_err(|e| {
        error!("Failed to open {}: {}", target, e);
        e
    })?;
    let handler = BgapiHandler::connect(
        link.input,
        link.output,
        Arc::new(PacketRegistry::ble112()),
        handler_config,
    )?;

    let (stop_tx, stop_rx) = mpsc::channel::<Stop>();

    let closed_tx = stop_tx.clone();
    let on_close: Arc<dyn BgapiHandlerListener> = Arc::new(move |cause: &TransportError| {
        let _ = closed_tx.send(Stop::LinkClosed(cause.clone()));
    });
    handler.add_handler_listener(on_close);

    let on_event: Arc<dyn BgapiEventListener> = Arc::new(|event: &BgapiEvent| match serde_json::to_string(event) {
        Ok(json) => info!("{} {}", event.key(), json),
        Err(e) => warn!("{} could not be rendered: {}", event.key(), e),
    });
    handler.add_event_listener(on_event);

    let interrupt_tx = stop_tx.clone();
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(Stop::Interrupted);
    })?;

    log_response("system_hello", handler.send(BgapiCommand::SystemHello))?;
    log_response("system_get_info", handler.send(BgapiCommand::SystemGetInfo))?;
    log_response("system_address_get", handler.send(BgapiCommand::SystemAddressGet))?;

    if args.scan {
        let response = log_response(
            "gap_discover",
            handler.send(BgapiCommand::GapDiscover {
                mode: DiscoverMode::Generic,
            }),
        )?;
        if response.result().map(|r| !r.is_success()).unwrap_or(false) {
            warn!("Device refused discovery: {:?}", response.result());
        }
    }

    let stop = match args.duration {
        Some(secs) => stop_rx.recv_timeout(Duration::from_secs(secs)).unwrap_or(Stop::Interrupted),
        None => stop_rx.recv().unwrap_or(Stop::Interrupted),
    };

    match stop {
        Stop::Interrupted => {
            info!("Stopping...");
            if args.scan {
                let _ = log_response("gap_end_procedure", handler.send(BgapiCommand::GapEndProcedure));
            }
        }
        Stop::LinkClosed(cause) => warn!("Link closed: {}", cause),
    }

    handler.close();
    match serde_json::to_string(&handler.stats()) {
        Ok(json) => info!("Link statistics: {}", json),
        Err(e) => warn!("Failed to render statistics: {}", e),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["bgapi-monitor"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_parse_config_file() {
        let config: ConfigFile = toml::from_str(
            r#"
            [link]
            tcp = "192.168.1.20:4000"
            read_timeout_ms = 50

            [handler]
            transaction_timeout_ms = 0
            max_read_errors = 5

            [logging]
            level = "trace"
            "#,
        )
        .unwrap();

        assert_eq!(config.link.tcp.as_deref(), Some("192.168.1.20:4000"));
        assert_eq!(config.link.read_timeout_ms, Some(50));
        let handler = config.handler.unwrap();
        assert_eq!(handler.transaction_timeout, None);
        assert_eq!(handler.max_read_errors, 5);
        assert_eq!(handler.worker_threads, HandlerConfig::default().worker_threads);
        assert_eq!(config.logging.level.as_deref(), Some("trace"));
    }

    #[test]
    fn test_handler_section_keeps_environment_for_missing_fields() {
        std::env::set_var("BGAPI_CLOSE_TIMEOUT", "777");
        let config: ConfigFile = toml::from_str(
            r#"
            [handler]
            max_read_errors = 9
            "#,
        )
        .unwrap();
        std::env::remove_var("BGAPI_CLOSE_TIMEOUT");

        let handler = config.handler.unwrap();
        assert_eq!(handler.max_read_errors, 9);
        assert_eq!(handler.close_timeout, Duration::from_millis(777));
    }

    #[test]
    fn test_empty_config_file() {
        let config: ConfigFile = toml::from_str("").unwrap();
        assert!(config.handler.is_none());
        assert!(config.link.tcp.is_none());
    }

    #[test]
    fn test_command_line_target_wins() {
        let link = LinkSection {
            tcp: Some("10.0.0.1:4000".into()),
            ..LinkSection::default()
        };
        assert_eq!(
            resolve_target(&args(&["--device", "/dev/ttyACM0"]), &link),
            Some(LinkTarget::Device("/dev/ttyACM0".into()))
        );
        assert_eq!(
            resolve_target(&args(&[]), &link),
            Some(LinkTarget::Tcp("10.0.0.1:4000".into()))
        );
        assert_eq!(resolve_target(&args(&[]), &LinkSection::default()), None);
    }

    #[test]
    fn test_tcp_and_device_conflict() {
        let parsed = Args::try_parse_from(["bgapi-monitor", "--tcp", "a:1", "--device", "/dev/x"]);
        assert!(parsed.is_err());
    }
}
