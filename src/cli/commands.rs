use crate::cli::args::{Args, Command};
use crate::cli::output::{spawn_trace_printer, ConsoleWriter};
use crate::core::registry::{BridgeRegistry, BridgeSpec};
use crate::domain::error::{HubError, HubResult};
use crate::domain::port::PortConfig;
use crate::infrastructure::config::{ConfigManager, HubConfig};
use crate::infrastructure::serial::available_ports;
use crate::infrastructure::trace::TraceSink;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

/// Execute one CLI invocation: set up the registry and trace sink, run the
/// requested command (or the interactive prompt) and stop everything on the
/// way out.
pub async fn execute_command(args: Args, config: HubConfig) -> HubResult<()> {
    let writer = ConsoleWriter::new(args.output);

    let (trace, trace_receiver) = TraceSink::new(config.trace_enabled);
    let trace = Arc::new(trace);
    let _printer = spawn_trace_printer(trace_receiver);

    let registry = Arc::new(BridgeRegistry::new(
        Arc::clone(&trace),
        config.relay_settings(),
    ));

    match args.command {
        Some(Command::Bridge { spec1, spec2 }) => {
            let first: PortConfig = spec1.parse()?;
            let second: PortConfig = spec2.parse()?;
            let id = registry
                .create(BridgeSpec::Serial {
                    first: first.clone(),
                    second: second.clone(),
                })
                .await?;
            writer.write_message(&format!(
                "Started bridge #{}: {} <-> {}",
                id, first.name, second.name
            ));
            wait_for_shutdown(&registry).await;
            Ok(())
        }
        Some(Command::Loopback { port }) => {
            let port = port.unwrap_or(config.default_loopback_port);
            let id = registry.create(BridgeSpec::Loopback { port }).await?;
            writer.write_message(&format!("Started loopback #{} on TCP port {}", id, port));
            writer.write_message(&format!(
                "  Connect to 127.0.0.1:{} - data is relayed between all clients",
                port
            ));
            wait_for_shutdown(&registry).await;
            Ok(())
        }
        Some(Command::Tcpserial { spec, port }) => {
            let serial: PortConfig = spec.parse()?;
            let id = registry
                .create(BridgeSpec::TcpSerial {
                    serial: serial.clone(),
                    tcp_port: port,
                })
                .await?;
            writer.write_message(&format!(
                "Started TCP-serial bridge #{}: {} <-> TCP:{}",
                id, serial.name, port
            ));
            wait_for_shutdown(&registry).await;
            Ok(())
        }
        Some(Command::List) => {
            list_ports(&writer)?;
            Ok(())
        }
        None => interactive(&registry, &trace, &writer, &config).await,
    }
}

/// Load the hub configuration honoring an explicit `--config` path.
pub fn load_config(path: Option<&str>) -> HubResult<HubConfig> {
    match path {
        Some(path) => ConfigManager::load_config_from_path(Path::new(path)),
        None => ConfigManager::new().load_config(),
    }
}

fn list_ports(writer: &ConsoleWriter) -> HubResult<()> {
    writer.write_message("Available serial ports:");
    writer.write_ports(&available_ports()?);
    Ok(())
}

/// Block until Ctrl-C, then wind down every bridge.
async fn wait_for_shutdown(registry: &BridgeRegistry) {
    println!("Press Ctrl+C to stop...");
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutting down");
    registry.stop_all().await;
}

const PROMPT_HELP: &str = "Commands:
  bridge <spec1> <spec2>  - Bridge two serial ports
  loopback [port]         - TCP fan-out server on the loopback interface
  tcpserial <spec> <port> - Bridge a serial port to TCP
  list                    - Show available serial ports
  status                  - Show active bridges
  stop <id>               - Stop a bridge
  hex                     - Toggle byte-level tracing
  help                    - Show this help
  quit                    - Exit

Port spec: name[:baud[,dataBits[,parity[,stopBits]]]], e.g. COM5:19200,7,E,2";

/// Interactive prompt: one registry, commands dispatched line by line.
async fn interactive(
    registry: &BridgeRegistry,
    trace: &TraceSink,
    writer: &ConsoleWriter,
    config: &HubConfig,
) -> HubResult<()> {
    writer.write_message(&format!("SerialHub {}", env!("CARGO_PKG_VERSION")));
    writer.write_message(PROMPT_HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(&command) = parts.first() else {
            continue;
        };

        let result = match command {
            "bridge" => run_bridge(registry, writer, &parts).await,
            "loopback" => run_loopback(registry, writer, &parts, config).await,
            "tcpserial" => run_tcpserial(registry, writer, &parts).await,
            "list" => list_ports(writer),
            "status" => {
                writer.write_status(&registry.status().await);
                Ok(())
            }
            "stop" => run_stop(registry, writer, &parts).await,
            "hex" => {
                let enabled = trace.toggle();
                writer.write_message(&format!(
                    "Tracing {}",
                    if enabled { "enabled" } else { "disabled" }
                ));
                Ok(())
            }
            "help" => {
                writer.write_message(PROMPT_HELP);
                Ok(())
            }
            "quit" | "exit" => break,
            _ => {
                writer.write_message("Unknown command. Type 'help' for options.");
                Ok(())
            }
        };

        if let Err(e) = result {
            writer.write_error(&e.to_string());
        }
    }

    registry.stop_all().await;
    Ok(())
}

async fn run_bridge(
    registry: &BridgeRegistry,
    writer: &ConsoleWriter,
    parts: &[&str],
) -> HubResult<()> {
    let [_, spec1, spec2] = parts else {
        writer.write_message("Usage: bridge <spec1> <spec2>");
        return Ok(());
    };
    let first: PortConfig = spec1.parse()?;
    let second: PortConfig = spec2.parse()?;
    let id = registry
        .create(BridgeSpec::Serial {
            first: first.clone(),
            second: second.clone(),
        })
        .await?;
    writer.write_message(&format!(
        "Started bridge #{}: {} <-> {}",
        id, first.name, second.name
    ));
    Ok(())
}

async fn run_loopback(
    registry: &BridgeRegistry,
    writer: &ConsoleWriter,
    parts: &[&str],
    config: &HubConfig,
) -> HubResult<()> {
    let port = match parts.get(1) {
        Some(field) => field.parse().map_err(|_| HubError::Config {
            message: format!("invalid TCP port '{}'", field),
        })?,
        None => config.default_loopback_port,
    };
    let id = registry.create(BridgeSpec::Loopback { port }).await?;
    writer.write_message(&format!("Started loopback #{} on TCP port {}", id, port));
    Ok(())
}

async fn run_tcpserial(
    registry: &BridgeRegistry,
    writer: &ConsoleWriter,
    parts: &[&str],
) -> HubResult<()> {
    let [_, spec, port] = parts else {
        writer.write_message("Usage: tcpserial <spec> <tcpPort>");
        return Ok(());
    };
    let serial: PortConfig = spec.parse()?;
    let tcp_port: u16 = port.parse().map_err(|_| HubError::Config {
        message: format!("invalid TCP port '{}'", port),
    })?;
    let id = registry
        .create(BridgeSpec::TcpSerial {
            serial: serial.clone(),
            tcp_port,
        })
        .await?;
    writer.write_message(&format!(
        "Started TCP-serial bridge #{}: {} <-> TCP:{}",
        id, serial.name, tcp_port
    ));
    Ok(())
}

async fn run_stop(
    registry: &BridgeRegistry,
    writer: &ConsoleWriter,
    parts: &[&str],
) -> HubResult<()> {
    let Some(field) = parts.get(1) else {
        writer.write_message("Usage: stop <id>");
        return Ok(());
    };
    let id: u64 = field.parse().map_err(|_| HubError::Config {
        message: format!("invalid bridge id '{}'", field),
    })?;
    if registry.stop(id).await {
        writer.write_message(&format!("Stopped bridge #{}", id));
        Ok(())
    } else {
        Err(HubError::NotFound { id })
    }
}
