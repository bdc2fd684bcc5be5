use clap::{Parser, Subcommand, ValueEnum};

/// Command line arguments for SerialHub
#[derive(Parser, Debug)]
#[command(
    name = "serialhub",
    version = env!("CARGO_PKG_VERSION"),
    about = "User-mode data-relay hub for serial devices and TCP sockets",
    long_about = "Connects pairs or groups of byte-stream endpoints - serial devices and \
TCP sockets - and copies bytes between them, optionally tracing every transfer. \
Run without a command for the interactive prompt."
)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Output format for status data
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Command to execute; omit for interactive mode
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bridge two serial ports together
    Bridge {
        /// First port spec, e.g. COM5:19200,7,E,2 or /dev/ttyUSB0
        spec1: String,
        /// Second port spec
        spec2: String,
    },
    /// TCP fan-out server on the loopback interface
    Loopback {
        /// TCP port to listen on
        port: Option<u16>,
    },
    /// Bridge a serial port onto a TCP listener
    Tcpserial {
        /// Serial port spec
        spec: String,
        /// TCP port to listen on
        port: u16,
    },
    /// List available serial ports
    List,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output
    Json,
    /// Table output
    Table,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Table => write!(f, "table"),
        }
    }
}
