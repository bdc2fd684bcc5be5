use crate::cli::args::OutputFormat;
use crate::core::bridge::BridgeStatus;
use crate::infrastructure::trace::TraceRecord;
use tabled::{Table, Tabled};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Console renderer for status data and messages.
pub struct ConsoleWriter {
    format: OutputFormat,
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "ID")]
    id: u64,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Endpoints")]
    endpoints: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Rx")]
    rx_bytes: u64,
    #[tabled(rename = "Tx")]
    tx_bytes: u64,
    #[tabled(rename = "Clients")]
    clients: String,
}

impl From<&BridgeStatus> for StatusRow {
    fn from(status: &BridgeStatus) -> Self {
        Self {
            id: status.id,
            kind: status.kind.to_string(),
            endpoints: status.endpoints.clone(),
            state: status.state.to_string(),
            rx_bytes: status.rx_bytes,
            tx_bytes: status.tx_bytes,
            clients: status
                .client_count
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

impl ConsoleWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn write_status(&self, statuses: &[BridgeStatus]) {
        match self.format {
            OutputFormat::Text => {
                if statuses.is_empty() {
                    println!("(no active bridges)");
                    return;
                }
                for status in statuses {
                    let clients = status
                        .client_count
                        .map(|c| format!(" ({} clients)", c))
                        .unwrap_or_default();
                    println!(
                        "#{} [{}] {}{} - rx {} tx {}",
                        status.id,
                        status.kind,
                        status.endpoints,
                        clients,
                        status.rx_bytes,
                        status.tx_bytes,
                    );
                }
            }
            OutputFormat::Json => match serde_json::to_string_pretty(statuses) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("Error: {}", e),
            },
            OutputFormat::Table => {
                if statuses.is_empty() {
                    println!("(no active bridges)");
                    return;
                }
                let rows: Vec<StatusRow> = statuses.iter().map(StatusRow::from).collect();
                println!("{}", Table::new(rows));
            }
        }
    }

    pub fn write_ports(&self, ports: &[String]) {
        match self.format {
            OutputFormat::Json => match serde_json::to_string_pretty(ports) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("Error: {}", e),
            },
            _ => {
                if ports.is_empty() {
                    println!("(no serial ports found)");
                } else {
                    for port in ports {
                        println!("  {}", port);
                    }
                }
            }
        }
    }

    pub fn write_message(&self, message: &str) {
        println!("{}", message);
    }

    pub fn write_error(&self, error: &str) {
        eprintln!("Error: {}", error);
    }
}

/// Drain the trace channel onto stdout until the sink side closes.
pub fn spawn_trace_printer(mut receiver: mpsc::UnboundedReceiver<TraceRecord>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(record) = receiver.recv().await {
            println!("{}", record);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bridge::{BridgeKind, BridgeState};

    #[test]
    fn test_status_row_conversion() {
        let status = BridgeStatus {
            id: 3,
            kind: BridgeKind::Loopback,
            endpoints: "TCP:9600".to_string(),
            state: BridgeState::Running,
            rx_bytes: 10,
            tx_bytes: 20,
            client_count: Some(2),
        };
        let row = StatusRow::from(&status);
        assert_eq!(row.id, 3);
        assert_eq!(row.kind, "loopback");
        assert_eq!(row.clients, "2");

        let status = BridgeStatus {
            client_count: None,
            kind: BridgeKind::Serial,
            ..status
        };
        let row = StatusRow::from(&status);
        assert_eq!(row.clients, "-");
    }
}
