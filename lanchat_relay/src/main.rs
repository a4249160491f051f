// CLI entry point for the lanchat relay.
//
// Starts a standalone relay server that chat clients connect to. See
// `server.rs` for the networking architecture and `session.rs` for the
// per-connection state machine.
//
// Usage:
//   lanchat-relay [OPTIONS]
//     --host <ADDR>          Bind address (default: 127.0.0.1)
//     --port <PORT>          Listen port (default: 1234)
//     --storage-dir <DIR>    Directory for received files
//                            (default: received_files; "none" disables)
//     --room <NAME>          Room label for persistence hooks (default: lobby)
//     --exclude-sender       Do not echo messages back to their sender
//
// Logging goes through `tracing`; set RUST_LOG to adjust verbosity, e.g.
// RUST_LOG=lanchat_relay=debug.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;
use tracing_subscriber::EnvFilter;

use lanchat_relay::broadcast::BroadcastPolicy;
use lanchat_relay::server::{RelayConfig, start_relay};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("lanchat_relay=info,lanchat_protocol=info")),
        )
        .init();

    let config = parse_args();

    let (handle, addr) = match start_relay(config) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Failed to start relay: {e}");
            std::process::exit(1);
        }
    };

    info!(%addr, "relay running, press Ctrl+C to stop");

    // The accept thread does the work; this thread just keeps the process
    // alive. The process exits on SIGINT/SIGTERM by default, which tears
    // down all session threads — acceptable for a relay with no durable
    // state of its own. If graceful shutdown is needed later, add the
    // `ctrlc` crate and clear this flag from the handler.
    let running = Arc::new(AtomicBool::new(true));
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(500));
    }

    handle.stop();
}

/// Parse command-line arguments into a `RelayConfig`. Uses simple
/// `std::env::args()` matching — no clap dependency.
fn parse_args() -> RelayConfig {
    let mut config = RelayConfig::default();
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                i += 1;
                config.host = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--host requires a value");
                    std::process::exit(1);
                });
            }
            "--port" => {
                i += 1;
                config.port = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--port requires a valid port number");
                    std::process::exit(1);
                });
            }
            "--storage-dir" => {
                i += 1;
                let value = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--storage-dir requires a value (or \"none\")");
                    std::process::exit(1);
                });
                config.storage_dir = if value == "none" {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            "--room" => {
                i += 1;
                config.room = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--room requires a value");
                    std::process::exit(1);
                });
            }
            "--exclude-sender" => {
                config.policy = BroadcastPolicy::ExcludeSender;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    config
}

fn print_usage() {
    println!("Usage: lanchat-relay [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --host <ADDR>          Bind address (default: 127.0.0.1)");
    println!("  --port <PORT>          Listen port (default: 1234)");
    println!("  --storage-dir <DIR>    Directory for received files");
    println!("                         (default: received_files; \"none\" disables)");
    println!("  --room <NAME>          Room label for persistence hooks (default: lobby)");
    println!("  --exclude-sender       Do not echo messages back to their sender");
    println!("  --help, -h             Show this help");
}
