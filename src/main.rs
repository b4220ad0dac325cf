//! Fleet Relay — real-time location/trip-status broadcast server
//!
//! A single-process WebSocket relay for a vehicle-fleet dashboard. Drivers
//! push location and trip-status updates; every update is authorized against
//! current trip ownership, persisted, and fanned out to all connected
//! clients.
//!
//! Usage:
//!   fleet-relay                      # Default port 8080
//!   fleet-relay --port 9090          # Custom port
//!   fleet-relay --cors               # Dashboards on another origin
//!   fleet-relay --log-file relay.log # Append logs to a file

use std::sync::Arc;

use clap::Parser;
use relay_protocol::TripStatus;
use relay_server::Relay;
use relay_store::{Driver, DriverStatus, MemoryStore, Trip, Vehicle, VehicleStatus};
use relay_transport::{ConnectionRegistry, InboundFrame, TransportConfig, TransportServer};
use tokio::sync::mpsc;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Capacity of the inbound frame channel feeding the single relay loop.
const INBOUND_QUEUE: usize = 256;

#[derive(Parser, Debug)]
#[command(name = "fleet-relay", about = "Fleet Relay — real-time trip broadcast server")]
struct Cli {
    /// Port to listen on (0 for OS-assigned)
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Hostname to bind to
    #[arg(long, default_value = "127.0.0.1")]
    hostname: String,

    /// Maximum concurrent connections
    #[arg(long, default_value = "64")]
    max_connections: usize,

    /// Enable permissive CORS on the HTTP endpoints
    #[arg(long)]
    cors: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Write logs to a file instead of stderr
    #[arg(long)]
    log_file: Option<std::path::PathBuf>,
}

/// Seed a small demo fleet so the relay is exercisable out of the box.
fn seed_demo_fleet(store: &MemoryStore) {
    store.insert_vehicle(Vehicle { id: "vehicle-1".into(), status: VehicleStatus::Available });
    store.insert_vehicle(Vehicle { id: "vehicle-2".into(), status: VehicleStatus::Available });
    store.insert_driver(Driver {
        id: "driver-1".into(),
        name: "Dana Mills".into(),
        status: DriverStatus::Available,
    });
    store.insert_driver(Driver {
        id: "driver-2".into(),
        name: "Ray Okafor".into(),
        status: DriverStatus::Available,
    });
    store.insert_trip(Trip {
        id: "trip-1".into(),
        driver_id: "driver-1".into(),
        vehicle_id: "vehicle-1".into(),
        status: TripStatus::Assigned,
        origin: "Warehouse A".into(),
        destination: "Customer Site".into(),
        start_time: None,
        end_time: None,
    });
    store.insert_trip(Trip {
        id: "trip-2".into(),
        driver_id: "driver-2".into(),
        vehicle_id: "vehicle-2".into(),
        status: TripStatus::Assigned,
        origin: "Depot North".into(),
        destination: "Harbor Terminal".into(),
        start_time: None,
        end_time: None,
    });
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    if let Some(ref log_path) = cli.log_file {
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .unwrap_or_else(|e| panic!("Failed to open log file {}: {e}", log_path.display()));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init();

        eprintln!("Logging to {}", log_path.display());
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let store = Arc::new(MemoryStore::new());
    seed_demo_fleet(&store);

    let registry = Arc::new(ConnectionRegistry::new());
    let (frames_tx, frames_rx) = mpsc::channel::<InboundFrame>(INBOUND_QUEUE);

    // Single processing loop: one frame is fully handled before the next.
    let relay = Relay::new(store, registry.clone());
    let relay_handle = tokio::spawn(relay.run(frames_rx));

    let config = TransportConfig {
        port: cli.port,
        hostname: cli.hostname.clone(),
        enable_cors: cli.cors,
        max_connections: Some(cli.max_connections),
    };

    let mut transport = match TransportServer::start(config, registry, frames_tx).await {
        Ok(t) => t,
        Err(e) => {
            error!("failed to start transport: {e}");
            std::process::exit(1);
        }
    };

    let actual_port = transport.port();
    println!();
    println!("  Fleet Relay running");
    println!();
    println!("  WebSocket endpoint:  ws://{}:{}/ws", cli.hostname, actual_port);
    println!("  Health check:        http://{}:{}/health", cli.hostname, actual_port);
    println!();
    println!("  Seeded demo trips:   trip-1 (driver-1), trip-2 (driver-2)");
    println!();
    println!("  Press Ctrl+C to stop.");
    println!();

    let _ = tokio::signal::ctrl_c().await;

    println!();
    println!("  Shutting down...");
    transport.stop().await;

    // The transport held the last frame sender; its drop ends the relay loop.
    let _ = relay_handle.await;
    println!("  Server stopped.");
}
