//! MJPEG relay server example
//!
//! Run with: cargo run --example relay_server [OPTIONS] NAME=URL [NAME=URL ...]
//!
//! Examples:
//!   cargo run --example relay_server front=http://192.168.1.20/video.mjpg
//!   cargo run --example relay_server --on-demand --bind 127.0.0.1:8081 lab=http://cam.local/mjpg
//!
//! ## Viewing
//!
//! Single image:        http://localhost:8080/streams/front.jpeg
//! Stream at 5 fps:     http://localhost:8080/streams/front.mjpg?fr=5
//! Buffered stream:     http://localhost:8080/streams/front.bjpg?wait=10
//! Last frame:          http://localhost:8080/streams/front.last
//! Half size, stamped:  http://localhost:8080/streams/front.mjpg?size=320x240,keepRatio&ts
//! Pull over WebSocket: ws://localhost:8080/streams/front.ws (send `p` per frame)
//!
//! Set `RUST_LOG=mjpeg_relay=debug` for per-session logging.

use std::net::SocketAddr;
use std::time::Duration;

use mjpeg_relay::{RelayServer, ServerConfig, StreamConfig};

struct Args {
    bind_addr: SocketAddr,
    on_demand: bool,
    streams: Vec<(String, String)>,
}

/// Parse bind address, accepting "localhost" for 127.0.0.1
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    const DEFAULT_PORT: u16 = 8080;

    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        on_demand: false,
        streams: Vec::new(),
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--bind" | "-b" => {
                let value = iter.next().ok_or("--bind needs an address")?;
                args.bind_addr = parse_bind_addr(&value)?;
            }
            "--on-demand" => args.on_demand = true,
            _ => match arg.split_once('=') {
                Some((name, url)) => args.streams.push((name.to_string(), url.to_string())),
                None => return Err(format!("Expected NAME=URL, got '{}'", arg)),
            },
        }
    }

    if args.streams.is_empty() {
        return Err("At least one NAME=URL stream is required".to_string());
    }

    Ok(args)
}

fn print_usage() {
    eprintln!("Usage: relay_server [OPTIONS] NAME=URL [NAME=URL ...]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -b, --bind ADDR    Address to bind to (default: 0.0.0.0:8080)");
    eprintln!("  --on-demand        Only connect to cameras while someone is watching");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  relay_server front=http://192.168.1.20/video.mjpg");
    eprintln!("  relay_server --bind localhost:8081 lab=http://cam.local/mjpg");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::args().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mjpeg_relay=info".parse()?)
                .add_directive("relay_server=info".parse()?),
        )
        .init();

    let mut streams = Vec::with_capacity(args.streams.len());
    for (name, url) in &args.streams {
        let config = StreamConfig::builder(name.as_str(), url.as_str())
            .on_demand(args.on_demand)
            .connect_timeout(Duration::from_secs(2))
            .build()?;
        streams.push(config);
    }

    let config = ServerConfig::default().bind(args.bind_addr);

    println!("Starting MJPEG relay on {}", config.bind_addr);
    for (name, url) in &args.streams {
        println!("  {} <- {}", name, url);
        println!("     http://{}{}{}.mjpg", config.bind_addr, config.path_prefix, name);
    }
    println!();

    let server = RelayServer::from_streams(config, streams).await?;

    server
        .run_until(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!("\nShutting down...");
            }
        })
        .await?;

    for stats in server.registry().stats().await {
        println!(
            "{}: {} frames, {} discarded, {} bytes",
            stats.name, stats.frames_published, stats.frames_discarded, stats.bytes_received
        );
    }

    Ok(())
}
