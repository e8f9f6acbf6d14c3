//! Simple broadcast server using Gale.
//!
//! Run:
//! - cargo run -p gale --example server
//! - cargo run -p gale --example server -- 127.0.0.1:7777

use std::{
    env,
    net::SocketAddr,
    thread,
    time::{Duration, Instant},
};

use gale::{Host, SendOptions, ServerEvent};

fn parse_bind_addr() -> Option<SocketAddr> {
    let mut args = env::args().skip(1);
    args.next().and_then(|s| s.parse().ok())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bind_addr = parse_bind_addr().unwrap_or_else(|| "127.0.0.1:9000".parse().unwrap());
    let mut host = Host::bind(bind_addr)?;
    let local = host.local_addr()?;
    println!("Gale server listening on {}", local);
    println!("Send from the client example to this address.");

    loop {
        host.manual_poll(Instant::now());

        while let Some(event) = host.recv() {
            match event {
                ServerEvent::Connect(addr) => {
                    println!("[connect] {} ({} online)", addr, host.peer_count());
                }
                ServerEvent::Receive { address, payload } => {
                    let text = String::from_utf8_lossy(&payload);
                    println!("[data] from={} payload=\"{}\"", address, text);

                    // Relay to everyone else
                    host.broadcast_except(&payload, SendOptions::Unreliable, address);
                }
                ServerEvent::Disconnect(addr) => {
                    println!("[disconnect] {} ({} online)", addr, host.peer_count());
                }
                ServerEvent::Error => {
                    eprintln!("transport failed, shutting down");
                    return Ok(());
                }
            }
        }

        thread::sleep(Duration::from_millis(10));
    }
}
