//! Minimal client for the server example.
//!
//! Gale is the server-side session layer; this client speaks the envelope
//! format directly over a plain UDP socket: connect, answer pings, send a
//! line of data per second.
//!
//! Run:
//! - cargo run -p gale --example client
//! - cargo run -p gale --example client -- 127.0.0.1:7777

use std::{
    env,
    net::{SocketAddr, UdpSocket},
    time::{Duration, Instant},
};

use gale::Envelope;

fn parse_server_addr() -> Option<SocketAddr> {
    let mut args = env::args().skip(1);
    args.next().and_then(|s| s.parse().ok())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server_addr = parse_server_addr().unwrap_or_else(|| "127.0.0.1:9000".parse().unwrap());
    let socket = UdpSocket::bind("127.0.0.1:0")?;
    socket.set_read_timeout(Some(Duration::from_millis(100)))?;

    socket.send_to(&Envelope::Connect { session_id: 0 }.encode(), server_addr)?;
    println!("connecting to {}...", server_addr);

    let mut buffer = [0u8; 1500];
    let mut last_chat = Instant::now();
    let mut counter = 0u32;

    loop {
        if let Ok((length, from)) = socket.recv_from(&mut buffer) {
            match Envelope::decode(&buffer[..length]) {
                Ok(Envelope::Connect { session_id }) => {
                    println!("connected, session {}", session_id);
                }
                Ok(Envelope::Ping { timestamp }) => {
                    socket.send_to(&Envelope::Pong { timestamp }.encode(), from)?;
                }
                Ok(Envelope::Unreliable { payload }) => {
                    println!("<< {}", String::from_utf8_lossy(&payload));
                }
                Ok(Envelope::Disconnect) => {
                    println!("server said goodbye");
                    return Ok(());
                }
                _ => {}
            }
        }

        if last_chat.elapsed() >= Duration::from_secs(1) {
            last_chat = Instant::now();
            counter += 1;
            let message = format!("hello #{}", counter);
            socket.send_to(
                &Envelope::Unreliable { payload: message.into_bytes() }.encode(),
                server_addr,
            )?;
        }
    }
}
