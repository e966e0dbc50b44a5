//! Standalone UDP pong server.
//!
//! A manual complement to [`nettest::tool::udp_pingpong::run_ponger`] for
//! driving a scenario by hand: bind an address, answer every `PING` with
//! `PONG`, run until killed.

use std::env;
use std::error::Error;
use std::str;
use tokio::net::UdpSocket;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("usage: {} <ip_address:port>", args[0]);
        return Err("invalid number of arguments".into());
    }

    let addr = &args[1];
    let socket = UdpSocket::bind(addr).await?;
    log::info!("listening on {}", socket.local_addr()?);

    let mut buf = [0u8; 1024];
    loop {
        let (len, peer) = socket.recv_from(&mut buf).await?;
        let message = match str::from_utf8(&buf[..len]) {
            Ok(s) => s.trim(),
            Err(_) => {
                log::warn!("received non-UTF8 data from {peer}");
                continue;
            }
        };
        log::debug!("received {len} bytes from {peer}: {message}");
        if message == "PING" {
            log::info!("received PING from {peer}, sending PONG");
            socket.send_to(b"PONG", peer).await?;
        }
    }
}
