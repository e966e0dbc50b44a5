//! # Plain UDP Ping/Pong Oracle
//!
//! ## Purpose
//!
//! The end-to-end scenarios need a protocol-correct baseline to compare an
//! XDP-forwarded exchange against: a plain kernel UDP socket that speaks
//! the same four-byte `PING`/`PONG` messages. Packets that reach here went
//! through the framework's classifier, ring plumbing, and (for cross-forward
//! scenarios) a different interface than the one they arrived on — if this
//! still works, the framework moved the bytes intact.

use std::io;
use std::net::UdpSocket;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const PING: &[u8] = b"PING";
const PONG: &[u8] = b"PONG";

/// Sends one `PING` to `remote_addr` and waits up to 5s for a `PONG` back.
pub fn run_pinger(local_addr: &str, remote_addr: &str) -> io::Result<()> {
    let socket = UdpSocket::bind(local_addr)?;
    log::debug!("pinger bound to {local_addr}");
    socket.connect(remote_addr)?;
    socket.set_read_timeout(Some(Duration::from_secs(5)))?;
    log::debug!("pinger sending PING to {remote_addr}");
    socket.send(PING)?;

    let mut buf = [0u8; 1024];
    match socket.recv(&mut buf) {
        Ok(n) if &buf[..n] == PONG => {
            log::debug!("pinger received PONG from {remote_addr}");
            Ok(())
        }
        Ok(n) => {
            let got = String::from_utf8_lossy(&buf[..n]);
            Err(io::Error::other(format!("unexpected reply: {got}")))
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => {
            log::error!("pinger timed out waiting for PONG from {remote_addr}");
            Err(e)
        }
        Err(e) => Err(e),
    }
}

/// Answers every `PING` with `PONG` until `token` is cancelled.
pub fn run_ponger(local_addr: &str, token: CancellationToken) -> io::Result<()> {
    let socket = UdpSocket::bind(local_addr)?;
    log::debug!("ponger listening on {local_addr}");
    socket.set_read_timeout(Some(Duration::from_millis(100)))?;

    let mut buf = [0u8; 1024];
    while !token.is_cancelled() {
        match socket.recv_from(&mut buf) {
            Ok((n, src)) if &buf[..n] == PING => {
                log::debug!("ponger replying to {src}");
                socket.send_to(PONG, src)?;
            }
            Ok((n, src)) => {
                log::debug!("ponger ignoring unexpected message from {src}: {:?}", &buf[..n]);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => continue,
            Err(e) => {
                log::error!("ponger socket error: {e}");
                return Err(e);
            }
        }
    }
    Ok(())
}
