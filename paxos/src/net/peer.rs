//! # Summary
//!
//! One remote connection. An outbound peer starts in [`connect_loop`]
//! dialing every 2 s until it succeeds (§4.6, §5 "Reconnect timer");
//! once connected, [`run`] drives the read half into the shared
//! inbound queue and the write half from a per-peer outbound channel
//! until the connection drops, at which point — for outbound peers —
//! the caller re-arms the reconnect loop. Inbound (accepted) peers are
//! simply torn down and forgotten, matching "client-role peers are
//! removed from the list" (§4.6).

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::internal;
use crate::message::{Aid, Frame};
use crate::net::codec::FrameCodec;

const RECONNECT_INTERVAL: Duration = Duration::from_secs(2);

/// Dials `addr` repeatedly every [`RECONNECT_INTERVAL`] until a
/// connection succeeds, logging each failure at `warn!`.
pub async fn connect_loop(aid: Aid, addr: SocketAddr) -> TcpStream {
    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                info!("connected to acceptor {} at {}", aid, addr);
                return stream;
            }
            Err(error) => {
                warn!("failed to connect to {} ({}): {}; retrying in {:?}", aid, addr, error, RECONNECT_INTERVAL);
                tokio::time::sleep(RECONNECT_INTERVAL).await;
            }
        }
    }
}

pub fn configure(stream: &TcpStream, tcp_nodelay: bool) -> std::io::Result<()> {
    stream.set_nodelay(tcp_nodelay)
}

/// Drives one connection until it closes: forwards decoded frames into
/// `inbound` tagged with `peer_id`, and writes frames received on
/// `outbound` to the socket. Returns when either direction closes.
pub async fn run(peer_id: Aid, stream: TcpStream, inbound: internal::Tx<(Aid, Frame)>, mut outbound: internal::Rx<Frame>) {
    let mut framed = Framed::new(stream, FrameCodec::default());
    loop {
        tokio::select! {
            incoming = framed.next() => {
                match incoming {
                    Some(Ok(frame)) => inbound.send((peer_id, frame)),
                    Some(Err(error)) => {
                        warn!("peer {} framing error: {}", peer_id, error);
                        break;
                    }
                    None => {
                        info!("peer {} closed connection", peer_id);
                        break;
                    }
                }
            }
            outgoing = outbound.recv() => {
                match outgoing {
                    Some(frame) => {
                        if let Err(error) = framed.send(frame).await {
                            warn!("peer {} write error: {}", peer_id, error);
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }
}
