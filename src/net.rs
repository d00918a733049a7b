//! Socket plumbing around the session.
//!
//! Three threads per connection, talking only through the two queues:
//!
//! ```text
//! socket --rx_loop--> inbound --Session::run--> outbound --tx_loop--> socket
//! ```
//!
//! Whichever side stops first shuts both queues down, which releases the
//! others.

use std::io::{BufReader, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;

use tracing::{debug, info, trace, warn};

use crate::config::{NodeConfig, SessionConfig};
use crate::error::{Error, Result};
use crate::fifo::Fifo;
use crate::session::{Session, SessionQueues, Stage};
use crate::wire::{self, Frame};

/// Counters reported by [`rx_loop`] when it stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxStats {
    pub admitted: u64,
    pub rejected: u64,
}

/// Reads frames from `reader` and feeds the valid ones to `inbound`.
///
/// Frames failing the checksum (or length) check are dropped and counted;
/// the connection stays up. A frame from another network means we have lost
/// the message boundaries, so it ends the loop with [`Error::BadMagic`].
///
/// Returns when `inbound` is shut down, or with the read error that ended
/// the connection.
pub fn rx_loop<R: Read>(reader: &mut R, magic: u32, inbound: &Fifo<Frame>) -> Result<RxStats> {
    let mut stats = RxStats::default();

    while !inbound.is_shutdown() {
        let (header, payload) = wire::read_frame(reader)?;

        if header.magic != magic {
            return Err(Error::BadMagic {
                expected: magic,
                actual: header.magic,
            });
        }

        trace!(
            header = %hex::encode(header.encode()),
            payload = %hex::encode(&payload),
            "frame read"
        );

        if !header.validate(&payload) {
            stats.rejected += 1;
            debug!(
                command = header.command_name(),
                checksum = header.checksum,
                "dropping frame with bad checksum"
            );
            continue;
        }

        stats.admitted += 1;
        if let Some(evicted) = inbound.push(Frame::new(&header, &payload)?) {
            warn!(
                len = evicted.len(),
                drops = inbound.drops(),
                "inbound queue full, oldest frame dropped"
            );
        }
    }

    Ok(stats)
}

/// Writes every frame popped from `outbound` to `writer`, in order.
///
/// Returns once `outbound` is shut down, or with the first write error.
pub fn tx_loop<W: Write>(writer: &mut W, outbound: &Fifo<Frame>) -> Result<u64> {
    let mut sent = 0;

    while let Some(frame) = outbound.pop_or_wait() {
        if let Ok(command) = frame.command() {
            debug!(%command, len = frame.len(), "sending");
        }
        wire::write_frame(writer, &frame)?;
        sent += 1;
    }

    Ok(sent)
}

fn resolve(peer: &str) -> Result<SocketAddr> {
    peer.to_socket_addrs()
        .map_err(|e| Error::Resolve(format!("{peer}: {e}")))?
        .next()
        .ok_or_else(|| Error::Resolve(format!("{peer}: no addresses")))
}

/// Connects to the configured peer and runs the session until the
/// connection ends. Returns the stage the handshake reached.
pub fn connect(config: &NodeConfig) -> Result<Stage> {
    let peer = config.peer_with_port();
    let addr = resolve(&peer)?;

    info!(%peer, %addr, network = %config.network(), "connecting");
    let stream = TcpStream::connect_timeout(&addr, config.connect_timeout)?;
    stream.set_read_timeout(Some(config.idle_timeout))?;
    stream.set_write_timeout(Some(config.connect_timeout))?;

    let mut session_config = config.session.clone();
    session_config.peer_addr = Some(addr);

    run_stream(stream, session_config, SessionQueues::from_config(config))
}

/// Runs one session over an already connected stream.
///
/// The session itself runs on the calling thread; reading and writing get a
/// thread each. On return both queues are shut down, the socket is closed
/// and both threads are joined.
pub fn run_stream(
    stream: TcpStream,
    config: SessionConfig,
    queues: SessionQueues,
) -> Result<Stage> {
    let magic = config.network.magic();
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream.try_clone()?;

    let rx = {
        let queues = queues.clone();
        thread::Builder::new()
            .name("peer-rx".into())
            .spawn(move || {
                let result = rx_loop(&mut reader, magic, &queues.inbound);
                match &result {
                    Ok(stats) => debug!(?stats, "rx loop stopped"),
                    Err(_) if queues.inbound.is_shutdown() => debug!("rx loop stopped"),
                    Err(Error::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                        info!("peer closed connection")
                    }
                    Err(err) => warn!(%err, "rx loop failed"),
                }
                queues.shutdown();
                result
            })?
    };

    let tx = {
        let queues = queues.clone();
        thread::Builder::new()
            .name("peer-tx".into())
            .spawn(move || {
                let result = tx_loop(&mut writer, &queues.outbound);
                match &result {
                    Ok(sent) => debug!(sent, "tx loop stopped"),
                    Err(err) => warn!(%err, "tx loop failed"),
                }
                queues.shutdown();
                result
            })
    };
    let tx = match tx {
        Ok(tx) => tx,
        Err(err) => {
            close(&stream, &queues);
            if rx.join().is_err() {
                warn!("rx thread panicked");
            }
            return Err(err.into());
        }
    };

    let mut session = Session::new(config, &queues);
    let result = session.run();

    close(&stream, &queues);

    if rx.join().is_err() {
        warn!("rx thread panicked");
    }
    if tx.join().is_err() {
        warn!("tx thread panicked");
    }

    result?;
    info!(stage = ?session.stage(), "session ended");

    Ok(session.stage())
}

/// Shuts down both queues and the socket. Closing the socket unblocks an rx
/// thread parked in a read.
fn close(stream: &TcpStream, queues: &SessionQueues) {
    queues.shutdown();
    let _ = stream.shutdown(Shutdown::Both);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::constants::{MAINNET_MAGIC, REGTEST_MAGIC};
    use std::io::Cursor;

    fn frame_bytes(command: &str, payload: &[u8]) -> Vec<u8> {
        wire::build_message(MAINNET_MAGIC, command, payload)
            .unwrap()
            .into_bytes()
    }

    #[test]
    fn rx_loop_admits_valid_frames_and_drops_forged_ones() {
        let mut bytes = frame_bytes("version", &[]);

        let mut forged = frame_bytes("ping", &1u64.to_le_bytes());
        let last = forged.len() - 1;
        forged[last] ^= 0xFF;
        bytes.extend(forged);

        bytes.extend(frame_bytes("verack", &[]));

        let inbound = Fifo::new(8);
        let err = rx_loop(&mut Cursor::new(bytes), MAINNET_MAGIC, &inbound).unwrap_err();

        // The stream ends after the third frame.
        assert!(matches!(err, Error::Io(e) if e.kind() == ErrorKind::UnexpectedEof));

        let admitted: Vec<_> = std::iter::from_fn(|| inbound.pop())
            .map(|f| f.command().unwrap().name())
            .collect();
        assert_eq!(admitted, vec!["version", "verack"]);
    }

    #[test]
    fn rx_loop_stops_on_foreign_magic() {
        let bytes = wire::build_message(REGTEST_MAGIC, "verack", &[])
            .unwrap()
            .into_bytes();

        let inbound = Fifo::new(8);
        let err = rx_loop(&mut Cursor::new(bytes), MAINNET_MAGIC, &inbound).unwrap_err();

        assert!(matches!(
            err,
            Error::BadMagic {
                expected: MAINNET_MAGIC,
                actual: REGTEST_MAGIC
            }
        ));
        assert!(inbound.is_empty());
    }

    #[test]
    fn rx_loop_returns_when_inbound_is_shut_down() {
        let inbound = Fifo::new(8);
        inbound.shutdown();

        let stats = rx_loop(&mut Cursor::new(vec![]), MAINNET_MAGIC, &inbound).unwrap();
        assert_eq!(stats, RxStats::default());
    }

    #[test]
    fn tx_loop_writes_frames_in_pop_order() {
        let outbound = Fifo::new(8);
        let verack = wire::build_verack_message(MAINNET_MAGIC).unwrap();
        let getaddr = wire::build_getaddr_message(MAINNET_MAGIC).unwrap();
        outbound.push(verack.clone());
        outbound.push(getaddr.clone());
        outbound.shutdown();

        // Shut down before the loop started: nothing is written.
        let mut out = vec![];
        assert_eq!(tx_loop(&mut out, &outbound).unwrap(), 0);
        assert!(out.is_empty());

        let outbound = std::sync::Arc::new(Fifo::new(8));
        outbound.push(verack.clone());
        outbound.push(getaddr.clone());

        let writer = {
            let outbound = std::sync::Arc::clone(&outbound);
            thread::spawn(move || {
                let mut out = vec![];
                tx_loop(&mut out, &outbound).map(|sent| (sent, out))
            })
        };

        while !outbound.is_empty() {
            thread::sleep(std::time::Duration::from_millis(5));
        }
        thread::sleep(std::time::Duration::from_millis(20));
        outbound.shutdown();

        let (sent, out) = writer.join().unwrap().unwrap();
        assert_eq!(sent, 2);
        let mut expected = verack.into_bytes();
        expected.extend(getaddr.into_bytes());
        assert_eq!(out, expected);
    }

    #[test]
    fn close_releases_a_parked_rx_thread() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let stream = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (_peer, _) = listener.accept().unwrap();

        let queues = SessionQueues::new(4, 4);
        let rx = {
            let mut reader = stream.try_clone().unwrap();
            let queues = queues.clone();
            thread::spawn(move || rx_loop(&mut reader, MAINNET_MAGIC, &queues.inbound))
        };

        thread::sleep(std::time::Duration::from_millis(50));
        assert!(!rx.is_finished());

        close(&stream, &queues);

        // The read fails or sees EOF once the socket is shut down.
        assert!(rx.join().unwrap().is_err());
        assert!(queues.inbound.is_shutdown());
        assert!(queues.outbound.is_shutdown());
    }

    #[test]
    fn resolve_rejects_garbage() {
        assert!(matches!(resolve("not an address"), Err(Error::Resolve(_))));
        assert_eq!(
            resolve("127.0.0.1:8333").unwrap(),
            "127.0.0.1:8333".parse::<SocketAddr>().unwrap()
        );
    }
}
