//! Handshake state machine.
//!
//! The session consumes validated frames from the inbound queue and answers
//! on the outbound queue:
//!
//! | received  | stage before  | reply     | stage after   |
//! |-----------|---------------|-----------|---------------|
//! | (start)   | `Init`        | `version` | `VersionSent` |
//! | `version` | any           | `verack`  | unchanged     |
//! | `verack`  | `VersionSent` | `getaddr` | `Established` |
//! | `ping`    | any           | `pong`    | unchanged     |
//! | other     | any           | none      | unchanged     |
//!
//! https://developer.bitcoin.org/devguide/p2p_network.html#connecting-to-peers

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::config::{NodeConfig, SessionConfig};
use crate::error::{Error, Result};
use crate::fifo::Fifo;
use crate::wire::{self, Command, Decode, Frame, Ping, Pong, VersionPayload};

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    VersionSent,
    Established,
}

/// The inbound / outbound queue pair of one peer session.
///
/// Both queues belong to the session; the I/O threads hold clones of the
/// `Arc`s for as long as the connection lives.
#[derive(Debug, Clone)]
pub struct SessionQueues {
    pub inbound: Arc<Fifo<Frame>>,
    pub outbound: Arc<Fifo<Frame>>,
}

impl SessionQueues {
    pub fn new(rx_capacity: usize, tx_capacity: usize) -> Self {
        Self {
            inbound: Arc::new(Fifo::new(rx_capacity)),
            outbound: Arc::new(Fifo::new(tx_capacity)),
        }
    }

    pub fn from_config(config: &NodeConfig) -> Self {
        Self::new(config.rx_capacity, config.tx_capacity)
    }

    /// Shuts down both queues, releasing every thread blocked on them.
    pub fn shutdown(&self) {
        self.inbound.shutdown();
        self.outbound.shutdown();
    }
}

/// One peer session.
///
/// Only the thread running [`Session::run`] (or calling [`Session::handle`])
/// touches the stage, so it needs no lock.
pub struct Session {
    config: SessionConfig,
    stage: Stage,
    inbound: Arc<Fifo<Frame>>,
    outbound: Arc<Fifo<Frame>>,
}

impl Session {
    pub fn new(config: SessionConfig, queues: &SessionQueues) -> Self {
        Self {
            config,
            stage: Stage::Init,
            inbound: Arc::clone(&queues.inbound),
            outbound: Arc::clone(&queues.outbound),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn magic(&self) -> u32 {
        self.config.network.magic()
    }

    /// Opens the handshake by queueing our `version`.
    pub fn start(&mut self) -> Result<()> {
        let version = self.config.version_payload();
        debug!(nonce = version.nonce, "sending version");

        self.send(wire::build_version_message(self.magic(), &version)?)?;
        self.set_stage(Stage::VersionSent);

        Ok(())
    }

    /// Reacts to one inbound frame. Returns the command of the reply that was
    /// queued, if any.
    ///
    /// A frame whose header can't be decoded is dropped without a reply.
    ///
    /// # Errors
    ///
    /// [`Error::QueueClosed`] once the outbound queue is shut down, or an
    /// encode failure while building the reply.
    pub fn handle(&mut self, frame: &Frame) -> Result<Option<Command>> {
        let header = match frame.header() {
            Ok(header) => header,
            Err(err) => {
                debug!(%err, "dropping malformed frame");
                return Ok(None);
            }
        };
        let command = Command::from(&header.command);
        debug!(command = header.command_name(), len = header.length, "received");

        let reply = match command {
            Command::Version => {
                self.log_peer_version(frame.payload());
                Some(wire::build_verack_message(self.magic())?)
            }
            Command::Verack if self.stage == Stage::VersionSent => {
                self.set_stage(Stage::Established);
                Some(wire::build_getaddr_message(self.magic())?)
            }
            Command::Ping => match Ping::decode(frame.payload()) {
                Ok(ping) => {
                    let pong = Pong::reply_to(&ping);
                    Some(wire::build_pong_message(self.magic(), &pong)?)
                }
                Err(err) => {
                    debug!(%err, "dropping malformed ping");
                    None
                }
            },
            _ => None,
        };

        let Some(reply) = reply else {
            return Ok(None);
        };
        let reply_command = reply.command()?;
        self.send(reply)?;

        Ok(Some(reply_command))
    }

    /// Consumes the inbound queue until it is shut down or the outbound
    /// queue stops accepting replies.
    pub fn run(&mut self) -> Result<()> {
        if self.stage == Stage::Init {
            self.start()?;
        }

        while let Some(frame) = self.inbound.pop_or_wait() {
            match self.handle(&frame) {
                Ok(_) => {}
                Err(Error::QueueClosed) => break,
                Err(err) => {
                    warn!(%err, "could not reply to peer");
                    return Err(err);
                }
            }
        }

        debug!(stage = ?self.stage, "session loop finished");
        Ok(())
    }

    fn send(&self, frame: Frame) -> Result<()> {
        trace!(bytes = %hex::encode(frame.as_bytes()), "queueing frame");
        self.outbound.push_or_wait(frame).map_err(|_| Error::QueueClosed)
    }

    fn set_stage(&mut self, stage: Stage) {
        if self.stage != stage {
            info!(from = ?self.stage, to = ?stage, "handshake stage");
            self.stage = stage;
        }
    }

    fn log_peer_version(&self, payload: &[u8]) {
        match VersionPayload::decode(payload) {
            Ok(version) => info!(
                version = version.version,
                services = version.services,
                user_agent = %version.user_agent_lossy(),
                start_height = version.start_height,
                relay = version.relay,
                "peer version"
            ),
            Err(err) => debug!(%err, "could not decode peer version"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Network;
    use crate::wire::constants::REGTEST_MAGIC;

    fn session() -> (Session, SessionQueues) {
        let queues = SessionQueues::new(8, 8);
        let config = SessionConfig {
            network: Network::Regtest,
            ..SessionConfig::default()
        };
        (Session::new(config, &queues), queues)
    }

    fn frame(command: &str, payload: &[u8]) -> Frame {
        wire::build_message(REGTEST_MAGIC, command, payload).unwrap()
    }

    fn drain(queue: &Fifo<Frame>) -> Vec<Frame> {
        std::iter::from_fn(|| queue.pop()).collect()
    }

    #[test]
    fn start_queues_version() {
        let (mut session, queues) = session();

        session.start().unwrap();

        assert_eq!(session.stage(), Stage::VersionSent);
        let out = drain(&queues.outbound);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].command().unwrap(), Command::Version);
        assert_eq!(out[0].header().unwrap().magic, REGTEST_MAGIC);
        assert!(out[0].header().unwrap().validate(out[0].payload()));
    }

    #[test]
    fn version_is_answered_with_verack() {
        let (mut session, queues) = session();
        session.start().unwrap();
        drain(&queues.outbound);

        let peer_version = session.config.version_payload();
        let reply = session
            .handle(&wire::build_version_message(REGTEST_MAGIC, &peer_version).unwrap())
            .unwrap();

        assert_eq!(reply, Some(Command::Verack));
        assert_eq!(session.stage(), Stage::VersionSent);

        let out = drain(&queues.outbound);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].command().unwrap(), Command::Verack);
        assert!(out[0].payload().is_empty());
    }

    #[test]
    fn verack_after_version_sent_requests_addresses() {
        let (mut session, queues) = session();
        session.start().unwrap();
        drain(&queues.outbound);

        let reply = session.handle(&frame("verack", &[])).unwrap();

        assert_eq!(reply, Some(Command::GetAddr));
        assert_eq!(session.stage(), Stage::Established);

        let out = drain(&queues.outbound);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].command().unwrap(), Command::GetAddr);
        assert!(out[0].payload().is_empty());
    }

    #[test]
    fn verack_outside_version_sent_is_ignored() {
        let (mut session, queues) = session();

        assert_eq!(session.handle(&frame("verack", &[])).unwrap(), None);
        assert_eq!(session.stage(), Stage::Init);

        session.start().unwrap();
        session.handle(&frame("verack", &[])).unwrap();
        drain(&queues.outbound);

        assert_eq!(session.handle(&frame("verack", &[])).unwrap(), None);
        assert_eq!(session.stage(), Stage::Established);
        assert!(queues.outbound.is_empty());
    }

    #[test]
    fn ping_is_answered_with_echoed_nonce() {
        let (mut session, queues) = session();

        let reply = session
            .handle(&frame("ping", &0xABCDEF01u64.to_le_bytes()))
            .unwrap();

        assert_eq!(reply, Some(Command::Pong));
        let out = drain(&queues.outbound);
        assert_eq!(out[0].command().unwrap(), Command::Pong);
        assert_eq!(out[0].payload(), &0xABCDEF01u64.to_le_bytes());
    }

    #[test]
    fn nonce_less_ping_still_gets_a_pong() {
        let (mut session, queues) = session();

        assert_eq!(session.handle(&frame("ping", &[])).unwrap(), Some(Command::Pong));
        assert_eq!(drain(&queues.outbound)[0].payload().len(), 8);
    }

    #[test]
    fn unknown_and_uninteresting_commands_get_no_reply() {
        let (mut session, queues) = session();
        session.start().unwrap();
        drain(&queues.outbound);

        for command in ["sendheaders", "inv", "wtfmessage", "pong"] {
            assert_eq!(session.handle(&frame(command, &[1, 2, 3])).unwrap(), None);
        }

        assert!(queues.outbound.is_empty());
        assert_eq!(session.stage(), Stage::VersionSent);
    }

    #[test]
    fn truncated_frame_is_dropped() {
        let (mut session, queues) = session();

        assert_eq!(session.handle(&Frame::from(vec![1, 2, 3])).unwrap(), None);
        assert!(queues.outbound.is_empty());
        assert_eq!(session.stage(), Stage::Init);
    }

    #[test]
    fn reply_into_closed_queue_is_reported() {
        let (mut session, queues) = session();
        queues.outbound.shutdown();

        let err = session.handle(&frame("ping", &1u64.to_le_bytes())).unwrap_err();
        assert!(matches!(err, Error::QueueClosed));
    }

    #[test]
    fn run_handles_queued_frames_until_shutdown() {
        let (mut session, queues) = session();
        queues.inbound.push(frame("version", &[]));
        queues.inbound.push(frame("verack", &[]));

        let handle = {
            let queues = queues.clone();
            std::thread::spawn(move || {
                // Give run() time to drain what's queued, then stop it.
                while !queues.inbound.is_empty() {
                    std::thread::sleep(std::time::Duration::from_millis(5));
                }
                std::thread::sleep(std::time::Duration::from_millis(50));
                queues.shutdown();
            })
        };

        session.run().unwrap();
        handle.join().unwrap();

        assert_eq!(session.stage(), Stage::Established);
        let commands: Vec<_> = drain(&queues.outbound)
            .iter()
            .map(|f| f.command().unwrap())
            .collect();
        // Shutdown doesn't discard what is already queued for the tx thread.
        assert_eq!(
            commands,
            vec![Command::Version, Command::Verack, Command::GetAddr]
        );
    }
}
