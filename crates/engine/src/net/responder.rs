use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::protocol::{self, ControlMessage, PROTOCOL_VERSION, TrackUpdate};

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Handshake { peer: SocketAddr, accepted: bool },
    Heartbeat { peer: SocketAddr },
    Subscribed { peer: SocketAddr, port: i32 },
    Datagram { peer: SocketAddr, size: usize },
    Update { peer: SocketAddr, update: TrackUpdate },
}

/// Minimal device side of the protocol: accepts handshakes, answers
/// heartbeats and reports every track update it receives.
pub struct DeviceResponder {
    socket: UdpSocket,
    local_addr: SocketAddr,
    peer: Option<SocketAddr>,
    reject_reason: Option<String>,
    answer_heartbeats: bool,
    running: Arc<AtomicBool>,
    recv_buffer: Vec<u8>,
}

impl DeviceResponder {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            peer: None,
            reject_reason: None,
            answer_heartbeats: true,
            running: Arc::new(AtomicBool::new(true)),
            recv_buffer: vec![0u8; 65_536],
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Refuses every handshake with `reason`; `None` accepts again.
    pub fn set_reject_reason(&mut self, reason: Option<String>) {
        self.reject_reason = reason;
    }

    /// Stops answering pings, as a hung device would.
    pub fn set_answer_heartbeats(&mut self, answer: bool) {
        self.answer_heartbeats = answer;
    }

    pub fn send_status(&self, text: &str) -> io::Result<()> {
        self.send_to_peer(ControlMessage::Status(text.to_string()))
    }

    pub fn send_error(&self, text: &str) -> io::Result<()> {
        self.send_to_peer(ControlMessage::Error(text.to_string()))
    }

    fn send_to_peer(&self, message: ControlMessage) -> io::Result<()> {
        let peer = self
            .peer
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no peer yet"))?;
        self.send(&message, peer)
    }

    fn send(&self, message: &ControlMessage, to: SocketAddr) -> io::Result<()> {
        let bytes = message
            .encode()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        self.socket.send_to(&bytes, to)?;
        Ok(())
    }

    /// Handles everything currently queued on the socket.
    pub fn poll(&mut self) -> io::Result<Vec<DeviceEvent>> {
        let mut events = Vec::new();

        loop {
            let (size, peer) = match self.socket.recv_from(&mut self.recv_buffer) {
                Ok(received) => received,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
                Err(e) => return Err(e),
            };

            let messages = match protocol::decode(&self.recv_buffer[..size]) {
                Ok(messages) => messages,
                Err(err) => {
                    log::debug!("dropping malformed datagram from {peer}: {err}");
                    continue;
                }
            };
            events.push(DeviceEvent::Datagram { peer, size });

            for message in &messages {
                if let Some(control) = ControlMessage::from_osc(message) {
                    self.handle_control(control, peer, &mut events)?;
                } else if let Some(update) = TrackUpdate::from_osc(message) {
                    events.push(DeviceEvent::Update { peer, update });
                } else {
                    log::debug!("unhandled address {} from {peer}", message.addr);
                }
            }
        }

        Ok(events)
    }

    fn handle_control(
        &mut self,
        message: ControlMessage,
        peer: SocketAddr,
        events: &mut Vec<DeviceEvent>,
    ) -> io::Result<()> {
        match message {
            ControlMessage::Hello { version, nonce } => {
                let refusal = match &self.reject_reason {
                    Some(reason) => Some(reason.clone()),
                    None if version != PROTOCOL_VERSION => {
                        Some(format!("unsupported protocol version {version}"))
                    }
                    None => None,
                };

                let accepted = refusal.is_none();
                match refusal {
                    Some(reason) => {
                        log::warn!("rejecting {peer}: {reason}");
                        self.send(&ControlMessage::Reject { reason }, peer)?;
                    }
                    None => {
                        log::info!("accepted controller {peer}");
                        self.peer = Some(peer);
                        self.send(&ControlMessage::Welcome { nonce }, peer)?;
                    }
                }
                events.push(DeviceEvent::Handshake { peer, accepted });
            }
            ControlMessage::Ping { timestamp_ms } => {
                if self.answer_heartbeats {
                    self.send(&ControlMessage::Pong { timestamp_ms }, peer)?;
                }
                events.push(DeviceEvent::Heartbeat { peer });
            }
            ControlMessage::Subscribe { port } => {
                events.push(DeviceEvent::Subscribed { peer, port });
            }
            other => log::debug!("ignoring {other:?} from {peer}"),
        }
        Ok(())
    }

    /// Polls until the running flag is cleared, handing every event to
    /// `on_event`.
    pub fn run(&mut self, mut on_event: impl FnMut(DeviceEvent)) -> io::Result<()> {
        while self.running.load(Ordering::SeqCst) {
            for event in self.poll()? {
                on_event(event);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    }
}
