use std::collections::VecDeque;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Instant;

use crate::config::EngineConfig;
use crate::error::TransportError;
use crate::event::{DropReason, EngineEvent};
use crate::health::LinkHealth;

use super::backoff::Backoff;
use super::protocol::{self, ControlMessage, PROTOCOL_VERSION};
use super::stats::LinkMetrics;

const RECV_BUFFER_SIZE: usize = 65_536;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Recovering,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Recovering => "recovering",
        }
    }
}

/// The single datagram connection to the device.
///
/// Nothing here blocks: the owner calls [`DeviceLink::poll`] once per tick
/// to drain the socket and run handshake, heartbeat and subscription timers.
pub struct DeviceLink {
    config: EngineConfig,
    socket: Option<UdpSocket>,
    remote: Option<SocketAddr>,
    state: ConnectionState,
    backoff: Backoff,
    nonce: i64,
    attempt: u32,
    retry_count: u32,
    handshake_deadline: Option<Instant>,
    next_attempt: Option<Instant>,
    next_heartbeat: Option<Instant>,
    next_subscription: Option<Instant>,
    outstanding_ping: Option<(i64, Instant)>,
    missed_heartbeats: u32,
    queue: VecDeque<Vec<Vec<u8>>>,
    metrics: LinkMetrics,
    epoch: Instant,
    recv_buffer: Vec<u8>,
    pending_events: VecDeque<EngineEvent>,
    established: bool,
}

impl DeviceLink {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            backoff: Backoff::new(config.backoff_initial, config.backoff_max),
            metrics: LinkMetrics::new(config.error_window),
            queue: VecDeque::with_capacity(config.recovery_queue_depth),
            config: config.clone(),
            socket: None,
            remote: None,
            state: ConnectionState::Disconnected,
            nonce: 0,
            attempt: 0,
            retry_count: 0,
            handshake_deadline: None,
            next_attempt: None,
            next_heartbeat: None,
            next_subscription: None,
            outstanding_ping: None,
            missed_heartbeats: 0,
            epoch: Instant::now(),
            recv_buffer: vec![0u8; RECV_BUFFER_SIZE],
            pending_events: VecDeque::new(),
            established: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn remote(&self) -> Option<SocketAddr> {
        self.remote
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    pub fn metrics(&self) -> &LinkMetrics {
        &self.metrics
    }

    pub fn queued_batches(&self) -> usize {
        self.queue.len()
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = EngineEvent> + '_ {
        self.pending_events.drain(..)
    }

    /// True once after every successful handshake.
    pub fn take_established(&mut self) -> bool {
        std::mem::take(&mut self.established)
    }

    pub fn health(&self) -> LinkHealth {
        LinkHealth {
            state: self.state,
            remote: self.remote,
            local_port: self.local_addr().map(|a| a.port()),
            latency: self.metrics.latency(),
            latency_variance: self.metrics.latency_variance(),
            error_rate: self.metrics.error_rate(),
            error_count: self.metrics.error_count,
            last_exchange: self.metrics.last_exchange,
            retry_count: self.retry_count,
            messages_sent: self.metrics.messages_sent,
            bytes_sent: self.metrics.bytes_sent,
            queued_batches: self.queue.len(),
            dropped_batches: self.metrics.dropped_batches,
        }
    }

    /// Opens a fresh socket to `remote` and starts the handshake. Retries
    /// continue from [`DeviceLink::poll`] until success or
    /// [`DeviceLink::disconnect`].
    pub fn connect(&mut self, remote: SocketAddr, now: Instant) -> Result<(), TransportError> {
        self.close();

        let bind: SocketAddr = match remote {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, self.config.local_port).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, self.config.local_port).into(),
        };
        let socket = UdpSocket::bind(bind)?;
        socket.connect(remote)?;
        socket.set_nonblocking(true)?;

        log::info!(
            "connecting to device at {} from {}",
            remote,
            socket.local_addr()?
        );

        self.socket = Some(socket);
        self.remote = Some(remote);
        self.backoff.reset();
        self.attempt = 0;
        self.retry_count = 0;
        self.set_state(ConnectionState::Connecting);
        self.send_hello(now);
        Ok(())
    }

    /// Closes the socket without flushing anything queued.
    pub fn disconnect(&mut self) {
        if self.state != ConnectionState::Disconnected {
            log::info!("disconnecting from {:?}", self.remote);
        }
        self.close();
        self.set_state(ConnectionState::Disconnected);
    }

    fn close(&mut self) {
        self.socket = None;
        self.queue.clear();
        self.handshake_deadline = None;
        self.next_attempt = None;
        self.next_heartbeat = None;
        self.next_subscription = None;
        self.outstanding_ping = None;
        self.missed_heartbeats = 0;
    }

    /// Hands one batch of encoded datagrams to the device. Never blocks and
    /// never fails: outcomes land in the metrics and the event queue.
    pub fn send_batch(&mut self, datagrams: Vec<Vec<u8>>) {
        if datagrams.is_empty() {
            return;
        }

        match self.state {
            ConnectionState::Connected => self.transmit_batch(&datagrams),
            ConnectionState::Recovering => {
                if self.queue.len() >= self.config.recovery_queue_depth {
                    self.queue.pop_front();
                    self.drop_batch(DropReason::QueueFull);
                }
                if self.config.recovery_queue_depth > 0 {
                    self.queue.push_back(datagrams);
                }
            }
            ConnectionState::Disconnected | ConnectionState::Connecting => {
                self.metrics.record_error();
            }
        }
    }

    fn transmit_batch(&mut self, datagrams: &[Vec<u8>]) {
        let mut failure = None;
        for datagram in datagrams {
            if let Err(reason) = self.transmit(datagram) {
                failure.get_or_insert(reason);
            }
        }
        if let Some(reason) = failure {
            self.drop_batch(reason);
        }
    }

    fn transmit(&mut self, datagram: &[u8]) -> Result<(), DropReason> {
        if datagram.len() > self.config.max_datagram_size {
            self.metrics.record_error();
            let err = TransportError::MessageTooLarge {
                size: datagram.len(),
                limit: self.config.max_datagram_size,
            };
            log::warn!("{err}");
            return Err(DropReason::MessageTooLarge);
        }

        let Some(socket) = &self.socket else {
            self.metrics.record_error();
            return Err(DropReason::SendFailed);
        };

        match socket.send(datagram) {
            Ok(bytes) => {
                self.metrics.record_sent(bytes);
                log::trace!("sent {bytes} byte datagram");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.metrics.record_error();
                Err(DropReason::WouldBlock)
            }
            Err(e) => {
                self.metrics.record_error();
                log::debug!("datagram send failed: {e}");
                Err(DropReason::SendFailed)
            }
        }
    }

    fn drop_batch(&mut self, reason: DropReason) {
        self.metrics.record_dropped_batch();
        self.pending_events
            .push_back(EngineEvent::BatchDropped { reason });
    }

    fn send_control(&mut self, message: ControlMessage) -> Result<(), TransportError> {
        let socket = self.socket.as_ref().ok_or(TransportError::NotConnected)?;
        let bytes = message.encode()?;
        let sent = socket.send(&bytes)?;
        self.metrics.record_sent(sent);
        Ok(())
    }

    fn send_hello(&mut self, now: Instant) {
        self.nonce = rand::random::<i64>();
        self.attempt += 1;
        self.next_attempt = None;

        let hello = ControlMessage::Hello {
            version: PROTOCOL_VERSION,
            nonce: self.nonce,
        };
        match self.send_control(hello) {
            Ok(()) => {
                log::debug!("handshake attempt {} sent", self.attempt);
                self.handshake_deadline = Some(now + self.config.handshake_timeout);
            }
            Err(err) => self.fail_attempt(err, now),
        }
    }

    fn fail_attempt(&mut self, err: TransportError, now: Instant) {
        let delay = self.backoff.next_delay();
        self.handshake_deadline = None;
        self.next_attempt = Some(now + delay);
        self.retry_count = self.retry_count.saturating_add(1);
        self.metrics.record_error();

        log::warn!("connection attempt {} failed: {err}; retrying in {delay:?}", self.attempt);
        self.pending_events
            .push_back(EngineEvent::ConnectionFailed {
                kind: err.kind(),
                message: err.to_string(),
                retry_in: delay,
            });
    }

    fn set_state(&mut self, to: ConnectionState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        log::info!("device link {} -> {}", from.as_str(), to.as_str());
        self.pending_events
            .push_back(EngineEvent::ConnectionStateChanged { from, to });
    }

    /// Drains incoming datagrams and runs due timers.
    pub fn poll(&mut self, now: Instant) {
        if self.socket.is_none() {
            return;
        }

        self.receive(now);

        match self.state {
            ConnectionState::Connecting | ConnectionState::Recovering => self.poll_handshake(now),
            ConnectionState::Connected => self.poll_connected(now),
            ConnectionState::Disconnected => {}
        }
    }

    fn receive(&mut self, now: Instant) {
        loop {
            let Some(socket) = &self.socket else {
                return;
            };
            let size = match socket.recv(&mut self.recv_buffer) {
                Ok(size) => size,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    // ICMP unreachable and friends surface here on a
                    // connected socket; the heartbeat decides what it means.
                    log::debug!("receive failed: {e}");
                    self.metrics.record_error();
                    return;
                }
            };

            let messages = match protocol::decode(&self.recv_buffer[..size]) {
                Ok(messages) => messages,
                Err(err) => {
                    log::debug!("ignoring datagram: {err}");
                    continue;
                }
            };

            self.metrics.record_received(size, now);
            for message in &messages {
                if let Some(control) = ControlMessage::from_osc(message) {
                    self.handle_control(control, now);
                }
            }
        }
    }

    fn handle_control(&mut self, message: ControlMessage, now: Instant) {
        let handshaking = matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Recovering
        );

        match message {
            ControlMessage::Welcome { nonce } if handshaking && nonce == self.nonce => {
                self.establish(now);
            }
            ControlMessage::Reject { reason } if handshaking && self.handshake_deadline.is_some() => {
                self.fail_attempt(TransportError::HandshakeRejected(reason), now);
            }
            ControlMessage::Pong { timestamp_ms } => {
                self.missed_heartbeats = 0;
                if let Some((sent_ts, sent_at)) = self.outstanding_ping {
                    if sent_ts == timestamp_ms {
                        self.metrics.record_rtt(now.saturating_duration_since(sent_at));
                        self.outstanding_ping = None;
                    }
                }
            }
            ControlMessage::Ping { timestamp_ms } => {
                if let Err(err) = self.send_control(ControlMessage::Pong { timestamp_ms }) {
                    log::debug!("pong failed: {err}");
                }
            }
            ControlMessage::Status(message) => {
                log::info!("device status: {message}");
                self.pending_events.push_back(EngineEvent::DeviceStatus {
                    error: false,
                    message,
                });
            }
            ControlMessage::Error(message) => {
                log::warn!("device error: {message}");
                self.pending_events.push_back(EngineEvent::DeviceStatus {
                    error: true,
                    message,
                });
            }
            other => log::debug!("unexpected {other:?} while {}", self.state.as_str()),
        }
    }

    fn establish(&mut self, now: Instant) {
        self.backoff.reset();
        self.attempt = 0;
        self.retry_count = 0;
        self.handshake_deadline = None;
        self.next_attempt = None;
        self.outstanding_ping = None;
        self.missed_heartbeats = 0;
        self.next_heartbeat = Some(now + self.config.heartbeat_interval);
        self.next_subscription = Some(now);
        self.established = true;
        self.set_state(ConnectionState::Connected);

        let queued: Vec<_> = self.queue.drain(..).collect();
        if !queued.is_empty() {
            log::debug!("flushing {} queued batches", queued.len());
        }
        for batch in queued {
            self.transmit_batch(&batch);
        }
    }

    fn poll_handshake(&mut self, now: Instant) {
        if let Some(deadline) = self.handshake_deadline {
            if now >= deadline {
                let err = TransportError::ConnectionTimeout {
                    attempt: self.attempt,
                    timeout: self.config.handshake_timeout,
                };
                self.fail_attempt(err, now);
            }
        } else if self.next_attempt.is_some_and(|at| now >= at) {
            self.send_hello(now);
        }
    }

    fn poll_connected(&mut self, now: Instant) {
        if self.next_heartbeat.is_some_and(|at| now >= at) {
            if self.outstanding_ping.is_some() {
                self.missed_heartbeats += 1;
                log::debug!("missed heartbeat {}", self.missed_heartbeats);
            }

            if self.missed_heartbeats >= self.config.missed_heartbeats.max(1) {
                self.recover(now);
                return;
            }

            let timestamp_ms = now.saturating_duration_since(self.epoch).as_millis() as i64;
            match self.send_control(ControlMessage::Ping { timestamp_ms }) {
                Ok(()) => self.outstanding_ping = Some((timestamp_ms, now)),
                Err(err) => {
                    log::debug!("heartbeat failed: {err}");
                    self.outstanding_ping.get_or_insert((timestamp_ms, now));
                }
            }
            self.next_heartbeat = Some(now + self.config.heartbeat_interval);
        }

        if self.next_subscription.is_some_and(|at| now >= at) {
            let port = self.local_addr().map_or(0, |a| i32::from(a.port()));
            if let Err(err) = self.send_control(ControlMessage::Subscribe { port }) {
                log::debug!("subscription refresh failed: {err}");
            }
            self.next_subscription = Some(now + self.config.subscription_interval);
        }
    }

    fn recover(&mut self, now: Instant) {
        log::warn!(
            "device at {:?} missed {} heartbeats",
            self.remote,
            self.missed_heartbeats
        );
        self.outstanding_ping = None;
        self.missed_heartbeats = 0;
        self.next_heartbeat = None;
        self.next_subscription = None;
        self.backoff.reset();
        self.attempt = 0;
        self.set_state(ConnectionState::Recovering);
        self.send_hello(now);
    }
}
