use super::{Receiver, Sender};
use crate::Core::alloc::NUM_FIELDS;
use crate::Core::error::{Error, Result};
use crate::Transport::Strategy::{MessageLayout, Strategy, ZeroCopyProbe};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MESSAGE_SIZE: usize = 1024;
pub const DEFAULT_DURATION: Duration = Duration::from_secs(10);
pub const DEFAULT_THREADS: usize = 4;
pub const DEFAULT_MAX_CONNECTIONS: usize = 100;
pub const DEFAULT_ACCEPT_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_ALARM_GRACE: Duration = Duration::from_secs(5);

/// Split a total message size into `NUM_FIELDS` equal fields. Any remainder
/// is dropped.
pub fn layout_for(message_size: usize) -> Result<MessageLayout> {
    if message_size < NUM_FIELDS {
        return Err(Error::InvalidConfig(format!(
            "message size {message_size} is smaller than the {NUM_FIELDS} fields it is split into"
        )));
    }
    if message_size % NUM_FIELDS != 0 {
        tracing::warn!(
            message_size,
            effective = message_size / NUM_FIELDS * NUM_FIELDS,
            "message size is not a multiple of the field count, rounding down"
        );
    }
    Ok(MessageLayout {
        field_size: message_size / NUM_FIELDS,
        fields: NUM_FIELDS,
    })
}

fn check_nonzero(what: &str, value: Duration) -> Result<()> {
    if value.is_zero() {
        return Err(Error::InvalidConfig(format!("{what} must be greater than zero")));
    }
    Ok(())
}

/// A run length must be non-zero and still leave room for the alarm grace
/// period on the monotonic clock.
fn check_run_length(what: &str, value: Duration) -> Result<()> {
    check_nonzero(what, value)?;
    value
        .checked_add(DEFAULT_ALARM_GRACE)
        .and_then(|span| Instant::now().checked_add(span))
        .map(|_| ())
        .ok_or_else(|| Error::InvalidConfig(format!("{what} of {}s is too long", value.as_secs())))
}

/// Settings shared by every sending worker.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub bind_addr: SocketAddr,
    pub strategy: Strategy,
    pub layout: MessageLayout,
    /// Configured size before rounding to whole fields.
    pub message_size: usize,
    /// How long each connection transmits.
    pub duration: Duration,
    pub max_connections: usize,
    pub accept_timeout: Duration,
    pub io_timeout: Duration,
    pub zero_copy_probe: ZeroCopyProbe,
    /// How long the acceptor keeps going, if bounded.
    pub run_for: Option<Duration>,
}

impl SenderConfig {
    /// When the SIGALRM backstop should fire for a run of this length.
    pub fn alarm_after(&self) -> Duration {
        self.duration.saturating_add(DEFAULT_ALARM_GRACE)
    }
}

pub struct SenderBuilder {
    bind_ip: IpAddr,
    port: u16,
    strategy: Strategy,
    message_size: usize,
    duration: Duration,
    max_connections: usize,
    accept_timeout: Duration,
    io_timeout: Duration,
    zero_copy_probe: ZeroCopyProbe,
    run_for: Option<Duration>,
}

impl Default for SenderBuilder {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            strategy: Strategy::Naive,
            message_size: DEFAULT_MESSAGE_SIZE,
            duration: DEFAULT_DURATION,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            accept_timeout: DEFAULT_ACCEPT_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
            zero_copy_probe: ZeroCopyProbe::Kernel,
            run_for: None,
        }
    }
}

impl SenderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bind_ip(mut self, ip: IpAddr) -> Self {
        self.bind_ip = ip;
        self
    }

    /// Port 0 picks an ephemeral port; see [`Sender::local_addr`].
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_message_size(mut self, size: usize) -> Self {
        self.message_size = size;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_accept_timeout(mut self, timeout: Duration) -> Self {
        self.accept_timeout = timeout;
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn with_zero_copy_probe(mut self, probe: ZeroCopyProbe) -> Self {
        self.zero_copy_probe = probe;
        self
    }

    /// Stop accepting after `window`, as if shutdown had been requested.
    pub fn with_run_for(mut self, window: Duration) -> Self {
        self.run_for = Some(window);
        self
    }

    pub fn config(&self) -> Result<SenderConfig> {
        if self.max_connections == 0 {
            return Err(Error::InvalidConfig("max connections must be at least 1".into()));
        }
        check_run_length("duration", self.duration)?;
        if let Some(window) = self.run_for {
            check_run_length("run window", window)?;
        }
        check_nonzero("accept timeout", self.accept_timeout)?;
        check_nonzero("io timeout", self.io_timeout)?;

        Ok(SenderConfig {
            bind_addr: SocketAddr::new(self.bind_ip, self.port),
            strategy: self.strategy,
            layout: layout_for(self.message_size)?,
            message_size: self.message_size,
            duration: self.duration,
            max_connections: self.max_connections,
            accept_timeout: self.accept_timeout,
            io_timeout: self.io_timeout,
            zero_copy_probe: self.zero_copy_probe,
            run_for: self.run_for,
        })
    }

    /// Validate, then bind and configure the listening socket.
    pub fn build(self) -> Result<Sender> {
        Sender::bind(self.config()?)
    }
}

/// Settings shared by every receiving worker.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub peer: SocketAddr,
    pub strategy: Strategy,
    pub layout: MessageLayout,
    pub message_size: usize,
    pub duration: Duration,
    pub threads: usize,
    pub io_timeout: Duration,
    pub connect_timeout: Duration,
    pub verify: bool,
}

impl ReceiverConfig {
    pub fn alarm_after(&self) -> Duration {
        self.duration.saturating_add(DEFAULT_ALARM_GRACE)
    }
}

pub struct ReceiverBuilder {
    peer_ip: IpAddr,
    port: u16,
    strategy: Strategy,
    message_size: usize,
    duration: Duration,
    threads: usize,
    io_timeout: Duration,
    connect_timeout: Duration,
    verify: bool,
}

impl Default for ReceiverBuilder {
    fn default() -> Self {
        Self {
            peer_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            strategy: Strategy::Naive,
            message_size: DEFAULT_MESSAGE_SIZE,
            duration: DEFAULT_DURATION,
            threads: DEFAULT_THREADS,
            io_timeout: DEFAULT_IO_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            verify: false,
        }
    }
}

impl ReceiverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_peer_ip(mut self, ip: IpAddr) -> Self {
        self.peer_ip = ip;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_peer(self, addr: SocketAddr) -> Self {
        self.with_peer_ip(addr.ip()).with_port(addr.port())
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_message_size(mut self, size: usize) -> Self {
        self.message_size = size;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn config(&self) -> Result<ReceiverConfig> {
        if self.threads == 0 {
            return Err(Error::InvalidConfig("thread count must be at least 1".into()));
        }
        if self.port == 0 {
            return Err(Error::InvalidConfig("peer port must not be 0".into()));
        }
        check_run_length("duration", self.duration)?;
        check_nonzero("io timeout", self.io_timeout)?;
        check_nonzero("connect timeout", self.connect_timeout)?;

        Ok(ReceiverConfig {
            peer: SocketAddr::new(self.peer_ip, self.port),
            strategy: self.strategy,
            layout: layout_for(self.message_size)?,
            message_size: self.message_size,
            duration: self.duration,
            threads: self.threads,
            io_timeout: self.io_timeout,
            connect_timeout: self.connect_timeout,
            verify: self.verify,
        })
    }

    pub fn build(self) -> Result<Receiver> {
        Ok(Receiver::new(self.config()?))
    }
}
