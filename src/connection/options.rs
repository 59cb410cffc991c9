//! Connection configuration.

use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::{frame::DEFAULT_MAX_FRAME_SIZE, message::ResponseOptions};

/// Default port of the document database.
pub const DEFAULT_PORT: u16 = 27017;

/// Options applied to a connection at construction time.
///
/// Durations are read from millisecond integers when deserialized, and field
/// names use `camelCase`; missing fields take their defaults.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use docwire::connection::ConnectionOptions;
///
/// let options = ConnectionOptions::default()
///     .with_host("db.internal")
///     .with_socket_timeout(Duration::from_secs(10));
/// assert_eq!(options.address(), "db.internal:27017");
/// assert_eq!(options.effective_keep_alive_delay(), Duration::from_secs(5));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionOptions {
    /// Remote host name or address.
    pub host: String,
    /// Remote port.
    pub port: u16,
    /// Enable TCP keep-alive probes.
    pub keep_alive: bool,
    /// Idle time before the first keep-alive probe.
    #[serde(deserialize_with = "millis")]
    pub keep_alive_initial_delay: Duration,
    /// Upper bound on establishing the TCP connection.
    #[serde(deserialize_with = "millis")]
    pub connection_timeout: Duration,
    /// Idle timeout on the transport; zero disables it.
    #[serde(deserialize_with = "millis")]
    pub socket_timeout: Duration,
    /// Largest frame accepted from the peer, header included.
    pub max_message_size: usize,
    /// Disable Nagle's algorithm.
    pub no_delay: bool,
    /// Preferences attached to every decoded message.
    #[serde(flatten)]
    pub response: ResponseOptions,
}

fn millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: DEFAULT_PORT,
            keep_alive: true,
            keep_alive_initial_delay: Duration::from_millis(300_000),
            connection_timeout: Duration::from_millis(30_000),
            socket_timeout: Duration::from_millis(360_000),
            max_message_size: DEFAULT_MAX_FRAME_SIZE,
            no_delay: true,
            response: ResponseOptions::default(),
        }
    }
}

impl ConnectionOptions {
    /// Set the remote host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the remote port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enable or disable TCP keep-alive.
    #[must_use]
    pub fn with_keep_alive(mut self, enabled: bool) -> Self {
        self.keep_alive = enabled;
        self
    }

    /// Set the keep-alive initial delay before clamping.
    #[must_use]
    pub fn with_keep_alive_initial_delay(mut self, delay: Duration) -> Self {
        self.keep_alive_initial_delay = delay;
        self
    }

    /// Set the connection establishment timeout.
    #[must_use]
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the idle socket timeout; zero disables it.
    #[must_use]
    pub fn with_socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = timeout;
        self
    }

    /// Set the frame size ceiling.
    #[must_use]
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Enable or disable `TCP_NODELAY`.
    #[must_use]
    pub fn with_no_delay(mut self, enabled: bool) -> Self {
        self.no_delay = enabled;
        self
    }

    /// Replace the response decoding preferences.
    #[must_use]
    pub fn with_response_options(mut self, response: ResponseOptions) -> Self {
        self.response = response;
        self
    }

    /// Remote endpoint rendered as `host:port`.
    #[must_use]
    pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

    /// Keep-alive delay after clamping to half the socket timeout.
    ///
    /// A disabled socket timeout leaves the delay untouched.
    #[must_use]
    pub fn effective_keep_alive_delay(&self) -> Duration {
        if self.socket_timeout.is_zero() {
            return self.keep_alive_initial_delay;
        }
        self.keep_alive_initial_delay.min(self.socket_timeout / 2)
    }

    /// Idle timeout to arm on the transport, if any.
    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> {
        Some(self.socket_timeout).filter(|timeout| !timeout.is_zero())
    }
}
