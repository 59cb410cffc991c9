//! TCP socket configuration applied before connecting.

use std::{io, time::Duration};

use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpSocket;

use super::ConnectionOptions;

/// Socket options derived from [`ConnectionOptions`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use docwire::connection::{ConnectionOptions, SocketOptions};
///
/// let options = ConnectionOptions::default().with_socket_timeout(Duration::from_secs(60));
/// let socket = SocketOptions::from_options(&options);
/// assert_eq!(socket.keepalive_delay(), Some(Duration::from_secs(30)));
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SocketOptions {
    nodelay: Option<bool>,
    keepalive: Option<KeepAliveSetting>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum KeepAliveSetting {
    Disabled,
    Duration(Duration),
}

impl KeepAliveSetting {
    const fn to_option(self) -> Option<Duration> {
        match self {
            Self::Disabled => None,
            Self::Duration(value) => Some(value),
        }
    }
}

impl SocketOptions {
    /// Derive socket options from connection options, clamping the keep-alive
    /// delay to half the socket timeout.
    #[must_use]
    pub fn from_options(options: &ConnectionOptions) -> Self {
        let keepalive = options
            .keep_alive
            .then(|| options.effective_keep_alive_delay());
        Self::default()
            .nodelay(options.no_delay)
            .keepalive(keepalive)
    }

    /// Configure `TCP_NODELAY` behaviour on the socket.
    #[must_use]
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.nodelay = Some(enabled);
        self
    }

    /// Configure `SO_KEEPALIVE` behaviour on the socket.
    ///
    /// `None` disables keep-alive probes.
    #[must_use]
    pub fn keepalive(mut self, duration: Option<Duration>) -> Self {
        self.keepalive = Some(match duration {
            Some(value) => KeepAliveSetting::Duration(value),
            None => KeepAliveSetting::Disabled,
        });
        self
    }

    /// Keep-alive idle time that will be applied, if enabled.
    #[must_use]
    pub fn keepalive_delay(&self) -> Option<Duration> {
        self.keepalive.and_then(KeepAliveSetting::to_option)
    }

    pub(crate) fn apply(&self, socket: &TcpSocket) -> io::Result<()> {
        self.apply_nodelay(socket)?;
        self.apply_keepalive(socket)?;
        Ok(())
    }

    fn apply_nodelay(&self, socket: &TcpSocket) -> io::Result<()> {
        if let Some(enabled) = self.nodelay {
            socket.set_nodelay(enabled)?;
        }
        Ok(())
    }

    fn apply_keepalive(&self, socket: &TcpSocket) -> io::Result<()> {
        if let Some(keepalive) = self.keepalive {
            match keepalive.to_option() {
                Some(duration) => {
                    socket.set_keepalive(true)?;
                    let sock_ref = SockRef::from(socket);
                    let config = TcpKeepalive::new().with_time(duration);
                    sock_ref.set_tcp_keepalive(&config)?;
                }
                None => {
                    socket.set_keepalive(false)?;
                }
            }
        }
        Ok(())
    }
}
