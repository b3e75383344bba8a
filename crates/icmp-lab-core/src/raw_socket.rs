use crate::error::TransportError;
use crate::interface::{IcmpTransport, Received};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::ErrorKind;
use std::mem::MaybeUninit;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Read timeouts below this are rounded up; a zero timeout means "block forever" to the OS.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Raw IPv4 ICMP socket. Inbound datagrams include the IPv4 header.
pub struct RawSocketTransport {
    socket: Option<Socket>,
}

impl RawSocketTransport {
    pub fn open() -> Result<Self, TransportError> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)).map_err(
            |e| match e.kind() {
                ErrorKind::PermissionDenied => TransportError::Permission(e),
                _ => TransportError::Resource(e),
            },
        )?;
        debug!("Opened raw ICMP socket");
        Ok(Self {
            socket: Some(socket),
        })
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    fn socket(&self) -> Result<&Socket, TransportError> {
        self.socket.as_ref().ok_or(TransportError::Closed)
    }
}

impl IcmpTransport for RawSocketTransport {
    fn send(&mut self, destination: Ipv4Addr, packet: &[u8]) -> Result<(), TransportError> {
        let addr = SockAddr::from(SocketAddrV4::new(destination, 0));
        self.socket()?
            .send_to(packet, &addr)
            .map_err(|source| TransportError::Transmit {
                destination,
                source,
            })?;
        trace!("Sent {} bytes to {}", packet.len(), destination);
        Ok(())
    }

    fn poll_receive(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<Received, TransportError> {
        let socket = self.socket()?;
        let deadline = Instant::now() + timeout;

        // SAFETY: `recv_from` only writes initialized bytes into the slice and
        // reports how many; `u8` and `MaybeUninit<u8>` share layout.
        let uninit = unsafe { &mut *(buf as *mut [u8] as *mut [MaybeUninit<u8>]) };

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Received::Timeout);
            }
            socket
                .set_read_timeout(Some(remaining.max(MIN_READ_TIMEOUT)))
                .map_err(TransportError::Receive)?;

            match socket.recv_from(uninit) {
                Ok((len, addr)) => {
                    let source = addr
                        .as_socket_ipv4()
                        .map(|a| *a.ip())
                        .unwrap_or(Ipv4Addr::UNSPECIFIED);
                    return Ok(Received::Datagram { len, source });
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(Received::Timeout);
                }
                // A signal landed mid-read; retry with what is left of the budget
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::Receive(e)),
            }
        }
    }

    fn close(&mut self) {
        if let Some(socket) = self.socket.take() {
            debug!("Closing raw ICMP socket");
            drop(socket);
        }
    }
}

impl Drop for RawSocketTransport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Raw sockets need privileges; these tests pass vacuously without them.
    fn try_open() -> Option<RawSocketTransport> {
        match RawSocketTransport::open() {
            Ok(transport) => Some(transport),
            Err(e) => {
                eprintln!("skipping raw socket test: {e}");
                None
            }
        }
    }

    #[test]
    fn poll_receive_respects_timeout() {
        let Some(mut transport) = try_open() else {
            return;
        };
        let mut buf = [0u8; 1500];
        let timeout = Duration::from_millis(100);

        let start = Instant::now();
        let result = transport.poll_receive(&mut buf, timeout);
        assert!(result.is_ok());
        assert!(start.elapsed() < timeout + Duration::from_millis(50));
    }

    #[test]
    fn close_is_idempotent() {
        let Some(mut transport) = try_open() else {
            return;
        };
        transport.close();
        transport.close();
        assert!(!transport.is_open());

        let mut buf = [0u8; 64];
        assert!(matches!(
            transport.poll_receive(&mut buf, Duration::from_millis(1)),
            Err(TransportError::Closed)
        ));
        assert!(matches!(
            transport.send(Ipv4Addr::LOCALHOST, &[8, 0, 0, 0]),
            Err(TransportError::Closed)
        ));
    }
}
