use crate::error::TransportError;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Outcome of a single bounded receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// `len` bytes (IPv4 header included) were written to the buffer
    Datagram { len: usize, source: Ipv4Addr },
    /// Nothing arrived before the timeout
    Timeout,
}

/// The network endpoint the exchange engine talks through.
///
/// The raw socket implementation lives in [`crate::raw_socket`]; tests and
/// scenario runs plug in a simulated link instead.
pub trait IcmpTransport {
    /// Send one ICMP message (no IPv4 header) to `destination`.
    fn send(&mut self, destination: Ipv4Addr, packet: &[u8]) -> Result<(), TransportError>;

    /// Wait at most `timeout` for one inbound datagram.
    /// Implementations must not block past the timeout.
    fn poll_receive(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<Received, TransportError>;

    /// Release the endpoint. Calling it again is a no-op.
    fn close(&mut self);
}

impl<T: IcmpTransport + ?Sized> IcmpTransport for Box<T> {
    fn send(&mut self, destination: Ipv4Addr, packet: &[u8]) -> Result<(), TransportError> {
        (**self).send(destination, packet)
    }

    fn poll_receive(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<Received, TransportError> {
        (**self).poll_receive(buf, timeout)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

impl<T: IcmpTransport + ?Sized> IcmpTransport for &mut T {
    fn send(&mut self, destination: Ipv4Addr, packet: &[u8]) -> Result<(), TransportError> {
        (**self).send(destination, packet)
    }

    fn poll_receive(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<Received, TransportError> {
        (**self).poll_receive(buf, timeout)
    }

    fn close(&mut self) {
        (**self).close()
    }
}
