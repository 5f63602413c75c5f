//! Free TCP port discovery by linear probing.
//!
//! Ports returned here are advisory: another process can grab one between
//! allocation and the container binding it. Callers surface that as an
//! [`EnvError::StartFailure`](crate::EnvError::StartFailure), not a panic.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};

use tracing::debug;

use crate::error::EnvError;
use crate::Result;

/// First port probed when no explicit start is configured.
pub const DEFAULT_START_PORT: u16 = 3001;

/// Probes per requested port before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u16 = 100;

/// Finds bindable TCP ports.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    host: IpAddr,
    max_attempts: u16,
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl PortAllocator {
    /// Create an allocator probing all interfaces with the given attempt bound.
    pub fn new(max_attempts: u16) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Probe a specific interface instead of `0.0.0.0`.
    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    /// Whether `port` can be bound right now.
    pub fn is_bindable(&self, port: u16) -> bool {
        TcpListener::bind(SocketAddr::new(self.host, port)).is_ok()
    }

    /// Allocate `count` distinct ports, ascending, searching upward from
    /// `starting_from`.
    ///
    /// Each port gets its own window of `max_attempts` probes starting just
    /// above the previously found port. Port 0 is never returned: binding it
    /// asks the OS for an ephemeral port, so the search starts at 1.
    pub fn allocate(&self, count: usize, starting_from: u16) -> Result<Vec<u16>> {
        let mut ports = Vec::with_capacity(count);
        let mut next = u32::from(starting_from.max(1));

        for _ in 0..count {
            let window_end = (next + u32::from(self.max_attempts) - 1).min(u32::from(u16::MAX));
            let found = (next..=window_end)
                .filter_map(|p| u16::try_from(p).ok())
                .find(|&p| self.is_bindable(p));

            match found {
                Some(port) => {
                    debug!(port, "allocated free port");
                    ports.push(port);
                    next = u32::from(port) + 1;
                }
                None => {
                    return Err(EnvError::NoFreePort {
                        needed: count,
                        start: starting_from,
                        end: window_end,
                    })
                }
            }

            if next > u32::from(u16::MAX) && ports.len() < count {
                return Err(EnvError::NoFreePort {
                    needed: count,
                    start: starting_from,
                    end: u32::from(u16::MAX),
                });
            }
        }

        Ok(ports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occupied_port() -> (TcpListener, u16) {
        let listener = TcpListener::bind(("0.0.0.0", 0)).expect("bind ephemeral");
        let port = listener.local_addr().expect("local addr").port();
        (listener, port)
    }

    #[test]
    fn test_allocate_zero_returns_empty() {
        let ports = PortAllocator::default().allocate(0, 40000).unwrap();
        assert!(ports.is_empty());
    }

    #[test]
    fn test_allocate_from_zero_never_returns_port_zero() {
        match PortAllocator::default().allocate(2, 0) {
            Ok(ports) => {
                assert_eq!(ports.len(), 2);
                assert!(!ports.contains(&0), "port 0 returned as a free port");
            }
            Err(EnvError::NoFreePort { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_allocate_skips_occupied_port() {
        let (_guard, busy) = occupied_port();
        let ports = PortAllocator::default().allocate(2, busy).unwrap();

        assert_eq!(ports.len(), 2);
        assert!(!ports.contains(&busy));
        assert!(ports[0] > busy);
        assert!(ports[1] > ports[0], "ports must be distinct and ascending");
    }

    #[test]
    fn test_exhausted_window_is_no_free_port() {
        let (_guard, busy) = occupied_port();
        let err = PortAllocator::new(1).allocate(1, busy).unwrap_err();
        match err {
            EnvError::NoFreePort { needed, start, .. } => {
                assert_eq!(needed, 1);
                assert_eq!(start, busy);
            }
            other => panic!("expected NoFreePort, got {other:?}"),
        }
    }

    #[test]
    fn test_search_stops_at_top_of_port_range() {
        let allocator = PortAllocator::default();
        let result = allocator.allocate(3, u16::MAX);
        // At most one port exists at u16::MAX, so three can never be found.
        assert!(matches!(result, Err(EnvError::NoFreePort { .. })));
    }
}
