// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Local port probing.
//!
//! Before the compose stack is brought up, the installer checks whether the
//! requested port already has a listener on the loopback interface. A
//! successful connect means something owns the port. Refusal or timeout means
//! the port looks free.
//!
//! This is a time-of-check heuristic only. Nothing stops another process from
//! binding the port between the probe and the moment the container runtime
//! binds it.

use std::{
    net::{Ipv4Addr, SocketAddr, TcpStream},
    time::Duration,
};
use tracing::{debug, instrument};

/// Upper bound on how long a single probe may block.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Check if `127.0.0.1:port` is free to use.
pub fn is_available(port: u16) -> bool {
    is_available_with(SocketAddr::from((Ipv4Addr::LOCALHOST, port)), PROBE_TIMEOUT)
}

/// Check if target address is free to use with custom timeout.
#[instrument(level = "debug")]
pub fn is_available_with(addr: SocketAddr, timeout: Duration) -> bool {
    match TcpStream::connect_timeout(&addr, timeout) {
        Ok(_) => {
            debug!("{addr} accepted connection, port is in use");
            false
        }
        Err(error) => {
            debug!("{addr} refused connection: {error}");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn bound_port_is_in_use() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();

        assert!(!is_available(port));
    }

    #[test]
    fn closed_port_is_available() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert!(is_available(port));
    }
}
