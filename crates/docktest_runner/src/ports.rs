//! Host port helpers.

use std::net::{Ipv4Addr, TcpListener};

use crate::error::RunnerResult;

/// Ask the OS for a currently free TCP port on the host.
///
/// The port is released before returning, so another process may grab it
/// before the container publishes it.
pub fn free_host_port() -> RunnerResult<u16> {
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    Ok(listener.local_addr()?.port())
}
