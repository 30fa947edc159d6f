use log::debug;
use std::net::{IpAddr, ToSocketAddrs};

/// Source of the reporting host's name and addresses
#[cfg_attr(test, mockall::automock)]
pub trait HostResolver: Send + Sync {
    /// Name of this host, if it can be determined
    fn hostname(&self) -> Option<String>;

    /// Addresses this host's name resolves to, in resolver order
    fn addresses(&self) -> Vec<IpAddr>;
}

/// Resolver backed by the operating system
///
/// The hostname comes from `gethostname(2)`; addresses come from resolving
/// that name through the system resolver.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl HostResolver for SystemResolver {
    #[cfg(unix)]
    fn hostname(&self) -> Option<String> {
        let mut buffer = [0u8; 256];
        // SAFETY: the pointer and length describe a valid, writable buffer.
        let result =
            unsafe { libc::gethostname(buffer.as_mut_ptr() as *mut libc::c_char, buffer.len()) };
        if result != 0 {
            debug!("gethostname failed: {}", std::io::Error::last_os_error());
            return None;
        }

        let end = buffer.iter().position(|&b| b == 0).unwrap_or(buffer.len());
        non_empty(String::from_utf8_lossy(&buffer[..end]).trim())
    }

    #[cfg(not(unix))]
    fn hostname(&self) -> Option<String> {
        std::env::var("COMPUTERNAME")
            .ok()
            .and_then(|name| non_empty(name.trim()))
    }

    fn addresses(&self) -> Vec<IpAddr> {
        let Some(hostname) = self.hostname() else {
            return Vec::new();
        };

        match (hostname.as_str(), 0).to_socket_addrs() {
            Ok(addrs) => addrs.map(|addr| addr.ip()).collect(),
            Err(e) => {
                debug!("Could not resolve host '{}': {}", hostname, e);
                Vec::new()
            }
        }
    }
}

fn non_empty(name: &str) -> Option<String> {
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Pick the address to report: the first IPv4 address, else the first IPv6
pub fn select_address(addresses: &[IpAddr]) -> Option<IpAddr> {
    addresses
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addresses.iter().find(|addr| addr.is_ipv6()))
        .copied()
}
