//! Local host identity.
//!
//! The identity doubles as the STOMP `client-id` on login and as the
//! `durable-subscription-name` of every subscription.

use std::io;

/// Resolves the name this machine presents to the broker.
pub trait HostIdentity: Send + Sync {
    fn resolve(&self) -> io::Result<String>;
}

/// The machine's network name as reported by the operating system.
///
/// A non-empty `HOSTNAME` environment variable takes precedence, so a
/// container or test run can pin the name without code changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHostIdentity;

/// Environment variable that overrides the system host name.
pub const HOSTNAME_OVERRIDE: &str = "HOSTNAME";

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl HostIdentity for SystemHostIdentity {
    fn resolve(&self) -> io::Result<String> {
        if let Some(name) = std::env::var(HOSTNAME_OVERRIDE).ok().and_then(non_empty) {
            return Ok(name);
        }
        let name = gethostname::gethostname().into_string().map_err(|raw| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("host name is not valid UTF-8: {:?}", raw),
            )
        })?;
        non_empty(name)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "system host name is empty"))
    }
}

/// A fixed identity, for deployments that pin the durable name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedHostIdentity(pub String);

impl HostIdentity for FixedHostIdentity {
    fn resolve(&self) -> io::Result<String> {
        if self.0.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "host identity is empty",
            ));
        }
        Ok(self.0.clone())
    }
}
