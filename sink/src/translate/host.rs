//! Process-wide identity stamped on every point.

use std::env;

/// Hostname and process id, resolved once and reused for every event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    /// Hostname reported in the `host`/`hostname` tags.
    pub hostname: String,
    /// Process id reported in the `procid` field.
    pub process_id: u32,
}

impl HostInfo {
    /// Creates host info from explicit values.
    #[must_use]
    pub fn new(hostname: impl Into<String>, process_id: u32) -> Self {
        Self {
            hostname: hostname.into(),
            process_id,
        }
    }

    /// Resolves the hostname and process id of the running process.
    ///
    /// Lookup order for the hostname: `LOGFLUX_HOSTNAME`, `HOSTNAME`, the OS
    /// hostname, then `"unknown"`.
    #[must_use]
    pub fn resolve() -> Self {
        Self {
            hostname: resolve_hostname(),
            process_id: std::process::id(),
        }
    }
}

fn resolve_hostname() -> String {
    for var in ["LOGFLUX_HOSTNAME", "HOSTNAME"] {
        if let Ok(hostname) = env::var(var) {
            if !hostname.is_empty() {
                return hostname;
            }
        }
    }

    #[cfg(unix)]
    {
        match nix::unistd::gethostname() {
            Ok(name) => match name.into_string() {
                Ok(hostname) if !hostname.is_empty() => return hostname,
                Ok(_) => {}
                Err(_) => tracing::debug!("OS hostname is not valid UTF-8"),
            },
            Err(e) => tracing::debug!(error = %e, "Failed to read OS hostname"),
        }
    }

    "unknown".to_string()
}
