/// Mod for different impls for interfacing with the host network stack.
/// Currently only NetworkManager via the nmcli CLI is implemented
mod nmcli;
pub use nmcli::NmcliLink;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("I/O Error")]
    Io(#[from] std::io::Error),
    #[error("Str utf8 parse Error")]
    StrParse(#[from] std::str::Utf8Error),
    #[error("Link CLI Error {0}")]
    Cli(String),
}

/// What the network stack reports about association
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Up,
    /// Association in progress
    Pending,
    /// Not associated and nothing in progress
    Down,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub ssid: String,
    pub password: String,
}

impl core::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credentials")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Trait to allow different implementations of the link layer (network
/// association) beneath the broker session
pub trait NetworkLink {
    /// Issue a link-establish request. Must not block until associated,
    /// progress is observed through [`NetworkLink::status`]
    fn begin(&mut self, credentials: &Credentials) -> Result<(), LinkError>;
    fn status(&mut self) -> Result<LinkStatus, LinkError>;
}

#[cfg(test)]
mod tests {
    use super::Credentials;

    #[test]
    fn check_password_not_in_debug_output() {
        let creds = Credentials {
            ssid: "shed".to_string(),
            password: "hunter2".to_string(),
        };
        let out = format!("{creds:?}");
        assert!(out.contains("shed"));
        assert!(!out.contains("hunter2"));
    }
}
