/// Lazy implementation of the [`crate::link::NetworkLink`] trait
/// provides interface to NetworkManager via the nmcli CLI process
use std::process::{Child, Command, Stdio};

use crate::link::{Credentials, LinkError, LinkStatus, NetworkLink};

// NetworkManager NMDeviceState values
const NM_DEVICE_STATE_PREPARE: u32 = 40;
const NM_DEVICE_STATE_SECONDARIES: u32 = 90;
const NM_DEVICE_STATE_ACTIVATED: u32 = 100;

pub struct NmcliLink {
    interface: String,
    /// In-flight `nmcli device wifi connect`, if any
    connect: Option<Child>,
}

impl NmcliLink {
    pub fn new(interface: &str) -> Self {
        Self {
            interface: interface.to_string(),
            connect: None,
        }
    }

    fn get_device_state_from_cli(&self) -> Result<u32, LinkError> {
        let resp = Command::new("nmcli")
            .args(["-t", "-g", "GENERAL.STATE", "device", "show", &self.interface])
            .output()?;

        if resp.status.success() {
            NmcliLink::parse_device_state(std::str::from_utf8(&resp.stdout)?)
        } else {
            Err(LinkError::Cli(format!(
                "Failed CLI Command: exit status {:?}",
                resp.status
            )))
        }
    }

    /// Accepts both the terse `100 (connected)` form and the
    /// `GENERAL.STATE:100 (connected)` form
    fn parse_device_state(res: &str) -> Result<u32, LinkError> {
        let res = res.trim().trim_start_matches("GENERAL.STATE:");
        res.split_whitespace()
            .next()
            .and_then(|code| code.parse::<u32>().ok())
            .ok_or_else(|| LinkError::Cli(format!("Unexpected device state '{res}'")))
    }

    fn status_from_state(state: u32) -> LinkStatus {
        match state {
            NM_DEVICE_STATE_ACTIVATED => LinkStatus::Up,
            NM_DEVICE_STATE_PREPARE..=NM_DEVICE_STATE_SECONDARIES => LinkStatus::Pending,
            _ => LinkStatus::Down,
        }
    }

    /// Reap the connect process if it finished, returning whether it is
    /// still running
    fn connect_in_progress(&mut self) -> bool {
        let running = match self.connect.as_mut().map(|child| child.try_wait()) {
            None => false,
            Some(Ok(None)) => true,
            Some(Ok(Some(exit))) => {
                if !exit.success() {
                    log::warn!("nmcli connect exited with {exit}");
                }
                false
            }
            Some(Err(e)) => {
                log::error!("Unable to wait on nmcli connect {e:}");
                false
            }
        };
        if !running {
            self.connect = None;
        }
        running
    }
}

impl NetworkLink for NmcliLink {
    fn begin(&mut self, credentials: &Credentials) -> Result<(), LinkError> {
        if let Some(mut stale) = self.connect.take() {
            stale.kill().ok();
            stale.wait().ok();
        }

        // No SSID means the interface is brought up by something else
        // (wired, or a system-managed profile); only watch it
        if credentials.ssid.is_empty() {
            log::debug!("No SSID configured, waiting on {}", self.interface);
            return Ok(());
        }

        let mut cmd = Command::new("nmcli");
        cmd.args(["device", "wifi", "connect", &credentials.ssid]);
        if !credentials.password.is_empty() {
            cmd.args(["password", &credentials.password]);
        }
        cmd.args(["ifname", &self.interface])
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        self.connect = Some(cmd.spawn()?);
        Ok(())
    }

    fn status(&mut self) -> Result<LinkStatus, LinkError> {
        let connecting = self.connect_in_progress();
        let status = NmcliLink::status_from_state(self.get_device_state_from_cli()?);

        // The device reads as disconnected until nmcli gets going
        if connecting && status == LinkStatus::Down {
            Ok(LinkStatus::Pending)
        } else {
            Ok(status)
        }
    }
}
