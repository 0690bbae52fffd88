use crate::config::HvSettings;
use crate::error::{Result, ScanError};
use crate::gateway::{HvCommand, HvSupply};
use log::{info, warn};
use std::thread;
use std::time::{Duration, Instant};

/// Outcome of a ramp. A timeout is a status, not a failure; the caller
/// decides whether a stalled ramp is fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampStatus {
    Settled,
    TimedOut,
}

/// Drives the supply from its current output to a target at a bounded rate
/// and blocks until the monitored voltage settles or a deadline elapses.
pub struct RampController {
    pub channel: u32,
    pub tolerance_v: f64,
    pub settle_margin: Duration,
    pub poll_interval: Duration,
}

impl RampController {
    pub fn from_conf(hv: &HvSettings) -> Self {
        Self {
            channel: hv.channel,
            tolerance_v: hv.tolerance_v,
            settle_margin: Duration::from_secs_f64(hv.settle_margin_s),
            poll_interval: Duration::from_millis(hv.poll_interval_ms),
        }
    }

    pub fn power_on<H: HvSupply + ?Sized>(&self, supply: &mut H) -> Result<()> {
        supply.issue_command(HvCommand::On {
            channel: self.channel,
        })
    }

    /// Issue the setpoint, then poll VMON until it is within tolerance of
    /// `target` or the travel-time deadline (`|target - current| / rate`
    /// plus the settle margin) elapses.
    pub fn ramp_to<H: HvSupply + ?Sized>(
        &self,
        supply: &mut H,
        target: f64,
        rate_vps: f64,
    ) -> Result<RampStatus> {
        if rate_vps <= 0.0 {
            return Err(ScanError::InvalidArgument(format!(
                "ramp rate must be positive, got {rate_vps} V/s"
            )));
        }

        let start_v = supply.get_channel_parameter("VMON", self.channel)?;
        supply.issue_command(HvCommand::SetVoltage {
            channel: self.channel,
            volts: target,
        })?;

        let travel = Duration::from_secs_f64((target - start_v).abs() / rate_vps);
        let deadline = Instant::now() + travel + self.settle_margin;

        loop {
            let vmon = supply.get_channel_parameter("VMON", self.channel)?;
            if (vmon - target).abs() <= self.tolerance_v {
                info!("ramp settled at {vmon:.1} V (target {target:.1} V)");
                return Ok(RampStatus::Settled);
            }
            if Instant::now() >= deadline {
                warn!("ramp to {target:.1} V timed out at {vmon:.1} V");
                return Ok(RampStatus::TimedOut);
            }
            thread::sleep(self.poll_interval);
        }
    }

    /// Zero the setpoint and switch the channel off without waiting for the
    /// output to decay. The supply keeps ramping down after the process
    /// moves on (or exits); shutdown is never allowed to block.
    pub fn shutdown<H: HvSupply + ?Sized>(&self, supply: &mut H) {
        if let Err(e) = supply.issue_command(HvCommand::SetVoltage {
            channel: self.channel,
            volts: 0.0,
        }) {
            warn!("failed to zero HV setpoint: {e}");
        }
        if let Err(e) = supply.issue_command(HvCommand::Off {
            channel: self.channel,
        }) {
            warn!("failed to switch HV channel off: {e}");
        }
        info!("HV turning off...");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Supply whose output tracks the setpoint with a configurable lag.
    struct FakeSupply {
        vset: f64,
        vmon: f64,
        tracks: bool,
        commands: Vec<HvCommand>,
    }

    impl FakeSupply {
        fn new(tracks: bool) -> Self {
            Self {
                vset: 0.0,
                vmon: 0.0,
                tracks,
                commands: Vec::new(),
            }
        }
    }

    impl HvSupply for FakeSupply {
        fn idn(&self) -> String {
            "fake supply".to_owned()
        }

        fn issue_command(&mut self, command: HvCommand) -> Result<()> {
            self.commands.push(command);
            if let HvCommand::SetVoltage { volts, .. } = command {
                self.vset = volts;
                if self.tracks {
                    self.vmon = volts;
                }
            }
            Ok(())
        }

        fn get_channel_parameter(&mut self, name: &str, _channel: u32) -> Result<f64> {
            match name {
                "VMON" => Ok(self.vmon),
                "VSET" => Ok(self.vset),
                _ => Ok(0.0),
            }
        }

        fn disconnect(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn controller() -> RampController {
        RampController {
            channel: 0,
            tolerance_v: 2.0,
            settle_margin: Duration::from_millis(5),
            poll_interval: Duration::from_millis(1),
        }
    }

    #[test]
    fn tracking_supply_settles() {
        let mut supply = FakeSupply::new(true);
        let status = controller().ramp_to(&mut supply, 800.0, 1e9).unwrap();
        assert_eq!(status, RampStatus::Settled);
    }

    #[test]
    fn stuck_supply_times_out_instead_of_hanging() {
        let mut supply = FakeSupply::new(false);
        let status = controller().ramp_to(&mut supply, 800.0, 1e9).unwrap();
        assert_eq!(status, RampStatus::TimedOut);
    }

    #[test]
    fn nonpositive_rate_is_rejected() {
        let mut supply = FakeSupply::new(true);
        assert!(matches!(
            controller().ramp_to(&mut supply, 800.0, 0.0),
            Err(ScanError::InvalidArgument(_))
        ));
    }

    #[test]
    fn shutdown_issues_zero_setpoint_then_off() {
        let mut supply = FakeSupply::new(true);
        controller().shutdown(&mut supply);
        assert_eq!(
            supply.commands,
            vec![
                HvCommand::SetVoltage {
                    channel: 0,
                    volts: 0.0
                },
                HvCommand::Off { channel: 0 },
            ]
        );
    }
}
