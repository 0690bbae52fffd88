//! The scan orchestrator: configures the digitizer, brings up the HV
//! channel, walks the voltage sequence running one bounded poll-acquire
//! loop per step, and hands back the concatenated waveform table.
//!
//! Failure policy: configuration errors abort before any HV is applied;
//! errors inside a step are downgraded to "no data for this step"; the
//! power-down commands are issued on every way out of the HV phase.

use crate::acquire::PollLoop;
use crate::bits::{clear_bit, set_bit};
use crate::config::{Conf, ScanSettings};
use crate::error::{Result, ScanError};
use crate::frame::{self, WaveformFrame};
use crate::gateway::{Digitizer, HvSupply};
use crate::ramp::RampController;
use crate::registers::{
    BIT_SELF_TRIGGER_ENABLE, BIT_TRANSPARENT_MODE, GPO_BUSY_WORD, REG_BOARD_CONFIG,
    REG_FRONT_PANEL_IO, REG_SELF_TRIGGER_ENABLE, REG_SELF_TRIGGER_THRESHOLD,
    SELF_TRIGGER_THRESHOLD_MAX,
};
use log::{error, info, warn};

/// The six scan parameters, from the config file or the CLI positionals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanParams {
    pub dc_offset: f64,
    pub self_trigger_threshold: u32,
    pub n_events: usize,
    pub low_hv: f64,
    pub high_hv: f64,
    pub n_steps: usize,
}

impl ScanParams {
    pub fn from_conf(scan: &ScanSettings) -> Self {
        Self {
            dc_offset: scan.dc_offset,
            self_trigger_threshold: scan.self_trigger_threshold,
            n_events: scan.n_events,
            low_hv: scan.low_hv,
            high_hv: scan.high_hv,
            n_steps: scan.n_steps,
        }
    }

    /// Reject bad parameters before any device is touched.
    pub fn validate(&self) -> Result<()> {
        if self.self_trigger_threshold > SELF_TRIGGER_THRESHOLD_MAX {
            return Err(ScanError::InvalidArgument(format!(
                "self-trigger threshold must be in 0..={SELF_TRIGGER_THRESHOLD_MAX}, got {}",
                self.self_trigger_threshold
            )));
        }
        if self.n_steps == 0 {
            return Err(ScanError::InvalidArgument(
                "a scan needs at least one voltage step".to_owned(),
            ));
        }
        Ok(())
    }
}

/// The evenly spaced target voltages, both endpoints included.
pub fn voltage_steps(low: f64, high: f64, n_steps: usize) -> Result<Vec<f64>> {
    match n_steps {
        0 => Err(ScanError::InvalidArgument(
            "a scan needs at least one voltage step".to_owned(),
        )),
        1 => Ok(vec![low]),
        _ => {
            let span = (high - low) / (n_steps - 1) as f64;
            Ok((0..n_steps).map(|i| low + span * i as f64).collect())
        }
    }
}

pub struct Scan<'a, D: Digitizer, H: HvSupply> {
    digitizer: &'a mut D,
    supply: &'a mut H,
    conf: &'a Conf,
    params: ScanParams,
}

impl<'a, D: Digitizer, H: HvSupply> Scan<'a, D, H> {
    pub fn new(digitizer: &'a mut D, supply: &'a mut H, conf: &'a Conf, params: ScanParams) -> Self {
        Self {
            digitizer,
            supply,
            conf,
            params,
        }
    }

    /// Run the whole scan and return the concatenated waveform table.
    pub fn run(&mut self) -> Result<WaveformFrame> {
        self.params.validate()?;
        let steps = voltage_steps(self.params.low_hv, self.params.high_hv, self.params.n_steps)?;

        self.configure_digitizer()?;
        self.apply_trigger_settings()?;

        let ramp = RampController::from_conf(&self.conf.hv);
        let outcome = self.run_with_hv(&ramp, &steps);
        // Power-down is issued no matter how the HV phase ended.
        ramp.shutdown(self.supply);

        let frames = outcome?;
        if frames.is_empty() {
            return Err(ScanError::EmptyInput);
        }
        Ok(WaveformFrame::concat(frames))
    }

    fn run_with_hv(
        &mut self,
        ramp: &RampController,
        steps: &[f64],
    ) -> Result<Vec<WaveformFrame>> {
        ramp.power_on(self.supply)?;
        info!("Ramping voltage. This will take a moment...");
        ramp.ramp_to(
            self.supply,
            self.params.low_hv,
            self.conf.hv.ramp_up_rate_vps,
        )?;
        info!("HV ready.");

        let mut frames = Vec::new();
        for &voltage in steps {
            match self.acquire_step(ramp, voltage) {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => warn!("no data at {voltage:.1} V, step skipped"),
                Err(e) => error!("step at {voltage:.1} V failed, skipping: {e}"),
            }
        }
        Ok(frames)
    }

    /// One step: ramp, read the supply monitors, run the poll loop,
    /// assemble. `Ok(None)` means the step produced nothing.
    fn acquire_step(&mut self, ramp: &RampController, voltage: f64) -> Result<Option<WaveformFrame>> {
        ramp.ramp_to(self.supply, voltage, self.conf.hv.step_ramp_rate_vps)?;
        let vmon = self
            .supply
            .get_channel_parameter("VMON", self.conf.hv.channel)?;
        let imon = self
            .supply
            .get_channel_parameter("IMON", self.conf.hv.channel)?;
        info!("voltage measured at {vmon:.1} V, drawing {imon:.3} uA");

        let poll = PollLoop::from_conf(&self.conf.acquisition, self.params.n_events);
        let outcome = poll.run(self.digitizer, voltage)?;

        match frame::assemble(&outcome.batches, voltage) {
            Ok(frame) => Ok(Some(frame)),
            Err(ScanError::EmptyInput) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn configure_digitizer(&mut self) -> Result<()> {
        let d = &self.conf.digitizer;
        self.digitizer.set_sampling_frequency(d.sampling_mhz)?;
        self.digitizer.set_record_length(d.record_length)?;
        self.digitizer
            .set_max_events_per_readout(d.max_events_per_readout)?;
        // Busy signal on GPO.
        self.digitizer
            .write_register(REG_FRONT_PANEL_IO, GPO_BUSY_WORD)?;
        self.digitizer.set_fast_trigger_digitizing(true)?;
        self.digitizer.enable_channel_group(0, true)?;
        self.digitizer.enable_channel_group(1, false)?;
        for &channel in &d.channels {
            self.digitizer.set_trigger_polarity(channel, d.polarity)?;
        }
        info!("digitizer connected with: {}", self.digitizer.idn());
        Ok(())
    }

    /// DC offset, self-trigger threshold, self-trigger enable and output
    /// mode. Register edits are read-modify-write so flags outside the
    /// targeted bit survive.
    fn apply_trigger_settings(&mut self) -> Result<()> {
        for &channel in &self.conf.digitizer.channels {
            self.digitizer
                .set_channel_parameter(channel, "DCOffset", self.params.dc_offset)?;
        }

        let old = self.digitizer.read_register(REG_SELF_TRIGGER_THRESHOLD)?;
        info!("old value of register {REG_SELF_TRIGGER_THRESHOLD:#06X}: {old:08X}");
        self.digitizer
            .write_register(REG_SELF_TRIGGER_THRESHOLD, self.params.self_trigger_threshold)?;

        let old = self.digitizer.read_register(REG_SELF_TRIGGER_ENABLE)?;
        info!("old value of register {REG_SELF_TRIGGER_ENABLE:#06X}: {old:08X}");
        let new = set_bit(old, BIT_SELF_TRIGGER_ENABLE)?;
        info!("writing {new:08X} at register {REG_SELF_TRIGGER_ENABLE:#06X}");
        self.digitizer.write_register(REG_SELF_TRIGGER_ENABLE, new)?;
        info!("self trigger enabled");

        let old = self.digitizer.read_register(REG_BOARD_CONFIG)?;
        info!("old value of register {REG_BOARD_CONFIG:#06X}: {old:08X}");
        let new = clear_bit(old, BIT_TRANSPARENT_MODE)?;
        info!("writing {new:08X} at register {REG_BOARD_CONFIG:#06X}");
        self.digitizer.write_register(REG_BOARD_CONFIG, new)?;
        info!("ready for self-triggered acquisition in output mode");

        // Override the number of events the board may buffer itself.
        self.digitizer
            .set_max_events_per_readout(self.conf.digitizer.max_events_per_readout)?;
        Ok(())
    }
}
