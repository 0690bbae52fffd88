use confique::Config;
use serde::Deserialize;

#[derive(Config, Debug, Clone)]
pub struct Conf {
    #[config(nested)]
    pub run: RunSettings,
    #[config(nested)]
    pub scan: ScanSettings,
    #[config(nested)]
    pub digitizer: DigitizerSettings,
    #[config(nested)]
    pub hv: HvSettings,
    #[config(nested)]
    pub acquisition: AcqSettings,
    #[config(nested)]
    pub analysis: AnalysisSettings,
    #[config(nested)]
    pub sim: SimSettings,
}

#[derive(Config, Debug, Clone)]
pub struct RunSettings {
    #[config(default = "out")]
    pub output_dir: String,
}

/// Scan parameters. Each field can be overridden by the matching CLI
/// positional argument.
#[derive(Config, Debug, Clone)]
pub struct ScanSettings {
    #[config(default = -0.3)]
    pub dc_offset: f64,
    /// Raw ADC counts, 0..=4095.
    #[config(default = 256)]
    pub self_trigger_threshold: u32,
    /// Minimum events to collect at each voltage step.
    #[config(default = 1000)]
    pub n_events: usize,
    #[config(default = 800.0)]
    pub low_hv: f64,
    #[config(default = 1000.0)]
    pub high_hv: f64,
    /// Number of voltage points, both endpoints included.
    #[config(default = 10)]
    pub n_steps: usize,
}

#[derive(Config, Debug, Clone)]
pub struct DigitizerSettings {
    #[config(default = 0)]
    pub link_num: usize,
    #[config(default = 2500)]
    pub sampling_mhz: u32,
    /// Samples per captured waveform.
    #[config(default = 1024)]
    pub record_length: usize,
    /// Events the board may buffer per readout transfer.
    #[config(default = 1024)]
    pub max_events_per_readout: usize,
    #[config(default = [0])]
    pub channels: Vec<u32>,
    #[config(default = "Fall")]
    pub polarity: TriggerEdge,
}

#[derive(Config, Debug, Clone)]
pub struct HvSettings {
    #[config(default = 0)]
    pub channel: u32,
    /// Rate for the initial ramp to the scan's low bound, in V/s.
    #[config(default = 50.0)]
    pub ramp_up_rate_vps: f64,
    /// Rate for the smaller ramps between steps, in V/s.
    #[config(default = 15.0)]
    pub step_ramp_rate_vps: f64,
    /// A ramp counts as settled when VMON is within this of the target.
    #[config(default = 2.0)]
    pub tolerance_v: f64,
    /// Grace added on top of the travel-time deadline.
    #[config(default = 30.0)]
    pub settle_margin_s: f64,
    #[config(default = 500)]
    pub poll_interval_ms: u64,
}

#[derive(Config, Debug, Clone)]
pub struct AcqSettings {
    /// Sleep between event readout polls.
    #[config(default = 500)]
    pub poll_interval_ms: u64,
    /// A step's deadline is `n_events` times this budget.
    #[config(default = 1.0)]
    pub per_event_timeout_s: f64,
}

#[derive(Config, Debug, Clone)]
pub struct AnalysisSettings {
    #[config(default = true)]
    pub write_gain_summary: bool,
    /// Channel integrated for the gain summary.
    #[config(default = 0)]
    pub channel: u32,
    /// Sample window used for the pedestal baseline.
    #[config(default = 10)]
    pub pedestal_start: usize,
    #[config(default = 210)]
    pub pedestal_end: usize,
    #[config(default = 50.0)]
    pub input_impedance_ohms: f64,
}

/// Behavior of the in-process simulator gateways.
#[derive(Config, Debug, Clone)]
pub struct SimSettings {
    #[config(default = 200.0)]
    pub trigger_rate_hz: f64,
    #[config(default = 0.05)]
    pub pulse_amplitude_v: f64,
    #[config(default = 0.002)]
    pub noise_v: f64,
    #[config(default = 200.0)]
    pub hv_slew_vps: f64,
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerEdge {
    Fall,
    Rise,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_a_file() {
        let conf = Conf::builder().load().unwrap();
        assert_eq!(conf.scan.self_trigger_threshold, 256);
        assert_eq!(conf.scan.n_steps, 10);
        assert_eq!(conf.digitizer.record_length, 1024);
        assert_eq!(conf.digitizer.channels, vec![0]);
        assert_eq!(conf.digitizer.polarity, TriggerEdge::Fall);
        assert_eq!(conf.acquisition.poll_interval_ms, 500);
    }
}
