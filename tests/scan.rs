//! End-to-end scans against scripted gateways: the orchestrator runs the
//! full configure / ramp / poll / assemble / power-down sequence with
//! deterministic devices standing in for the hardware.

use confique::Config;
use hvscan::config::{Conf, TriggerEdge};
use hvscan::error::Result;
use hvscan::event::{Event, RawEventBatch, Waveform};
use hvscan::gateway::{Digitizer, HvCommand, HvSupply};
use hvscan::registers::{
    BIT_SELF_TRIGGER_ENABLE, BIT_TRANSPARENT_MODE, REG_BOARD_CONFIG, REG_SELF_TRIGGER_ENABLE,
    REG_SELF_TRIGGER_THRESHOLD,
};
use hvscan::scan::{Scan, ScanParams};
use std::collections::HashMap;

const RECORD_LENGTH: usize = 4;

fn two_channel_event() -> Event {
    let mut event = Event::default();
    for channel in [0u32, 1] {
        let time: Vec<f64> = (0..RECORD_LENGTH).map(|i| i as f64 * 4e-10).collect();
        let amplitude = vec![-0.01; RECORD_LENGTH];
        event
            .channels
            .insert(channel, Waveform::from_samples(time, amplitude));
    }
    event
}

/// Digitizer that serves a fixed number of events per capture window:
/// everything scripted for the window on the first poll, nothing after.
struct ScriptedDigitizer {
    events_per_window: Vec<usize>,
    window: usize,
    delivered: bool,
    capturing: bool,
    registers: HashMap<u32, u32>,
    channel_params: HashMap<(u32, String), f64>,
}

impl ScriptedDigitizer {
    fn new(events_per_window: Vec<usize>) -> Self {
        Self {
            events_per_window,
            window: 0,
            delivered: false,
            capturing: false,
            registers: HashMap::new(),
            channel_params: HashMap::new(),
        }
    }
}

impl Digitizer for ScriptedDigitizer {
    fn idn(&self) -> String {
        "scripted digitizer".to_owned()
    }

    fn set_sampling_frequency(&mut self, _mhz: u32) -> Result<()> {
        Ok(())
    }
    fn set_record_length(&mut self, _samples: usize) -> Result<()> {
        Ok(())
    }
    fn set_max_events_per_readout(&mut self, _n_events: usize) -> Result<()> {
        Ok(())
    }
    fn set_fast_trigger_digitizing(&mut self, _enabled: bool) -> Result<()> {
        Ok(())
    }
    fn enable_channel_group(&mut self, _group: u32, _enabled: bool) -> Result<()> {
        Ok(())
    }
    fn set_trigger_polarity(&mut self, _channel: u32, _edge: TriggerEdge) -> Result<()> {
        Ok(())
    }

    fn read_register(&mut self, addr: u32) -> Result<u32> {
        Ok(*self.registers.get(&addr).unwrap_or(&0))
    }

    fn write_register(&mut self, addr: u32, word: u32) -> Result<()> {
        self.registers.insert(addr, word);
        Ok(())
    }

    fn set_channel_parameter(&mut self, channel: u32, name: &str, value: f64) -> Result<()> {
        self.channel_params.insert((channel, name.to_owned()), value);
        Ok(())
    }

    fn get_channel_parameter(&mut self, channel: u32, name: &str) -> Result<f64> {
        Ok(*self
            .channel_params
            .get(&(channel, name.to_owned()))
            .unwrap_or(&0.0))
    }

    fn begin_capture(&mut self) -> Result<()> {
        self.capturing = true;
        self.delivered = false;
        Ok(())
    }

    fn end_capture(&mut self) -> Result<()> {
        self.capturing = false;
        self.window += 1;
        Ok(())
    }

    fn acquire_events(&mut self) -> Result<RawEventBatch> {
        if self.delivered {
            return Ok(Vec::new());
        }
        self.delivered = true;
        let count = self.events_per_window.get(self.window).copied().unwrap_or(0);
        Ok((0..count).map(|_| two_channel_event()).collect())
    }

    fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Supply whose output tracks the setpoint instantly.
struct InstantHv {
    vset: f64,
    on: bool,
    commands: Vec<HvCommand>,
}

impl InstantHv {
    fn new() -> Self {
        Self {
            vset: 0.0,
            on: false,
            commands: Vec::new(),
        }
    }
}

impl HvSupply for InstantHv {
    fn idn(&self) -> String {
        "instant supply".to_owned()
    }

    fn issue_command(&mut self, command: HvCommand) -> Result<()> {
        self.commands.push(command);
        match command {
            HvCommand::On { .. } => self.on = true,
            HvCommand::Off { .. } => self.on = false,
            HvCommand::SetVoltage { volts, .. } => self.vset = volts,
        }
        Ok(())
    }

    fn get_channel_parameter(&mut self, name: &str, _channel: u32) -> Result<f64> {
        match name {
            "VMON" => Ok(if self.on { self.vset } else { 0.0 }),
            "IMON" => Ok(0.0),
            _ => Ok(0.0),
        }
    }

    fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }
}

fn fast_conf() -> Conf {
    let mut conf = Conf::builder().load().unwrap();
    conf.acquisition.poll_interval_ms = 1;
    conf.acquisition.per_event_timeout_s = 0.005;
    conf.hv.poll_interval_ms = 1;
    conf.hv.settle_margin_s = 0.005;
    conf.digitizer.channels = vec![0, 1];
    conf
}

fn params(n_events: usize) -> ScanParams {
    ScanParams {
        dc_offset: -0.3,
        self_trigger_threshold: 256,
        n_events,
        low_hv: 800.0,
        high_hv: 1000.0,
        n_steps: 3,
    }
}

#[test]
fn full_scan_labels_every_step() {
    let conf = fast_conf();
    let mut dig = ScriptedDigitizer::new(vec![5, 5, 5]);
    let mut hv = InstantHv::new();

    let frame = Scan::new(&mut dig, &mut hv, &conf, params(5)).run().unwrap();

    assert_eq!(frame.voltages(), vec![800.0, 900.0, 1000.0]);
    // 3 steps x 5 events x 2 channels x RECORD_LENGTH samples
    assert_eq!(frame.len(), 3 * 5 * 2 * RECORD_LENGTH);

    for voltage in [800.0, 900.0, 1000.0] {
        let indices: Vec<usize> = frame
            .rows()
            .iter()
            .filter(|r| r.voltage == voltage)
            .map(|r| r.n_event)
            .collect();
        assert_eq!(indices.iter().min(), Some(&0));
        assert_eq!(indices.iter().max(), Some(&4));
    }
}

#[test]
fn scan_applies_the_register_sequence() {
    let conf = fast_conf();
    let mut dig = ScriptedDigitizer::new(vec![2, 2, 2]);
    let mut hv = InstantHv::new();

    Scan::new(&mut dig, &mut hv, &conf, params(2)).run().unwrap();

    assert_eq!(dig.registers[&REG_SELF_TRIGGER_THRESHOLD], 256);
    assert_ne!(
        dig.registers[&REG_SELF_TRIGGER_ENABLE] & (1 << BIT_SELF_TRIGGER_ENABLE),
        0,
        "self trigger must be enabled"
    );
    assert_eq!(
        dig.registers[&REG_BOARD_CONFIG] & (1 << BIT_TRANSPARENT_MODE),
        0,
        "board must be left in output mode"
    );
    assert_eq!(dig.channel_params[&(0, "DCOffset".to_owned())], -0.3);
    assert_eq!(dig.channel_params[&(1, "DCOffset".to_owned())], -0.3);

    assert!(!dig.capturing, "every capture window must be closed");
    assert_eq!(dig.window, 3, "one capture window per step");
}

#[test]
fn scan_always_powers_down() {
    let conf = fast_conf();
    let mut dig = ScriptedDigitizer::new(vec![1, 1, 1]);
    let mut hv = InstantHv::new();

    Scan::new(&mut dig, &mut hv, &conf, params(1)).run().unwrap();

    let n = hv.commands.len();
    assert!(n >= 2);
    assert_eq!(
        hv.commands[n - 2],
        HvCommand::SetVoltage {
            channel: 0,
            volts: 0.0
        }
    );
    assert_eq!(hv.commands[n - 1], HvCommand::Off { channel: 0 });
    assert!(!hv.on);
}

#[test]
fn empty_middle_step_is_skipped_without_failing_the_scan() {
    let conf = fast_conf();
    let mut dig = ScriptedDigitizer::new(vec![5, 0, 5]);
    let mut hv = InstantHv::new();

    let frame = Scan::new(&mut dig, &mut hv, &conf, params(5)).run().unwrap();

    assert_eq!(frame.voltages(), vec![800.0, 1000.0]);
    assert!(frame.rows().iter().all(|r| r.voltage != 900.0));
    assert_eq!(frame.len(), 2 * 5 * 2 * RECORD_LENGTH);
}

#[test]
fn scan_with_no_data_at_all_is_an_error() {
    let conf = fast_conf();
    let mut dig = ScriptedDigitizer::new(vec![0, 0, 0]);
    let mut hv = InstantHv::new();

    let result = Scan::new(&mut dig, &mut hv, &conf, params(2)).run();

    assert!(matches!(result, Err(hvscan::ScanError::EmptyInput)));
    // power-down still happened
    assert!(!hv.on);
    assert!(matches!(
        hv.commands.last(),
        Some(HvCommand::Off { channel: 0 })
    ));
}

#[test]
fn exported_table_round_trips_through_csv() {
    let conf = fast_conf();
    let mut dig = ScriptedDigitizer::new(vec![2, 2, 2]);
    let mut hv = InstantHv::new();

    let frame = Scan::new(&mut dig, &mut hv, &conf, params(2)).run().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.csv");
    frame.write_csv_path(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next().unwrap(),
        "n_event,n_channel,voltage,Time (s),Amplitude (V)"
    );
    assert_eq!(lines.count(), frame.len());
}
