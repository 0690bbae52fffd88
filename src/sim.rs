//! In-process simulators for both devices. They stand in for the hardware
//! gateways during bench-less runs and in tests: a register file with
//! read-modify-write semantics, a slew-limited HV channel with VMON/IMON
//! readbacks, and a self-triggering event source producing synthetic pulses.

use crate::config::{SimSettings, TriggerEdge};
use crate::error::{Result, ScanError};
use crate::event::{Event, RawEventBatch, Waveform};
use crate::gateway::{Digitizer, HvCommand, HvSupply};
use crate::registers::{BIT_TRANSPARENT_MODE, REG_BOARD_CONFIG};
use ndarray::Array1;
use rand::rngs::ThreadRng;
use rand::Rng;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

pub struct SimDigitizer {
    link_num: usize,
    registers: HashMap<u32, u32>,
    channel_params: HashMap<(u32, String), f64>,
    polarity: BTreeMap<u32, TriggerEdge>,
    sampling_mhz: u32,
    record_length: usize,
    max_events_per_readout: usize,
    capturing: bool,
    last_drain: Instant,
    carry: f64,
    trigger_rate_hz: f64,
    pulse_amplitude_v: f64,
    noise_v: f64,
    rng: ThreadRng,
}

impl SimDigitizer {
    pub fn connect(link_num: usize, sim: &SimSettings) -> Result<Self> {
        let mut registers = HashMap::new();
        // Boards come up in transparent mode until the scan reverts them.
        registers.insert(REG_BOARD_CONFIG, 0x0000_0110 | (1 << BIT_TRANSPARENT_MODE));
        Ok(Self {
            link_num,
            registers,
            channel_params: HashMap::new(),
            polarity: BTreeMap::new(),
            sampling_mhz: 2500,
            record_length: 1024,
            max_events_per_readout: 1024,
            capturing: false,
            last_drain: Instant::now(),
            carry: 0.0,
            trigger_rate_hz: sim.trigger_rate_hz,
            pulse_amplitude_v: sim.pulse_amplitude_v,
            noise_v: sim.noise_v,
            rng: rand::rng(),
        })
    }

    fn synth_event(&mut self) -> Event {
        let n = self.record_length;
        let dt = 1.0 / (self.sampling_mhz as f64 * 1e6);
        let center = n as f64 / 3.0;
        let sigma = (n as f64 / 20.0).max(1.0);
        let scale = self.pulse_amplitude_v * self.rng.random_range(0.8..1.2);

        let channels = if self.polarity.is_empty() {
            vec![(0, TriggerEdge::Fall)]
        } else {
            self.polarity.iter().map(|(&ch, &e)| (ch, e)).collect()
        };

        let mut event = Event::default();
        for (ch, edge) in channels {
            let sign = match edge {
                TriggerEdge::Fall => -1.0,
                TriggerEdge::Rise => 1.0,
            };
            let mut time = Vec::with_capacity(n);
            let mut amplitude = Vec::with_capacity(n);
            for i in 0..n {
                let x = (i as f64 - center) / sigma;
                let pulse = sign * scale * (-0.5 * x * x).exp();
                let noise = self.rng.random_range(-self.noise_v..=self.noise_v);
                time.push(i as f64 * dt);
                amplitude.push(pulse + noise);
            }
            event.channels.insert(
                ch,
                Waveform::new(Array1::from_vec(time), Array1::from_vec(amplitude)),
            );
        }
        event
    }
}

impl Digitizer for SimDigitizer {
    fn idn(&self) -> String {
        format!("SIM-DT5742, link {}", self.link_num)
    }

    fn set_sampling_frequency(&mut self, mhz: u32) -> Result<()> {
        self.sampling_mhz = mhz;
        Ok(())
    }

    fn set_record_length(&mut self, samples: usize) -> Result<()> {
        self.record_length = samples;
        Ok(())
    }

    fn set_max_events_per_readout(&mut self, n_events: usize) -> Result<()> {
        self.max_events_per_readout = n_events;
        Ok(())
    }

    fn set_fast_trigger_digitizing(&mut self, _enabled: bool) -> Result<()> {
        Ok(())
    }

    fn enable_channel_group(&mut self, _group: u32, _enabled: bool) -> Result<()> {
        Ok(())
    }

    fn set_trigger_polarity(&mut self, channel: u32, edge: TriggerEdge) -> Result<()> {
        self.polarity.insert(channel, edge);
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
        self.channel_params
            .get(&(channel, name.to_owned()))
            .copied()
            .ok_or_else(|| {
                ScanError::device_io(
                    format!("get ch{channel} parameter {name}"),
                    "parameter not set",
                )
            })
    }

    fn begin_capture(&mut self) -> Result<()> {
        if self.capturing {
            return Err(ScanError::device_io("begin capture", "already capturing"));
        }
        self.capturing = true;
        self.last_drain = Instant::now();
        self.carry = 0.0;
        Ok(())
    }

    fn end_capture(&mut self) -> Result<()> {
        if !self.capturing {
            return Err(ScanError::device_io("end capture", "not capturing"));
        }
        self.capturing = false;
        Ok(())
    }

    fn acquire_events(&mut self) -> Result<RawEventBatch> {
        if !self.capturing {
            return Err(ScanError::device_io("acquire events", "capture not enabled"));
        }
        let now = Instant::now();
        let expected =
            self.trigger_rate_hz * now.duration_since(self.last_drain).as_secs_f64() + self.carry;
        self.last_drain = now;

        let count = (expected.floor() as usize).min(self.max_events_per_readout);
        self.carry = expected - expected.floor();

        Ok((0..count).map(|_| self.synth_event()).collect())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.capturing = false;
        Ok(())
    }
}

struct SimHvChannel {
    on: bool,
    vset: f64,
    vmon: f64,
    last_update: Instant,
}

pub struct SimHvSupply {
    channels: Vec<SimHvChannel>,
    slew_vps: f64,
}

impl SimHvSupply {
    pub fn connect(sim: &SimSettings) -> Result<Self> {
        let channels = (0..2)
            .map(|_| SimHvChannel {
                on: false,
                vset: 0.0,
                vmon: 0.0,
                last_update: Instant::now(),
            })
            .collect();
        Ok(Self {
            channels,
            slew_vps: sim.hv_slew_vps,
        })
    }

    fn channel_mut(&mut self, channel: u32) -> Result<&mut SimHvChannel> {
        let slew = self.slew_vps;
        let ch = self
            .channels
            .get_mut(channel as usize)
            .ok_or_else(|| ScanError::device_io(format!("hv channel {channel}"), "no such channel"))?;

        // Advance the output toward the setpoint at the configured slew rate.
        let now = Instant::now();
        let dt = now.duration_since(ch.last_update).as_secs_f64();
        ch.last_update = now;
        let target = if ch.on { ch.vset } else { 0.0 };
        let travel = slew * dt;
        if (target - ch.vmon).abs() <= travel {
            ch.vmon = target;
        } else if target > ch.vmon {
            ch.vmon += travel;
        } else {
            ch.vmon -= travel;
        }
        Ok(ch)
    }
}

impl HvSupply for SimHvSupply {
    fn idn(&self) -> String {
        "SIM-HV desktop supply".to_owned()
    }

    fn issue_command(&mut self, command: HvCommand) -> Result<()> {
        match command {
            HvCommand::On { channel } => {
                self.channel_mut(channel)?.on = true;
            }
            HvCommand::Off { channel } => {
                self.channel_mut(channel)?.on = false;
            }
            HvCommand::SetVoltage { channel, volts } => {
                self.channel_mut(channel)?.vset = volts;
            }
        }
        Ok(())
    }

    fn get_channel_parameter(&mut self, name: &str, channel: u32) -> Result<f64> {
        let ch = self.channel_mut(channel)?;
        match name {
            "VMON" => Ok(ch.vmon),
            "IMON" => Ok(ch.vmon / 400.0),
            "VSET" => Ok(ch.vset),
            _ => Err(ScanError::device_io(
                format!("hv parameter {name}"),
                "unknown parameter",
            )),
        }
    }

    fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }
}
