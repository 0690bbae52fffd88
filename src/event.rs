use ndarray::Array1;
use std::collections::BTreeMap;

/// One captured waveform: paired time/amplitude sample arrays of equal
/// length (the record length configured on the digitizer).
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub time: Array1<f64>,
    pub amplitude: Array1<f64>,
}

impl Waveform {
    pub fn new(time: Array1<f64>, amplitude: Array1<f64>) -> Self {
        debug_assert_eq!(time.len(), amplitude.len());
        Self { time, amplitude }
    }

    pub fn from_samples(time: Vec<f64>, amplitude: Vec<f64>) -> Self {
        Self::new(Array1::from_vec(time), Array1::from_vec(amplitude))
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// One triggered event: a waveform per channel that fired. The map is
/// ordered so that flattening an event is deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Event {
    pub channels: BTreeMap<u32, Waveform>,
}

impl Event {
    pub fn single_channel(channel: u32, waveform: Waveform) -> Self {
        let mut channels = BTreeMap::new();
        channels.insert(channel, waveform);
        Self { channels }
    }
}

/// Whatever events the digitizer had buffered at one readout poll. May be
/// empty. Ownership moves to the caller; the gateway keeps nothing.
pub type RawEventBatch = Vec<Event>;
