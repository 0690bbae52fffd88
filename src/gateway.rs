//! Capability interfaces for the two bench devices. The scan engine only
//! ever talks to these traits; hardware-backed drivers and the in-process
//! simulator both implement them.

use crate::config::TriggerEdge;
use crate::error::Result;
use crate::event::RawEventBatch;
use log::warn;

/// Waveform digitizer capabilities used by the scan engine.
///
/// `acquire_events` is a non-blocking best-effort fetch of whatever events
/// the board has buffered; it may return an empty batch and must not block
/// beyond the driver's own short I/O timeout. Capture must be bracketed by
/// `begin_capture`/`end_capture`; use [`CaptureWindow`] so the board returns
/// to idle on every exit path.
pub trait Digitizer {
    fn idn(&self) -> String;

    fn set_sampling_frequency(&mut self, mhz: u32) -> Result<()>;
    fn set_record_length(&mut self, samples: usize) -> Result<()>;
    fn set_max_events_per_readout(&mut self, n_events: usize) -> Result<()>;
    fn set_fast_trigger_digitizing(&mut self, enabled: bool) -> Result<()>;
    fn enable_channel_group(&mut self, group: u32, enabled: bool) -> Result<()>;
    fn set_trigger_polarity(&mut self, channel: u32, edge: TriggerEdge) -> Result<()>;

    fn read_register(&mut self, addr: u32) -> Result<u32>;
    fn write_register(&mut self, addr: u32, word: u32) -> Result<()>;

    fn set_channel_parameter(&mut self, channel: u32, name: &str, value: f64) -> Result<()>;
    fn get_channel_parameter(&mut self, channel: u32, name: &str) -> Result<f64>;

    fn begin_capture(&mut self) -> Result<()>;
    fn end_capture(&mut self) -> Result<()>;
    fn acquire_events(&mut self) -> Result<RawEventBatch>;

    fn disconnect(&mut self) -> Result<()>;
}

/// Commands understood by the HV power supply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HvCommand {
    On { channel: u32 },
    Off { channel: u32 },
    SetVoltage { channel: u32, volts: f64 },
}

/// High-voltage power supply capabilities used by the scan engine.
/// Monitored values are read through named channel parameters
/// (`VMON`, `IMON`, `VSET`).
pub trait HvSupply {
    fn idn(&self) -> String;

    fn issue_command(&mut self, command: HvCommand) -> Result<()>;
    fn get_channel_parameter(&mut self, name: &str, channel: u32) -> Result<f64>;

    fn disconnect(&mut self) -> Result<()>;
}

/// Scoped acquisition: capture is enabled on open and disabled when the
/// window is closed or dropped, so the board cannot be left capturing by a
/// timeout or an error inside the poll loop.
pub struct CaptureWindow<'a, D: Digitizer + ?Sized> {
    digitizer: &'a mut D,
    armed: bool,
}

impl<'a, D: Digitizer + ?Sized> CaptureWindow<'a, D> {
    pub fn open(digitizer: &'a mut D) -> Result<Self> {
        digitizer.begin_capture()?;
        Ok(Self {
            digitizer,
            armed: true,
        })
    }

    pub fn acquire_events(&mut self) -> Result<RawEventBatch> {
        self.digitizer.acquire_events()
    }

    /// Disable capture, surfacing any device error. Preferred over relying
    /// on drop when the caller can still propagate errors.
    pub fn close(mut self) -> Result<()> {
        self.armed = false;
        self.digitizer.end_capture()
    }
}

impl<D: Digitizer + ?Sized> Drop for CaptureWindow<'_, D> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.digitizer.end_capture() {
                warn!("failed to disable capture while unwinding: {e}");
            }
        }
    }
}
