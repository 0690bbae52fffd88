pub mod acquire;
pub mod analysis;
pub mod bits;
pub mod config;
pub mod error;
pub mod event;
pub mod frame;
pub mod gateway;
pub mod ramp;
pub mod registers;
pub mod scan;
pub mod sim;
pub mod utils;

pub use acquire::{PollLoop, StepOutcome, StepStatus};
pub use analysis::{gain_summary, write_gain_csv, GainPoint};
pub use bits::{clear_bit, edit_bit, set_bit};
pub use config::{Conf, TriggerEdge};
pub use error::{Result, ScanError};
pub use event::{Event, RawEventBatch, Waveform};
pub use frame::{assemble, WaveformFrame, WaveformRow};
pub use gateway::{CaptureWindow, Digitizer, HvCommand, HvSupply};
pub use ramp::{RampController, RampStatus};
pub use scan::{voltage_steps, Scan, ScanParams};
pub use sim::{SimDigitizer, SimHvSupply};
pub use utils::Counter;
