//! Digitizer register map. Addresses are fixed protocol constants; registers
//! are 32 bit and are only ever modified by read-modify-write of single bits
//! so that flags owned by other subsystems survive.

/// Front panel I/O control. Writing [`GPO_BUSY_WORD`] routes the board busy
/// signal to the GPO output.
pub const REG_FRONT_PANEL_IO: u32 = 0x811C;

/// Word written to [`REG_FRONT_PANEL_IO`] to enable the busy signal on GPO.
pub const GPO_BUSY_WORD: u32 = 0x000D_0001;

/// Board configuration register.
pub const REG_BOARD_CONFIG: u32 = 0x8000;

/// Bit of [`REG_BOARD_CONFIG`]: 1 = transparent mode, 0 = output mode.
pub const BIT_TRANSPARENT_MODE: u32 = 13;

/// Per-group self-trigger threshold, raw ADC counts in `0..=4095`.
pub const REG_SELF_TRIGGER_THRESHOLD: u32 = 0x1080;

/// Largest raw ADC value accepted by [`REG_SELF_TRIGGER_THRESHOLD`].
pub const SELF_TRIGGER_THRESHOLD_MAX: u32 = 4095;

/// Per-group trigger enable register.
pub const REG_SELF_TRIGGER_ENABLE: u32 = 0x10A8;

/// Bit of [`REG_SELF_TRIGGER_ENABLE`]: 1 enables self-triggering.
pub const BIT_SELF_TRIGGER_ENABLE: u32 = 0;
