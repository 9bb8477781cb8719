//! Memory pressure port.

/// Reports whether the process is above its memory threshold.
///
/// Consulted by the encoder before each encode; a positive reading forces the
/// model through an unload/reload cycle.
pub trait PressureSignal: Send + Sync {
    fn is_under_pressure(&self) -> bool;

    /// Current reading in megabytes, for logs.
    fn usage_mb(&self) -> Option<u64> {
        None
    }
}

/// A pressure signal that never fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPressure;

impl PressureSignal for NoPressure {
    fn is_under_pressure(&self) -> bool {
        false
    }
}
