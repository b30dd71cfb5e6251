//! Monotonic time source

/// Free-running millisecond clock used for protocol deadlines
pub trait Monotonic {
    /// Milliseconds since an arbitrary fixed point
    fn now_ms(&self) -> u64;
}
