//! CPU core trait.

use crate::Bus;

/// A CPU core clocked one cycle at a time.
///
/// The type parameter `B` is the bus type this CPU operates on. Interrupt
/// lines and stall injection are inherent to each CPU implementation; this
/// trait covers the parts the bus drives every cycle.
pub trait Cpu<B: Bus> {
    /// Reset the CPU to its initial state (reads the reset vector).
    fn reset(&mut self, bus: &mut B);

    /// Advance the CPU by one cycle. When the remaining-cycle counter is
    /// zero a new instruction (or a pending interrupt sequence) begins and
    /// runs to completion against the bus; the counter then burns down one
    /// cycle per call. Returns true on the cycle an instruction retired.
    fn clock(&mut self, bus: &mut B) -> bool;
}
