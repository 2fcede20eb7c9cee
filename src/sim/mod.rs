/// Mission clock: the bounded minute counter fused with the ephemeris.
pub mod clock;
pub mod harness;
/// Orbital light/shadow oracle.
pub mod orbit;
pub mod report;
pub mod supervisor;
