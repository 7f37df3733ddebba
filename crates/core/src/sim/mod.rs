//! Simulation: the `Nds` emulator instance, cartridge-header/boot loading,
//! and the cooperative two-core scheduler (spec §3, §4.9, §5).

/// Cartridge header parsing and the direct-boot sequence.
pub mod loader;

/// Cooperative single-threaded two-core stepping.
pub mod scheduler;

/// `Nds`: owns both cores, the SoC, and the arbiter.
pub mod simulator;

pub use simulator::Nds;
