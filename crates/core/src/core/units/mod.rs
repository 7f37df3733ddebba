//! Execution units and functional components (spec §3 "Caches", §4.5 "CP15",
//! §4.6 "Write buffer").
//!
//! This module contains the integer ALU/barrel shifter, the ARM946E-S
//! instruction/data cache model, CP15 (protection regions, TCM
//! configuration, cache-maintenance ops), and the 16-entry write buffer.

/// Arithmetic Logic Unit and barrel shifter for ARM data-processing operations.
pub mod alu;

/// Instruction/data cache hierarchy with tag/dirty tracking and replacement policy.
pub mod cache;

/// CP15 system-control coprocessor: protection regions, TCM, cache/write-buffer ops.
pub mod cp15;

/// The 16-entry strict-FIFO write buffer sitting between the data cache and the bus.
pub mod write_buffer;
