//! External collaborator surfaces (spec §8 "Out-of-scope collaborators
//! modeled as contracts"): the cartridge command port, SPI backup memory,
//! the DLDI-patched SD card, and the FAT-on-host-directory filesystem.
//!
//! None of these get a cycle-accurate implementation; the execution core
//! only needs them to answer a fixed, narrow contract (read N bytes from
//! offset X, read/write a save-memory byte, resolve a FAT path to host
//! bytes) without caring how the real hardware protocol gets there. Keeping
//! them as small synchronous structs, not full bus devices, matches spec
//! §1's framing of them as "collaborators are stubs: implement the contract
//! surface with trivially correct, deterministic behavior."

/// Cartridge command-port stub (KEY1/KEY2 encryption framing only).
pub mod cart;

/// SPI backup-memory (EEPROM/FLASH/NAND) stub.
pub mod backup;

/// DLDI signature scan/patch for homebrew SD access.
pub mod dldi;

/// FAT-on-host-directory storage contract.
pub mod fat;
