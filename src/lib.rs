// src/lib.rs — Library root for Lumino

pub mod cli;
pub mod controller;
pub mod dosimetry;
pub mod infra;
pub mod session;
pub mod supervisor;
pub mod sync;
