//! Core Module
//!
//! Saída de diagnóstico do crate: o sink de console e os macros de log.

pub mod console;
pub mod logging;
