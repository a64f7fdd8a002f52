//! Forge GEM Shrinker.
//!
//! Recupera memória de buffer objects GEM ociosos quando o kernel entra em
//! pressão de memória ou fica sem espaço de endereçamento virtual.
//!
//! ## Módulos
//!
//! - `core`: console e macros de log (`kinfo!`, `kwarn!`, ...)
//! - `sync`: mutex com dono e trylock recursivo, dados `Locked`
//! - `mm`:   framework de shrinkers e cadeia de purge de vmap
//! - `gem`:  objetos, device e o shrinker em si
//!
//! Sem `std` fora de testes (ou da feature `std`).

#![cfg_attr(not(any(test, feature = "std")), no_std)]

// Vec/Box/Arc
extern crate alloc;

pub mod core;
pub mod gem;
pub mod mm;
pub mod sync;

pub use crate::gem::shrinker::{cleanup, init};
pub use crate::gem::{GemDevice, GemObject, GemShrinker, Madv};
pub use crate::mm::{ShrinkerConfig, ShrinkerRegistry, VmapPurgeChain};
