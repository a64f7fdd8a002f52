//! # Memory Reclaim (MM)
//!
//! Interfaces do kernel hospedeiro consumidas pelo shrinker GEM.
//!
//! ## 🏗️ Arquitetura dos Módulos
//!
//! | Módulo     | Responsabilidade |
//! |------------|------------------|
//! | `config`   | Constantes de página e parâmetros do shrinker. |
//! | `error`    | `MmError` / `MmResult`. |
//! | `shrinker` | Framework de pressão de memória (count/scan). |
//! | `vmap`     | Cadeia de notificação de falta de espaço virtual. |
//! | `inflight` | Callbacks em andamento (remoção síncrona dos registros). |
//!
//! Fluxo de um ciclo de reclaim:
//!
//! ```text
//! pressão de memória ──▶ ShrinkerRegistry::shrink ──▶ count/scan
//! falta de vmap      ──▶ VmapPurgeChain::notify   ──▶ listener
//! ```
//!
//! Nenhuma passada dispara outra.

pub mod config;
pub mod error;
mod inflight;
pub mod shrinker;
pub mod vmap;

pub use config::{ShrinkerConfig, PAGE_SHIFT, PAGE_SIZE};
pub use error::{MmError, MmResult};
pub use shrinker::{ScanResult, ShrinkControl, Shrinker, ShrinkerId, ShrinkerRegistry};
pub use vmap::{NotifierId, NotifyResult, VmapEvent, VmapPurgeChain, VmapPurgeListener};
