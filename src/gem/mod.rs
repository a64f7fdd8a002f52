//! # GEM (Graphics Execution Manager)
//!
//! Buffer objects de GPU e o agente que recupera a memória deles sob pressão.
//!
//! ## 🏗️ Arquitetura dos Módulos
//!
//! | Módulo     | Responsabilidade |
//! |------------|------------------|
//! | `object`   | Buffer object: storage, vmap, madvise, purge/vunmap. |
//! | `device`   | `struct_mutex`, listas ativa/inativa, config e trace. |
//! | `shrinker` | Passadas count/scan/purge de vmap e registro no framework. |
//! | `trace`    | Eventos `gem_purge` / `gem_purge_vmaps`. |
//!
//! ## Uso
//!
//! ```text
//! let dev = GemDevice::new(ShrinkerConfig::default());
//! shrinker::init(&dev, &registry, &vmap_chain)?;
//! ...
//! shrinker::cleanup(&dev);
//! ```

pub mod device;
pub mod object;
pub mod shrinker;
pub mod trace;


#[cfg(test)]
mod shrinker_test;


pub use device::GemDevice;
pub use object::{GemFlags, GemObject, Madv};
pub use shrinker::{GemShrinker, ShrinkerBinding, ShrinkerLock};
pub use trace::{GemTrace, TraceStats};
