//! # Synchronization Primitives
//!
//! Primitivas usadas pelo GEM para proteger lista inativa e estado dos
//! objetos.
//!
//! ## Hierarquia de Uso
//!
//! ```text
//! owner   → Identidade da task corrente (dono do lock)
//! Mutex   → struct_mutex do device, com trylock recursivo
//! Locked  → Dado guardado por um Mutex externo, acesso com prova Held
//! ```
//!
//! ## Regras
//!
//! - **Shrinker**: NUNCA usa `lock()`, apenas `trylock_recursive()`
//! - **Locked**: todo acesso exige `Held` do mutex correto
//! - Os registros de shrinker/notifier usam `spin::RwLock` e nunca são
//!   segurados durante um callback

/// Identidade da task corrente
pub mod owner;

/// Mutex com dono rastreado
pub mod mutex;

/// Dado guardado por lock externo
pub mod locked;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use locked::Locked;
pub use mutex::{Held, Mutex, MutexGuard, TrylockRecursive};
