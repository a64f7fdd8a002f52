//! # Cadeia de Notificação de Purge de vmap
//!
//! Quando o espaço de endereçamento virtual do kernel está acabando, o
//! alocador de vmap dispara `VmapEvent::Purge` nesta cadeia. Cada listener
//! derruba mapeamentos virtuais que puder e SOMA o que desfez ao
//! acumulador compartilhado (nunca sobrescreve).
//!
//! Resultado de cada listener:
//!
//! ```text
//! Done → não tinha interesse / terminou, continua a cadeia
//! Ok   → tratou, continua a cadeia
//! Stop → tratou e interrompe a cadeia
//! ```
//!
//! `unregister` é síncrono: espera a notificação em andamento daquele
//! listener terminar, então não pode ser chamado de dentro dela.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use spin::RwLock;

use super::error::{MmError, MmResult};
use super::inflight::{InFlight, InFlightGuard};

/// Tipos de evento da cadeia (hoje só um)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmapEvent {
    /// Pouco espaço virtual para novos vmaps
    Purge,
}

/// Resposta de um listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyResult {
    Done,
    Ok,
    Stop,
}

/// Contrato de um listener da cadeia
pub trait VmapPurgeListener: Send + Sync {
    /// Trata o evento somando a `freed` o número de vunmaps feitos.
    fn notify(&self, event: VmapEvent, freed: &mut usize) -> NotifyResult;
}

/// Handle de um listener registrado
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotifierId(u64);

struct ListenerEntry {
    id: NotifierId,
    listener: Arc<dyn VmapPurgeListener>,
    in_flight: InFlight,
}

/// Cadeia de listeners de purge de vmap
pub struct VmapPurgeChain {
    listeners: RwLock<Vec<ListenerEntry>>,
    capacity: usize,
    next_id: AtomicU64,
}

impl VmapPurgeChain {
    pub fn new(capacity: usize) -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            capacity,
            next_id: AtomicU64::new(1),
        }
    }

    /// Adiciona um listener ao fim da cadeia.
    pub fn register(&self, listener: Arc<dyn VmapPurgeListener>) -> MmResult<NotifierId> {
        let mut listeners = self.listeners.write();

        if listeners.len() >= self.capacity {
            return Err(MmError::OutOfMemory);
        }
        listeners.try_reserve(1).map_err(|_| MmError::OutOfMemory)?;

        let id = NotifierId(self.next_id.fetch_add(1, Ordering::Relaxed));
        listeners.push(ListenerEntry {
            id,
            listener,
            in_flight: InFlight::new(),
        });
        Ok(id)
    }

    /// Remove um listener e espera sua notificação em andamento, se houver.
    pub fn unregister(&self, id: NotifierId) -> MmResult<()> {
        let entry = {
            let mut listeners = self.listeners.write();
            let pos = listeners
                .iter()
                .position(|e| e.id == id)
                .ok_or(MmError::NotFound)?;
            listeners.remove(pos)
        };

        entry.in_flight.wait_idle();
        Ok(())
    }

    pub fn is_registered(&self, id: NotifierId) -> bool {
        self.listeners.read().iter().any(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispara `VmapEvent::Purge` para todos os listeners, em ordem de
    /// registro, com o mesmo acumulador. Para no primeiro `Stop`.
    pub fn notify(&self, freed: &mut usize) -> NotifyResult {
        let snapshot: Vec<(Arc<dyn VmapPurgeListener>, InFlightGuard)> = self
            .listeners
            .read()
            .iter()
            .map(|e| (Arc::clone(&e.listener), e.in_flight.enter()))
            .collect();

        let mut result = NotifyResult::Done;
        for (listener, guard) in snapshot {
            result = listener.notify(VmapEvent::Purge, freed);
            drop(guard);
            if result == NotifyResult::Stop {
                break;
            }
        }

        crate::ktrace!("(Vmap) purge notify freed=", *freed);
        result
    }
}

impl Default for VmapPurgeChain {
    fn default() -> Self {
        Self::new(super::config::MAX_SHRINKERS)
    }
}
