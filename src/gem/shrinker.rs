//! # GEM Shrinker
//!
//! Recupera memória de objetos GEM ociosos (lista inativa) sob pressão.
//!
//! ## Passadas
//!
//! | Passada       | Gatilho                     | Efeito |
//! |---------------|-----------------------------|--------|
//! | `count`       | framework de shrinkers      | soma páginas purgeable, não muda nada |
//! | `scan`        | framework de shrinkers      | purga objetos até o orçamento |
//! | `purge_vmaps` | cadeia de purge de vmap     | derruba até `vmap_purge_batch` vmaps |
//!
//! ## Locking
//!
//! Lista inativa e estado dos objetos são protegidos pelo `struct_mutex`.
//! O shrinker pode ser chamado de dentro de um caminho que JÁ segura esse
//! lock (ex.: alocação que disparou pressão de memória), então nunca usa
//! `lock()`, só `trylock_recursive()`:
//!
//! ```text
//! Failed     → passada aborta (count=0, scan=Stop, vmap=nada)
//! Success    → passada roda e libera o lock no fim
//! Recursive  → passada roda com o lock do chamador e NÃO libera
//! ```
//!
//! Nenhuma passada bloqueia e nenhuma dispara outra.
//!
//! No caso `Recursive` o chamador pode estar no meio de um acesso às listas
//! ou a um objeto. A lista aberta conta como lock ocupado; um objeto aberto
//! é pulado.
//!
//! TODO: separar um lock só para a lista inativa, para o shrinker não
//! depender do `struct_mutex`.

use alloc::sync::Arc;
use core::ops::ControlFlow;

use crate::mm::config::pages_to_bytes;
use crate::mm::{
    MmError, MmResult, NotifierId, NotifyResult, ScanResult, ShrinkControl, Shrinker, ShrinkerId,
    ShrinkerRegistry, VmapEvent, VmapPurgeChain, VmapPurgeListener,
};
use crate::sync::{Held, MutexGuard, TrylockRecursive};

use super::device::GemDevice;
use super::object::GemObject;

// =============================================================================
// LOCK DO SHRINKER
// =============================================================================

enum LockState<'a> {
    /// Adquirido por esta passada.
    Acquired(MutexGuard<'a, ()>),
    /// Já era da task corrente.
    Recursive(Held<'a, ()>),
}

/// `struct_mutex` obtido por uma passada do shrinker.
///
/// `unlock` diz se esta passada é responsável por liberar o lock. Quando
/// `false` o lock pertence a um chamador mais acima na pilha e continua
/// adquirido depois que a passada termina.
pub struct ShrinkerLock<'a> {
    state: LockState<'a>,
    unlock: bool,
}

impl<'a> ShrinkerLock<'a> {
    /// Tenta obter o `struct_mutex` sem bloquear.
    ///
    /// `None` se outra task segura o lock.
    pub fn acquire(dev: &'a GemDevice) -> Option<Self> {
        match dev.struct_mutex().trylock_recursive() {
            TrylockRecursive::Failed => None,
            TrylockRecursive::Success(guard) => Some(Self {
                state: LockState::Acquired(guard),
                unlock: true,
            }),
            TrylockRecursive::Recursive(held) => Some(Self {
                state: LockState::Recursive(held),
                unlock: false,
            }),
        }
    }

    /// Esta passada deve liberar o lock?
    pub fn must_unlock(&self) -> bool {
        self.unlock
    }

    pub fn held(&self) -> Held<'_, ()> {
        match &self.state {
            LockState::Acquired(guard) => guard.held(),
            LockState::Recursive(held) => *held,
        }
    }
}

impl Drop for ShrinkerLock<'_> {
    fn drop(&mut self) {
        // Sem `unlock` nada é liberado: o guard só existe em `Acquired`.
        debug_assert_eq!(
            self.unlock,
            matches!(self.state, LockState::Acquired(_)),
            "ShrinkerLock: unlock inconsistente"
        );
    }
}

// =============================================================================
// CLASSIFICAÇÃO
// =============================================================================

fn is_purgeable(obj: &GemObject, held: &Held<'_, ()>) -> bool {
    obj.try_with_state(held, |s| s.is_purgeable()).unwrap_or(false)
}

fn purge(obj: &GemObject, held: &Held<'_, ()>) -> bool {
    let id = obj.id();
    obj.try_with_state(held, |s| s.purge(id)).unwrap_or(false)
}

fn vunmap(obj: &GemObject, held: &Held<'_, ()>) -> bool {
    obj.try_with_state(held, |s| s.vunmap()).unwrap_or(false)
}

// =============================================================================
// PASSADAS
// =============================================================================

/// Agente de reclaim de um device GEM
pub struct GemShrinker {
    dev: Arc<GemDevice>,
}

impl GemShrinker {
    pub fn new(dev: Arc<GemDevice>) -> Self {
        Self { dev }
    }

    pub fn device(&self) -> &Arc<GemDevice> {
        &self.dev
    }

    /// Páginas que um `scan` poderia liberar agora.
    ///
    /// Retorna 0 se o lock estiver ocupado por outra task.
    pub fn count(&self) -> usize {
        let Some(lock) = ShrinkerLock::acquire(&self.dev) else {
            return 0;
        };
        let held = lock.held();

        let mut count = 0usize;
        let walked = self.dev.try_for_each_inactive(&held, |obj| {
            if is_purgeable(obj, &held) {
                count += obj.num_pages();
            }
            ControlFlow::Continue(())
        });

        if walked {
            count
        } else {
            0
        }
    }

    /// Purga objetos da lista inativa até liberar `nr_to_scan` páginas.
    ///
    /// O orçamento é conferido antes de cada objeto e objetos são liberados
    /// inteiros, então o total pode passar de `nr_to_scan` por menos que o
    /// tamanho do último objeto purgado.
    pub fn scan(&self, nr_to_scan: usize) -> ScanResult {
        let Some(lock) = ShrinkerLock::acquire(&self.dev) else {
            crate::ktrace!("(Shrinker) scan: struct_mutex ocupado");
            return ScanResult::Stop;
        };
        let held = lock.held();

        let mut freed = 0usize;
        let walked = self.dev.try_for_each_inactive(&held, |obj| {
            if freed >= nr_to_scan {
                return ControlFlow::Break(());
            }
            if purge(obj, &held) {
                freed += obj.num_pages();
            }
            ControlFlow::Continue(())
        });

        drop(lock);

        if !walked {
            crate::ktrace!("(Shrinker) scan: lista inativa em uso");
            return ScanResult::Stop;
        }

        if freed > 0 {
            self.dev.trace().gem_purge(pages_to_bytes(freed));
        }

        ScanResult::Freed(freed)
    }

    /// Derruba vmaps ociosos, no máximo `vmap_purge_batch` por chamada.
    ///
    /// Soma o número de vunmaps a `freed`. Sempre retorna `Done`.
    pub fn purge_vmaps(&self, freed: &mut usize) -> NotifyResult {
        let batch = self.dev.config().vmap_purge_batch;

        let Some(lock) = ShrinkerLock::acquire(&self.dev) else {
            return NotifyResult::Done;
        };
        let held = lock.held();

        let mut unmapped = 0usize;
        self.dev.try_for_each_inactive(&held, |obj| {
            if vunmap(obj, &held) {
                // Sem saber o quanto falta, paramos depois de alguns; o
                // evento dispara de novo se necessário.
                unmapped += 1;
                if unmapped >= batch {
                    return ControlFlow::Break(());
                }
            }
            ControlFlow::Continue(())
        });

        drop(lock);

        *freed += unmapped;

        if unmapped > 0 {
            self.dev.trace().gem_purge_vmaps(unmapped);
        }

        NotifyResult::Done
    }
}

impl Shrinker for GemShrinker {
    fn count_objects(&self, _sc: &ShrinkControl) -> usize {
        self.count()
    }

    fn scan_objects(&self, sc: &ShrinkControl) -> ScanResult {
        self.scan(sc.nr_to_scan)
    }
}

impl VmapPurgeListener for GemShrinker {
    fn notify(&self, _event: VmapEvent, freed: &mut usize) -> NotifyResult {
        self.purge_vmaps(freed)
    }
}

// =============================================================================
// REGISTRO
// =============================================================================

/// O que `init` registrou, para `cleanup` desfazer.
pub struct ShrinkerBinding {
    registry: Arc<ShrinkerRegistry>,
    shrinker: ShrinkerId,
    vmap_chain: Arc<VmapPurgeChain>,
    vmap_notifier: Option<NotifierId>,
}

impl ShrinkerBinding {
    pub fn shrinker_id(&self) -> ShrinkerId {
        self.shrinker
    }

    pub fn vmap_notifier(&self) -> Option<NotifierId> {
        self.vmap_notifier
    }
}

/// Registra o shrinker do device.
///
/// Falha ao alocar o handle de shrinker é fatal (`OutOfMemory`). Falha ao
/// entrar na cadeia de vmap só gera aviso: o device segue sem esse caminho
/// de reclaim.
pub fn init(
    dev: &Arc<GemDevice>,
    registry: &Arc<ShrinkerRegistry>,
    vmap_chain: &Arc<VmapPurgeChain>,
) -> MmResult<()> {
    let mut slot = dev.shrinker_slot().lock();
    if slot.is_some() {
        return Err(MmError::AlreadyRegistered);
    }

    let config = dev.config();
    let id = registry.alloc(config.name, config.seeks).map_err(|e| {
        crate::kerror!("(Shrinker) Falha ao alocar shrinker GEM");
        e
    })?;

    let agent = Arc::new(GemShrinker::new(Arc::clone(dev)));

    if let Err(e) = registry.register(id, agent.clone()) {
        let _ = registry.free(id);
        return Err(e);
    }

    let vmap_notifier = match vmap_chain.register(agent) {
        Ok(nid) => Some(nid),
        Err(_) => {
            crate::kwarn!("(Shrinker) Falha ao registrar notifier de vmap");
            None
        }
    };

    *slot = Some(ShrinkerBinding {
        registry: Arc::clone(registry),
        shrinker: id,
        vmap_chain: Arc::clone(vmap_chain),
        vmap_notifier,
    });

    crate::kok!("(Shrinker) GEM shrinker registrado");
    Ok(())
}

/// Desfaz `init`. Sem efeito se o shrinker não foi registrado.
///
/// Espera as passadas em andamento deste device terminarem, então não pode
/// ser chamada de dentro de uma delas.
pub fn cleanup(dev: &GemDevice) {
    let Some(binding) = dev.shrinker_slot().lock().take() else {
        return;
    };

    if let Some(nid) = binding.vmap_notifier {
        if binding.vmap_chain.unregister(nid).is_err() {
            crate::kwarn!("(Shrinker) Notifier de vmap já removido");
        }
    }

    if binding.registry.free(binding.shrinker).is_err() {
        crate::kwarn!("(Shrinker) Handle de shrinker já liberado");
    }

    crate::kinfo!("(Shrinker) GEM shrinker removido");
}

/// O device tem shrinker registrado?
pub fn is_initialized(dev: &GemDevice) -> bool {
    dev.shrinker_slot().lock().is_some()
}

/// Ids registrados por `init`, se houver.
pub fn registration(dev: &GemDevice) -> Option<(ShrinkerId, Option<NotifierId>)> {
    dev.shrinker_slot()
        .lock()
        .as_ref()
        .map(|b| (b.shrinker_id(), b.vmap_notifier()))
}
