//! # GEM Buffer Object
//!
//! Um buffer de GPU com tamanho em páginas, backing storage alocada sob
//! demanda e um mapeamento virtual de kernel (vmap) opcional.
//!
//! Todo o estado mutável mora num `Locked<ObjectState>` guardado pelo
//! `struct_mutex` do device: cada método recebe a prova `Held`.
//!
//! Nenhuma alocação acontece com o estado aberto. Alocar pode disparar o
//! shrinker na mesma task (reentrante), e ele precisa ler este estado.
//!
//! ## Estados de madvise
//!
//! ```text
//! WillNeed ──madvise(DontNeed)──▶ DontNeed ──purge──▶ Purged (terminal)
//!    ▲                               │
//!    └──────madvise(WillNeed)────────┘
//! ```
//!
//! ## Elegibilidade para reclaim
//!
//! - *purgeable*: `DontNeed`, com páginas, não importado
//! - *vunmapable*: tem vmap e nenhum usuário do vmap

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use bitflags::bitflags;

use crate::mm::config::bytes_to_pages;
use crate::mm::{MmError, MmResult};
use crate::sync::{Held, Locked, Mutex};

bitflags! {
    /// Resumo do estado de um objeto, para diagnóstico.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct GemFlags: u32 {
        /// Backing storage alocada.
        const HAS_PAGES = 1 << 0;
        /// Mapeamento virtual de kernel presente.
        const VMAPPED   = 1 << 1;
        /// Na lista ativa (referenciado por trabalho de GPU).
        const ACTIVE    = 1 << 2;
        /// Storage importada de outro device.
        const IMPORTED  = 1 << 3;
        /// Backing storage descartada pelo shrinker.
        const PURGED    = 1 << 4;
    }
}

/// Conselho de uso dado pelo userspace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Madv {
    /// Conteúdo necessário, não descartar.
    WillNeed,
    /// Conteúdo pode ser descartado sob pressão.
    DontNeed,
    /// Conteúdo já foi descartado.
    Purged,
}

pub(crate) struct ObjectState {
    madv: Madv,
    pages: Option<Box<[u8]>>,
    vaddr: Option<usize>,
    vmap_count: u32,
    imported: bool,
    pub(crate) active: bool,
}

/// Buffer object GEM
pub struct GemObject {
    id: u64,
    /// Tamanho em bytes, múltiplo de `PAGE_SIZE`
    size: usize,
    state: Locked<ObjectState>,
}

impl GemObject {
    pub(crate) fn new(lock: &Arc<Mutex<()>>, id: u64, size: usize) -> Self {
        Self {
            id,
            size,
            state: Locked::new(
                lock,
                ObjectState {
                    madv: Madv::WillNeed,
                    pages: None,
                    vaddr: None,
                    vmap_count: 0,
                    imported: false,
                    active: false,
                },
            ),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Tamanho em bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Tamanho em páginas.
    pub fn num_pages(&self) -> usize {
        bytes_to_pages(self.size)
    }

    /// O objeto pertence ao domínio deste mutex?
    pub fn is_guarded_by(&self, lock: &Mutex<()>) -> bool {
        self.state.is_guarded_by(lock)
    }

    pub(crate) fn with_state<R>(
        &self,
        held: &Held<'_, ()>,
        f: impl FnOnce(&mut ObjectState) -> R,
    ) -> R {
        self.state.with(held, f)
    }

    /// `None` se o estado já estiver aberto mais acima na pilha.
    pub(crate) fn try_with_state<R>(
        &self,
        held: &Held<'_, ()>,
        f: impl FnOnce(&mut ObjectState) -> R,
    ) -> Option<R> {
        self.state.try_with(held, f)
    }

    // =========================================================================
    // BACKING STORAGE
    // =========================================================================

    /// Garante que a backing storage existe.
    pub fn get_pages(&self, held: &Held<'_, ()>) -> MmResult<()> {
        let missing = self.state.with(held, |s| -> MmResult<bool> {
            s.check_usable()?;
            Ok(s.pages.is_none())
        })?;
        if !missing {
            return Ok(());
        }

        let storage = alloc_storage(self.size)?;

        // A alocação pode ter rodado o shrinker: confere de novo.
        self.state.with(held, |s| -> MmResult<()> {
            s.check_usable()?;
            if s.pages.is_none() {
                s.pages = Some(storage);
            }
            Ok(())
        })
    }

    /// Descarta a backing storage (e o vmap, que aponta para ela).
    pub(crate) fn put_pages(&self, held: &Held<'_, ()>) {
        self.state.with(held, |s| {
            s.vaddr = None;
            s.vmap_count = 0;
            s.pages = None;
        });
    }

    pub fn has_pages(&self, held: &Held<'_, ()>) -> bool {
        self.state.with(held, |s| s.pages.is_some())
    }

    // =========================================================================
    // VMAP
    // =========================================================================

    /// Mapeia o objeto no espaço virtual do kernel e retorna o endereço.
    ///
    /// Cada `vmap` deve ser pareado com `put_vaddr`. O mapeamento continua em
    /// cache depois disso até o shrinker derrubá-lo.
    pub fn vmap(&self, held: &Held<'_, ()>) -> MmResult<usize> {
        self.get_pages(held)?;

        self.state.with(held, |s| -> MmResult<usize> {
            s.check_usable()?;

            let vaddr = match s.vaddr {
                Some(vaddr) => vaddr,
                None => {
                    let pages = s.pages.as_ref().ok_or(MmError::OutOfMemory)?;
                    let vaddr = pages.as_ptr() as usize;
                    s.vaddr = Some(vaddr);
                    vaddr
                }
            };

            s.vmap_count += 1;
            Ok(vaddr)
        })
    }

    /// Devolve um uso do vmap.
    pub fn put_vaddr(&self, held: &Held<'_, ()>) {
        self.state.with(held, |s| {
            debug_assert!(s.vmap_count > 0, "put_vaddr sem vmap");
            s.vmap_count = s.vmap_count.saturating_sub(1);
        });
    }

    pub fn has_vaddr(&self, held: &Held<'_, ()>) -> bool {
        self.state.with(held, |s| s.vaddr.is_some())
    }

    pub fn vmap_count(&self, held: &Held<'_, ()>) -> u32 {
        self.state.with(held, |s| s.vmap_count)
    }

    // =========================================================================
    // MADVISE
    // =========================================================================

    /// Aplica o conselho de uso. Retorna se o conteúdo ainda existe.
    ///
    /// Objetos já purgados ficam em `Purged` para sempre.
    pub fn madvise(&self, held: &Held<'_, ()>, madv: Madv) -> bool {
        self.state.with(held, |s| {
            if s.madv != Madv::Purged {
                s.madv = madv;
            }
            s.madv != Madv::Purged
        })
    }

    pub fn madv(&self, held: &Held<'_, ()>) -> Madv {
        self.state.with(held, |s| s.madv)
    }

    /// Marca a storage como importada (nunca purgeable).
    pub fn set_imported(&self, held: &Held<'_, ()>, imported: bool) {
        self.state.with(held, |s| s.imported = imported);
    }

    pub fn flags(&self, held: &Held<'_, ()>) -> GemFlags {
        self.state.with(held, |s| {
            let mut flags = GemFlags::empty();
            flags.set(GemFlags::HAS_PAGES, s.pages.is_some());
            flags.set(GemFlags::VMAPPED, s.vaddr.is_some());
            flags.set(GemFlags::ACTIVE, s.active);
            flags.set(GemFlags::IMPORTED, s.imported);
            flags.set(GemFlags::PURGED, s.madv == Madv::Purged);
            flags
        })
    }

    // =========================================================================
    // RECLAIM
    // =========================================================================

    /// A backing storage pode ser descartada?
    pub fn is_purgeable(&self, held: &Held<'_, ()>) -> bool {
        self.state.with(held, |s| s.is_purgeable())
    }

    /// O vmap pode ser derrubado sem tocar na storage?
    pub fn is_vunmapable(&self, held: &Held<'_, ()>) -> bool {
        self.state.with(held, |s| s.is_vunmapable())
    }

    /// Descarta a backing storage. Purgar implica derrubar o vmap.
    ///
    /// Retorna `false` (sem efeito) se o objeto não for purgeable.
    pub fn purge(&self, held: &Held<'_, ()>) -> bool {
        let id = self.id;
        self.state.with(held, |s| s.purge(id))
    }

    /// Derruba apenas o vmap, mantendo a storage.
    ///
    /// Retorna `false` (sem efeito) se o objeto não for vunmapable.
    pub fn vunmap(&self, held: &Held<'_, ()>) -> bool {
        self.state.with(held, |s| s.vunmap())
    }
}

impl ObjectState {
    /// O conteúdo ainda pode ganhar storage?
    fn check_usable(&self) -> MmResult<()> {
        match self.madv {
            Madv::WillNeed => Ok(()),
            Madv::DontNeed => Err(MmError::Busy),
            Madv::Purged => Err(MmError::Purged),
        }
    }

    pub(crate) fn is_purgeable(&self) -> bool {
        self.madv == Madv::DontNeed && self.pages.is_some() && !self.imported
    }

    pub(crate) fn is_vunmapable(&self) -> bool {
        self.vmap_count == 0 && self.vaddr.is_some()
    }

    pub(crate) fn purge(&mut self, id: u64) -> bool {
        if !self.is_purgeable() {
            return false;
        }

        if self.vmap_count != 0 {
            crate::kwarn!("(GEM) purge com vmap em uso, obj=", id);
        }
        self.vaddr = None;
        self.vmap_count = 0;
        self.pages = None;
        self.madv = Madv::Purged;
        true
    }

    pub(crate) fn vunmap(&mut self) -> bool {
        if !self.is_vunmapable() {
            return false;
        }
        self.vaddr = None;
        true
    }
}

fn alloc_storage(size: usize) -> MmResult<Box<[u8]>> {
    let mut storage = Vec::new();
    storage
        .try_reserve_exact(size)
        .map_err(|_| MmError::OutOfMemory)?;
    storage.resize(size, 0u8);
    Ok(storage.into_boxed_slice())
}
