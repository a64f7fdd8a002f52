//! # GEM Device
//!
//! Dono do `struct_mutex`, das listas de objetos e do slot de binding do
//! shrinker.
//!
//! ## Listas
//!
//! ```text
//! inactive: objetos sem trabalho de GPU pendente (ordem = ordem de scan)
//! active:   objetos referenciados por submits em voo
//! ```
//!
//! Um objeto está em exatamente uma das listas desde `new_object` até
//! `free_object`. Entrar na lista inativa é sempre pelo fim.
//!
//! Todos os métodos que tocam listas ou objetos exigem `Held` do
//! `struct_mutex` deste device.
//!
//! As listas só crescem com capacidade já reservada: a alocação acontece
//! fora do acesso às listas, porque pode rodar o shrinker na mesma task.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::ops::ControlFlow;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::mm::config::page_align_up;
use crate::mm::{MmError, MmResult, ShrinkerConfig};
use crate::sync::{Held, Locked, Mutex, MutexGuard};

use super::object::GemObject;
use super::shrinker::ShrinkerBinding;
use super::trace::GemTrace;

struct GemLists {
    inactive: Vec<Arc<GemObject>>,
    active: Vec<Arc<GemObject>>,
}

#[derive(Clone, Copy)]
enum ListKind {
    Inactive,
    Active,
}

impl GemLists {
    fn get_mut(&mut self, kind: ListKind) -> &mut Vec<Arc<GemObject>> {
        match kind {
            ListKind::Inactive => &mut self.inactive,
            ListKind::Active => &mut self.active,
        }
    }
}

pub struct GemDevice {
    struct_mutex: Arc<Mutex<()>>,
    lists: Locked<GemLists>,
    next_id: AtomicU64,
    config: ShrinkerConfig,
    trace: GemTrace,
    /// Registro do shrinker (preenchido por `shrinker::init`)
    shrinker: spin::Mutex<Option<ShrinkerBinding>>,
}

impl GemDevice {
    pub fn new(config: ShrinkerConfig) -> Arc<Self> {
        let struct_mutex = Arc::new(Mutex::new(()));
        let lists = Locked::new(
            &struct_mutex,
            GemLists {
                inactive: Vec::new(),
                active: Vec::new(),
            },
        );

        Arc::new(Self {
            struct_mutex,
            lists,
            next_id: AtomicU64::new(1),
            config,
            trace: GemTrace::new(),
            shrinker: spin::Mutex::new(None),
        })
    }

    pub fn struct_mutex(&self) -> &Mutex<()> {
        &self.struct_mutex
    }

    /// Adquire o `struct_mutex` (pode bloquear).
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.struct_mutex.lock()
    }

    /// Tenta adquirir o `struct_mutex` sem bloquear.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, ()>> {
        self.struct_mutex.try_lock()
    }

    pub fn config(&self) -> &ShrinkerConfig {
        &self.config
    }

    pub fn trace(&self) -> &GemTrace {
        &self.trace
    }

    pub(crate) fn shrinker_slot(&self) -> &spin::Mutex<Option<ShrinkerBinding>> {
        &self.shrinker
    }

    // =========================================================================
    // CICLO DE VIDA DOS OBJETOS
    // =========================================================================

    /// Cria objeto de `size` bytes (arredondado para página), no fim da
    /// lista inativa.
    pub fn new_object(&self, held: &Held<'_, ()>, size: usize) -> MmResult<Arc<GemObject>> {
        if size == 0 {
            return Err(MmError::InvalidSize);
        }

        let size = page_align_up(size).ok_or(MmError::InvalidSize)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let obj = Arc::new(GemObject::new(&self.struct_mutex, id, size));

        self.reserve_slot(held, ListKind::Inactive)?;
        self.lists
            .with(held, |lists| lists.inactive.push(Arc::clone(&obj)));

        crate::ktrace!("(GEM) Objeto criado id=", id);
        Ok(obj)
    }

    /// Objeto passou a ser usado pela GPU: sai da lista inativa.
    pub fn move_to_active(&self, held: &Held<'_, ()>, obj: &Arc<GemObject>) -> MmResult<()> {
        self.check_owner(obj)?;

        let already = self.lists.with(held, |lists| -> MmResult<bool> {
            if contains(&lists.active, obj) {
                return Ok(true);
            }
            position(&lists.inactive, obj).ok_or(MmError::InvalidObject)?;
            Ok(false)
        })?;
        if already {
            return Ok(());
        }

        self.reserve_slot(held, ListKind::Active)?;
        self.lists.with(held, |lists| -> MmResult<()> {
            let pos = position(&lists.inactive, obj).ok_or(MmError::InvalidObject)?;
            let obj = lists.inactive.remove(pos);
            lists.active.push(obj);
            Ok(())
        })?;

        obj.with_state(held, |s| s.active = true);
        Ok(())
    }

    /// GPU terminou com o objeto: volta para o fim da lista inativa.
    pub fn move_to_inactive(&self, held: &Held<'_, ()>, obj: &Arc<GemObject>) -> MmResult<()> {
        self.check_owner(obj)?;

        let already = self.lists.with(held, |lists| -> MmResult<bool> {
            if contains(&lists.inactive, obj) {
                return Ok(true);
            }
            position(&lists.active, obj).ok_or(MmError::InvalidObject)?;
            Ok(false)
        })?;
        if already {
            return Ok(());
        }

        self.reserve_slot(held, ListKind::Inactive)?;
        self.lists.with(held, |lists| -> MmResult<()> {
            let pos = position(&lists.active, obj).ok_or(MmError::InvalidObject)?;
            let obj = lists.active.remove(pos);
            lists.inactive.push(obj);
            Ok(())
        })?;

        obj.with_state(held, |s| s.active = false);
        Ok(())
    }

    /// Remove o objeto do device e descarta sua storage.
    pub fn free_object(&self, held: &Held<'_, ()>, obj: &Arc<GemObject>) -> MmResult<()> {
        self.check_owner(obj)?;

        self.lists.with(held, |lists| -> MmResult<()> {
            if let Some(pos) = position(&lists.inactive, obj) {
                lists.inactive.remove(pos);
            } else if let Some(pos) = position(&lists.active, obj) {
                lists.active.remove(pos);
            } else {
                return Err(MmError::InvalidObject);
            }
            Ok(())
        })?;

        obj.put_pages(held);
        obj.with_state(held, |s| s.active = false);
        crate::ktrace!("(GEM) Objeto liberado id=", obj.id());
        Ok(())
    }

    // =========================================================================
    // CONSULTA DAS LISTAS
    // =========================================================================

    pub fn inactive_len(&self, held: &Held<'_, ()>) -> usize {
        self.lists.with(held, |lists| lists.inactive.len())
    }

    pub fn active_len(&self, held: &Held<'_, ()>) -> usize {
        self.lists.with(held, |lists| lists.active.len())
    }

    /// Cópia da lista inativa, em ordem de scan.
    pub fn inactive_objects(&self, held: &Held<'_, ()>) -> Vec<Arc<GemObject>> {
        let len = self.lists.with(held, |lists| lists.inactive.len());
        let mut copy = Vec::with_capacity(len);
        self.lists.with(held, |lists| {
            copy.extend(lists.inactive.iter().take(len).cloned())
        });
        copy
    }

    /// Percorre a lista inativa em ordem até `f` pedir `Break`.
    ///
    /// Retorna `false` sem chamar `f` se as listas já estiverem abertas mais
    /// acima na pilha (shrinker reentrante). `f` não pode mexer nas listas
    /// do device, mas pode operar sobre os objetos.
    pub fn try_for_each_inactive(
        &self,
        held: &Held<'_, ()>,
        mut f: impl FnMut(&GemObject) -> ControlFlow<()>,
    ) -> bool {
        self.lists
            .try_with(held, |lists| {
                for obj in lists.inactive.iter() {
                    if f(obj).is_break() {
                        break;
                    }
                }
            })
            .is_some()
    }

    /// Garante espaço para mais um objeto na lista `kind`.
    ///
    /// Aloca o vetor maior fora de `lists.with` e só troca os elementos de
    /// lugar lá dentro.
    fn reserve_slot(&self, held: &Held<'_, ()>, kind: ListKind) -> MmResult<()> {
        let (len, cap) = self.lists.with(held, |lists| {
            let list = lists.get_mut(kind);
            (list.len(), list.capacity())
        });
        if len < cap {
            return Ok(());
        }

        let mut grown: Vec<Arc<GemObject>> = Vec::new();
        grown
            .try_reserve_exact(core::cmp::max(len * 2, 4))
            .map_err(|_| MmError::OutOfMemory)?;

        self.lists.with(held, move |lists| {
            let list = lists.get_mut(kind);
            if list.len() < list.capacity() {
                return Ok(());
            }
            if grown.capacity() <= list.len() {
                return Err(MmError::OutOfMemory);
            }
            grown.append(list);
            core::mem::swap(list, &mut grown);
            Ok(())
        })
    }

    fn check_owner(&self, obj: &GemObject) -> MmResult<()> {
        if obj.is_guarded_by(&self.struct_mutex) {
            Ok(())
        } else {
            Err(MmError::InvalidObject)
        }
    }
}

fn position(list: &[Arc<GemObject>], obj: &Arc<GemObject>) -> Option<usize> {
    list.iter().position(|o| Arc::ptr_eq(o, obj))
}

fn contains(list: &[Arc<GemObject>], obj: &Arc<GemObject>) -> bool {
    position(list, obj).is_some()
}
