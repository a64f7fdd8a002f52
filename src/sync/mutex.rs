//! Mutex com dono rastreado
//!
//! Base do `struct_mutex` do device GEM. Além de `lock`/`try_lock`, expõe
//! `trylock_recursive`, que distingue três situações sem nunca bloquear:
//!
//! ```text
//! Failed     → outra task segura o lock
//! Success    → adquirido agora, quem chamou DEVE liberar
//! Recursive  → a task corrente já segura o lock, quem chamou NÃO libera
//! ```
//!
//! O caso `Recursive` não entrega acesso a `T`: o dono externo pode estar com
//! um `&mut T` vivo na pilha. Quem precisa do dado protegido sob reentrância
//! usa `Locked<T>` (ver `sync::locked`) com a prova `Held`.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::owner::{self, TaskId, NO_OWNER};

/// Mutex - bloqueia (spin) se não conseguir lock
///
/// # Diferença do Spinlock
///
/// - Mutex registra o dono, permitindo detectar reentrância
/// - `lock()` da mesma task que já é dona é erro de programação
pub struct Mutex<T> {
    /// Estado do lock
    locked: AtomicBool,
    /// Task dona do lock (`NO_OWNER` se livre)
    owner: AtomicU64,
    /// Dados protegidos
    data: UnsafeCell<T>,
}

// SAFETY: Mutex protege acesso com lock
unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

/// Resultado de `Mutex::trylock_recursive`.
#[must_use]
pub enum TrylockRecursive<'a, T> {
    /// Lock ocupado por outra task.
    Failed,
    /// Lock adquirido agora. Liberado quando o guard sair de escopo.
    Success(MutexGuard<'a, T>),
    /// A task corrente já era dona do lock.
    Recursive(Held<'a, T>),
}

impl<T> Mutex<T> {
    pub const fn new(data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            owner: AtomicU64::new(NO_OWNER),
            data: UnsafeCell::new(data),
        }
    }

    /// Adquire o lock (pode bloquear)
    pub fn lock(&self) -> MutexGuard<'_, T> {
        let me = owner::current();
        debug_assert!(
            !owner::is_tracked() || self.owner.load(Ordering::Relaxed) != me,
            "Mutex::lock recursivo (use trylock_recursive)"
        );

        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }

        self.owner.store(me, Ordering::Relaxed);
        MutexGuard { lock: self }
    }

    /// Tenta adquirir sem bloquear
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        let me = owner::current();
        self.try_acquire(me).then(|| MutexGuard { lock: self })
    }

    /// Tenta adquirir sem bloquear, detectando se a task corrente já é dona.
    ///
    /// Sem identidade de task (`owner::is_tracked() == false`) um lock
    /// ocupado é sempre `Failed`, mesmo que seja da própria task.
    pub fn trylock_recursive(&self) -> TrylockRecursive<'_, T> {
        self.trylock_recursive_as(owner::current(), owner::is_tracked())
    }

    fn trylock_recursive_as(&self, me: TaskId, tracked: bool) -> TrylockRecursive<'_, T> {
        // Só a própria task grava seu id em `owner`, então ver `me` aqui
        // significa que ela segura o lock agora.
        if self.owner.load(Ordering::Relaxed) == me {
            if !tracked {
                return TrylockRecursive::Failed;
            }
            return TrylockRecursive::Recursive(Held { lock: self });
        }

        if self.try_acquire(me) {
            TrylockRecursive::Success(MutexGuard { lock: self })
        } else {
            TrylockRecursive::Failed
        }
    }

    /// A task corrente segura este lock?
    pub fn is_locked_by_current(&self) -> bool {
        self.owner.load(Ordering::Relaxed) == owner::current()
    }

    /// O lock está ocupado (por qualquer task)?
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    /// Falha se a task corrente não segura o lock.
    #[track_caller]
    pub fn assert_held(&self) {
        assert!(
            self.is_locked_by_current(),
            "Mutex: acesso sem segurar o lock"
        );
    }

    fn try_acquire(&self, me: TaskId) -> bool {
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            self.owner.store(me, Ordering::Relaxed);
            true
        } else {
            false
        }
    }
}

pub struct MutexGuard<'a, T> {
    lock: &'a Mutex<T>,
}

impl<'a, T> MutexGuard<'a, T> {
    /// Prova de posse do lock, válida enquanto o guard viver.
    pub fn held(&self) -> Held<'_, T> {
        Held { lock: self.lock }
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: Lock está adquirido
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: Lock está adquirido
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.owner.store(NO_OWNER, Ordering::Relaxed);
        self.lock.locked.store(false, Ordering::Release);
    }
}

/// Prova de que a task corrente segura um `Mutex`.
///
/// Só pode ser obtida de um `MutexGuard` ou de `TrylockRecursive::Recursive`.
/// Não libera nada ao sair de escopo.
pub struct Held<'a, T> {
    lock: &'a Mutex<T>,
}

impl<'a, T> Held<'a, T> {
    /// O mutex a que esta prova se refere.
    pub fn mutex(&self) -> &'a Mutex<T> {
        self.lock
    }
}

impl<T> Clone for Held<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Held<'_, T> {}
