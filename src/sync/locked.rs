//! Dados protegidos por um lock externo
//!
//! `Locked<T>` guarda um valor que pertence ao domínio de um `Mutex<()>`
//! (no GEM, o `struct_mutex` do device) sem ser o conteúdo do mutex.
//! Todo acesso passa por `with`, que exige a prova `Held` e confere:
//!
//! 1. A prova é do mutex certo.
//! 2. A task corrente é a dona do mutex.
//! 3. Não há outro `with` aberto no mesmo valor (reentrância aninhada).
//!
//! Código que pode rodar reentrante (o shrinker, chamado de dentro de uma
//! alocação) usa `try_with`, que devolve `None` em vez de falhar no caso 3.

use alloc::sync::Arc;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

use super::mutex::{Held, Mutex};

pub struct Locked<T> {
    /// Mutex que protege o valor
    lock: Arc<Mutex<()>>,
    /// Há um `with` em andamento?
    borrowed: AtomicBool,
    data: UnsafeCell<T>,
}

// SAFETY: acesso a `data` só acontece sob o mutex referenciado por `lock`.
unsafe impl<T: Send> Send for Locked<T> {}
unsafe impl<T: Send> Sync for Locked<T> {}

impl<T> Locked<T> {
    /// Associa `data` ao mutex `lock`.
    pub fn new(lock: &Arc<Mutex<()>>, data: T) -> Self {
        Self {
            lock: Arc::clone(lock),
            borrowed: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    /// Executa `f` com acesso exclusivo ao valor.
    ///
    /// # Panics
    ///
    /// Se `held` for de outro mutex, se a task corrente não for a dona, ou
    /// se já houver um `with` aberto neste valor.
    #[track_caller]
    pub fn with<R>(&self, held: &Held<'_, ()>, f: impl FnOnce(&mut T) -> R) -> R {
        match self.try_with(held, f) {
            Some(r) => r,
            None => panic!("Locked: acesso aninhado"),
        }
    }

    /// Como `with`, mas retorna `None` se já houver um `with` aberto neste
    /// valor mais acima na pilha.
    ///
    /// # Panics
    ///
    /// Se `held` for de outro mutex ou se a task corrente não for a dona.
    #[track_caller]
    pub fn try_with<R>(&self, held: &Held<'_, ()>, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        assert!(
            core::ptr::eq(held.mutex(), Arc::as_ptr(&self.lock)),
            "Locked: prova de lock de outro mutex"
        );
        held.mutex().assert_held();

        if self.borrowed.swap(true, Ordering::Acquire) {
            return None;
        }

        let _release = BorrowRelease(&self.borrowed);
        // SAFETY: a task corrente segura o mutex e `borrowed` garante que não
        // há outra referência viva para `data`.
        Some(f(unsafe { &mut *self.data.get() }))
    }

    /// Este valor é protegido por `lock`?
    pub fn is_guarded_by(&self, lock: &Mutex<()>) -> bool {
        core::ptr::eq(lock, Arc::as_ptr(&self.lock))
    }
}

struct BorrowRelease<'a>(&'a AtomicBool);

impl Drop for BorrowRelease<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
