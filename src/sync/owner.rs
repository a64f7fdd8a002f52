//! Identidade da task corrente
//!
//! O `Mutex` do device grava aqui o dono do lock para poder distinguir
//! "outra task segura o lock" de "eu mesmo já seguro o lock".
//!
//! O kernel hospedeiro registra a fonte de identidade com
//! `set_current_task_fn`. Em ambiente hosted (`std` ou testes) cada thread do
//! sistema operacional recebe um id próprio.
//!
//! Sem nenhuma das duas fontes todas as tasks aparecem como `BOOT_TASK`, e
//! "sou eu o dono" deixa de ser verificável: `is_tracked()` retorna `false`
//! e o `Mutex` não reconhece reentrância (ver `Mutex::trylock_recursive`).

use core::sync::atomic::{AtomicPtr, Ordering};

/// Id de uma task. Zero é reservado para "sem dono".
pub type TaskId = u64;

/// Valor de `owner` quando o lock está livre.
pub const NO_OWNER: TaskId = 0;

/// Task usada antes do scheduler existir (boot single-thread).
pub const BOOT_TASK: TaskId = 1;

static CURRENT_FN: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

/// Registra a função que retorna o id da task corrente.
///
/// A função nunca deve retornar `NO_OWNER`.
pub fn set_current_task_fn(f: fn() -> TaskId) {
    CURRENT_FN.store(f as *mut (), Ordering::Release);
}

/// Ids distintos por task estão disponíveis?
pub fn is_tracked() -> bool {
    HOSTED || !CURRENT_FN.load(Ordering::Acquire).is_null()
}

const HOSTED: bool = cfg!(any(test, feature = "std"));

/// Retorna o id da task que está executando.
pub fn current() -> TaskId {
    let raw = CURRENT_FN.load(Ordering::Acquire);
    if !raw.is_null() {
        // SAFETY: só `set_current_task_fn` armazena valores não-nulos, sempre
        // um `fn() -> TaskId` válido.
        let f = unsafe { core::mem::transmute::<*mut (), fn() -> TaskId>(raw) };
        return f();
    }
    fallback()
}

#[cfg(any(test, feature = "std"))]
fn fallback() -> TaskId {
    extern crate std;

    use core::sync::atomic::AtomicU64;

    // Ids hosted começam depois de BOOT_TASK.
    static NEXT_ID: AtomicU64 = AtomicU64::new(BOOT_TASK + 1);

    std::thread_local! {
        static THREAD_ID: TaskId = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    }

    THREAD_ID.with(|id| *id)
}

#[cfg(not(any(test, feature = "std")))]
fn fallback() -> TaskId {
    BOOT_TASK
}
