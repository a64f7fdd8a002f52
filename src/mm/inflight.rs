//! Contador de callbacks em andamento
//!
//! Registros chamam callbacks fora do próprio lock. Cada entrada carrega um
//! `InFlight`; quem chama entra nele (ainda sob o lock de leitura) e sai ao
//! terminar. Remover a entrada e esperar `wait_idle` garante que nenhum
//! callback dela continua rodando.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicUsize, Ordering};

pub(crate) struct InFlight {
    calls: Arc<AtomicUsize>,
}

impl InFlight {
    pub(crate) fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Marca uma chamada em andamento até o guard cair.
    pub(crate) fn enter(&self) -> InFlightGuard {
        self.calls.fetch_add(1, Ordering::AcqRel);
        InFlightGuard(Arc::clone(&self.calls))
    }

    /// Espera (spin) todas as chamadas em andamento terminarem.
    ///
    /// Não pode ser chamada de dentro de um callback da mesma entrada.
    pub(crate) fn wait_idle(&self) {
        while self.calls.load(Ordering::Acquire) != 0 {
            core::hint::spin_loop();
        }
    }

    #[cfg(test)]
    pub(crate) fn active(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }
}

pub(crate) struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_track_active_calls() {
        let inflight = InFlight::new();
        let a = inflight.enter();
        let b = inflight.enter();
        assert_eq!(inflight.active(), 2);

        drop(a);
        drop(b);
        assert_eq!(inflight.active(), 0);
        inflight.wait_idle();
    }
}
