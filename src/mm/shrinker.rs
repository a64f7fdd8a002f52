//! # Framework de Pressão de Memória (Shrinkers)
//!
//! Subsistemas que seguram memória recuperável registram um `Shrinker` com
//! dois pontos de entrada:
//!
//! - `count_objects`: estimativa de páginas recuperáveis, nunca bloqueia.
//!   Zero significa "nada disponível" OU "lock ocupado".
//! - `scan_objects`: tenta liberar até `nr_to_scan` páginas. Retorna o que
//!   liberou ou `ScanResult::Stop` ("não deu para tentar, recue").
//!
//! O registro é um valor comum (sem singleton global). Quem hospeda o kernel
//! cria um `ShrinkerRegistry` e o repassa a quem precisa registrar.
//!
//! Ciclo de vida de um shrinker:
//!
//! ```text
//! alloc(name) ──▶ register(id, shrinker) ──▶ ... shrink() ... ──▶ free(id)
//! ```
//!
//! `free` é síncrono: depois que retorna, nenhum callback daquele shrinker
//! está rodando nem vai rodar. Por isso `free` não pode ser chamado de
//! dentro de um callback do próprio shrinker.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use spin::RwLock;

use super::config::SHRINK_BATCH;
use super::error::{MmError, MmResult};
use super::inflight::{InFlight, InFlightGuard};

/// Valor bruto de "pare" no ABI do framework
pub const SHRINK_STOP: usize = usize::MAX - 1;

/// Parâmetros de uma chamada ao shrinker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShrinkControl {
    /// Páginas que o framework quer de volta nesta chamada
    pub nr_to_scan: usize,
}

impl ShrinkControl {
    pub const fn new(nr_to_scan: usize) -> Self {
        Self { nr_to_scan }
    }
}

/// Resultado de `scan_objects`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanResult {
    /// Tentou; liberou este número de páginas (pode ser zero)
    Freed(usize),
    /// Não conseguiu tentar. O framework deve recuar.
    Stop,
}

impl ScanResult {
    /// Converte para o valor bruto do ABI.
    pub const fn into_raw(self) -> usize {
        match self {
            Self::Freed(n) => n,
            Self::Stop => SHRINK_STOP,
        }
    }

    /// Páginas liberadas (zero para `Stop`).
    pub const fn freed(self) -> usize {
        match self {
            Self::Freed(n) => n,
            Self::Stop => 0,
        }
    }
}

/// Contrato de um shrinker
pub trait Shrinker: Send + Sync {
    /// Estimativa de páginas recuperáveis. Nunca bloqueia.
    fn count_objects(&self, sc: &ShrinkControl) -> usize;

    /// Libera até `sc.nr_to_scan` páginas.
    fn scan_objects(&self, sc: &ShrinkControl) -> ScanResult;
}

/// Handle de um shrinker alocado
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShrinkerId(u64);

struct ShrinkerEntry {
    id: ShrinkerId,
    name: &'static str,
    seeks: u32,
    /// None = alocado mas ainda não registrado
    shrinker: Option<Arc<dyn Shrinker>>,
    in_flight: InFlight,
}

/// Registro de shrinkers do sistema
pub struct ShrinkerRegistry {
    entries: RwLock<Vec<ShrinkerEntry>>,
    capacity: usize,
    next_id: AtomicU64,
}

impl ShrinkerRegistry {
    /// Cria registro que aceita até `capacity` handles.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            capacity,
            next_id: AtomicU64::new(1),
        }
    }

    /// Aloca um handle. Ainda não recebe chamadas até `register`.
    pub fn alloc(&self, name: &'static str, seeks: u32) -> MmResult<ShrinkerId> {
        let mut entries = self.entries.write();

        if entries.len() >= self.capacity {
            crate::kwarn!("(Shrinker) Registro cheio, alloc negado");
            return Err(MmError::OutOfMemory);
        }
        entries.try_reserve(1).map_err(|_| MmError::OutOfMemory)?;

        let id = ShrinkerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        entries.push(ShrinkerEntry {
            id,
            name,
            seeks,
            shrinker: None,
            in_flight: InFlight::new(),
        });

        crate::kdebug!("(Shrinker) Handle alocado id=", id.0);
        Ok(id)
    }

    /// Instala os callbacks de um handle alocado.
    pub fn register(&self, id: ShrinkerId, shrinker: Arc<dyn Shrinker>) -> MmResult<()> {
        let mut entries = self.entries.write();
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(MmError::NotFound)?;

        if entry.shrinker.is_some() {
            return Err(MmError::AlreadyRegistered);
        }
        entry.shrinker = Some(shrinker);

        crate::kinfo!("(Shrinker) Registrado id=", id.0);
        Ok(())
    }

    /// Desregistra (se registrado) e libera o handle.
    ///
    /// Espera os callbacks em andamento deste shrinker terminarem.
    pub fn free(&self, id: ShrinkerId) -> MmResult<()> {
        let entry = {
            let mut entries = self.entries.write();
            let pos = entries
                .iter()
                .position(|e| e.id == id)
                .ok_or(MmError::NotFound)?;
            entries.remove(pos)
        };

        entry.in_flight.wait_idle();

        crate::kdebug!("(Shrinker) Handle liberado id=", id.0);
        Ok(())
    }

    /// O handle existe e tem callbacks instalados?
    pub fn is_registered(&self, id: ShrinkerId) -> bool {
        self.entries
            .read()
            .iter()
            .any(|e| e.id == id && e.shrinker.is_some())
    }

    /// Nome e seeks de um handle.
    pub fn info(&self, id: ShrinkerId) -> Option<(&'static str, u32)> {
        self.entries
            .read()
            .iter()
            .find(|e| e.id == id)
            .map(|e| (e.name, e.seeks))
    }

    /// Número de handles alocados.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pede até `nr_to_scan` páginas a cada shrinker registrado.
    ///
    /// Para cada shrinker: conta, e se houver algo, varre em lotes de
    /// `SHRINK_BATCH`. Um `Stop` ou um lote sem progresso encerra aquele
    /// shrinker. Retorna o total liberado.
    pub fn shrink(&self, nr_to_scan: usize) -> usize {
        // Callbacks rodam fora do lock do registro; o guard segura `free`.
        let snapshot: Vec<(Arc<dyn Shrinker>, InFlightGuard)> = self
            .entries
            .read()
            .iter()
            .filter_map(|e| e.shrinker.clone().map(|s| (s, e.in_flight.enter())))
            .collect();

        let mut freed = 0usize;
        for (shrinker, guard) in snapshot {
            freed += do_shrink(shrinker.as_ref(), nr_to_scan);
            drop(guard);
        }

        crate::ktrace!("(Shrinker) shrink total freed=", freed);
        freed
    }
}

impl Default for ShrinkerRegistry {
    fn default() -> Self {
        Self::new(super::config::MAX_SHRINKERS)
    }
}

fn do_shrink(shrinker: &dyn Shrinker, nr_to_scan: usize) -> usize {
    let freeable = shrinker.count_objects(&ShrinkControl::new(0));
    if freeable == 0 {
        return 0;
    }

    let mut total_scan = core::cmp::min(nr_to_scan, freeable);
    let mut freed = 0usize;

    while total_scan > 0 {
        let batch = core::cmp::min(total_scan, SHRINK_BATCH);
        match shrinker.scan_objects(&ShrinkControl::new(batch)) {
            ScanResult::Stop => break,
            ScanResult::Freed(0) => break,
            ScanResult::Freed(n) => freed += n,
        }
        total_scan -= batch;
    }

    freed
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicBool, AtomicUsize};

    /// Shrinker de teste com estoque fixo de páginas.
    struct Stock {
        pages: AtomicUsize,
        stop: bool,
        scans: AtomicUsize,
    }

    impl Stock {
        fn new(pages: usize, stop: bool) -> Arc<Self> {
            Arc::new(Self {
                pages: AtomicUsize::new(pages),
                stop,
                scans: AtomicUsize::new(0),
            })
        }
    }

    impl Shrinker for Stock {
        fn count_objects(&self, _sc: &ShrinkControl) -> usize {
            self.pages.load(Ordering::Relaxed)
        }

        fn scan_objects(&self, sc: &ShrinkControl) -> ScanResult {
            self.scans.fetch_add(1, Ordering::Relaxed);
            if self.stop {
                return ScanResult::Stop;
            }
            let have = self.pages.load(Ordering::Relaxed);
            let take = core::cmp::min(have, sc.nr_to_scan);
            self.pages.store(have - take, Ordering::Relaxed);
            ScanResult::Freed(take)
        }
    }

    #[test]
    fn raw_values_match_abi() {
        assert_eq!(ScanResult::Stop.into_raw(), SHRINK_STOP);
        assert_eq!(ScanResult::Freed(3).into_raw(), 3);
        assert_eq!(ScanResult::Stop.freed(), 0);
        assert_ne!(ScanResult::Freed(0), ScanResult::Stop);
    }

    #[test]
    fn alloc_respects_capacity() {
        let reg = ShrinkerRegistry::new(1);
        let id = reg.alloc("a", 2).unwrap();
        assert_eq!(reg.alloc("b", 2), Err(MmError::OutOfMemory));

        reg.free(id).unwrap();
        assert!(reg.alloc("b", 2).is_ok());
    }

    #[test]
    fn register_lifecycle() {
        let reg = ShrinkerRegistry::default();
        let id = reg.alloc("stock", 2).unwrap();
        assert!(!reg.is_registered(id));
        assert_eq!(reg.info(id), Some(("stock", 2)));

        reg.register(id, Stock::new(1, false)).unwrap();
        assert!(reg.is_registered(id));
        assert_eq!(
            reg.register(id, Stock::new(1, false)),
            Err(MmError::AlreadyRegistered)
        );

        reg.free(id).unwrap();
        assert!(!reg.is_registered(id));
        assert_eq!(reg.free(id), Err(MmError::NotFound));
        assert!(reg.is_empty());
    }

    #[test]
    fn shrink_scans_in_batches_up_to_request() {
        let reg = ShrinkerRegistry::default();
        let stock = Stock::new(1000, false);
        let id = reg.alloc("stock", 2).unwrap();
        reg.register(id, stock.clone()).unwrap();

        assert_eq!(reg.shrink(300), 300);
        // 128 + 128 + 44
        assert_eq!(stock.scans.load(Ordering::Relaxed), 3);
        assert_eq!(stock.pages.load(Ordering::Relaxed), 700);
    }

    #[test]
    fn shrink_backs_off_on_stop() {
        let reg = ShrinkerRegistry::default();
        let stock = Stock::new(1000, true);
        let id = reg.alloc("stuck", 2).unwrap();
        reg.register(id, stock.clone()).unwrap();

        assert_eq!(reg.shrink(1000), 0);
        assert_eq!(stock.scans.load(Ordering::Relaxed), 1);
    }

    /// Shrinker que fica preso no scan até ser liberado.
    struct Gate {
        entered: AtomicBool,
        release: AtomicBool,
    }

    impl Shrinker for Gate {
        fn count_objects(&self, _sc: &ShrinkControl) -> usize {
            1
        }

        fn scan_objects(&self, _sc: &ShrinkControl) -> ScanResult {
            self.entered.store(true, Ordering::Release);
            while !self.release.load(Ordering::Acquire) {
                core::hint::spin_loop();
            }
            ScanResult::Freed(1)
        }
    }

    #[test]
    fn free_waits_for_running_scan() {
        let reg = Arc::new(ShrinkerRegistry::default());
        let gate = Arc::new(Gate {
            entered: AtomicBool::new(false),
            release: AtomicBool::new(false),
        });
        let id = reg.alloc("gate", 2).unwrap();
        reg.register(id, gate.clone()).unwrap();

        let shrinking = {
            let reg = Arc::clone(&reg);
            std::thread::spawn(move || reg.shrink(1))
        };
        while !gate.entered.load(Ordering::Acquire) {
            core::hint::spin_loop();
        }

        let done = Arc::new(AtomicBool::new(false));
        let freeing = {
            let reg = Arc::clone(&reg);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                reg.free(id).unwrap();
                done.store(true, Ordering::Release);
            })
        };

        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(!done.load(Ordering::Acquire), "free voltou com scan em andamento");

        gate.release.store(true, Ordering::Release);
        freeing.join().unwrap();
        assert_eq!(shrinking.join().unwrap(), 1);
        assert!(done.load(Ordering::Acquire));
        assert!(reg.is_empty());
    }

    #[test]
    fn shrink_skips_empty_shrinkers() {
        let reg = ShrinkerRegistry::default();
        let stock = Stock::new(0, false);
        let id = reg.alloc("empty", 2).unwrap();
        reg.register(id, stock.clone()).unwrap();

        assert_eq!(reg.shrink(64), 0);
        assert_eq!(stock.scans.load(Ordering::Relaxed), 0);
    }
}
