//! Testes do shrinker GEM
//!
//! Cobrem as três passadas (count, scan, purge de vmap), o comportamento com
//! lock ocupado e com lock reentrante, e o ciclo init/cleanup contra os
//! registros do framework.

use alloc::sync::Arc;
use alloc::vec::Vec;
use std::sync::mpsc;
use std::thread;

use crate::mm::config::{pages_to_bytes, PAGE_SIZE};
use crate::mm::{
    MmError, NotifyResult, ScanResult, ShrinkControl, Shrinker, ShrinkerConfig, ShrinkerRegistry,
    VmapPurgeChain,
};

use super::device::GemDevice;
use super::object::{GemObject, Madv};
use super::shrinker::{self, GemShrinker, ShrinkerLock};
use super::trace::TraceStats;

fn device() -> Arc<GemDevice> {
    GemDevice::new(ShrinkerConfig::default())
}

/// Cria objetos com os tamanhos dados (em páginas), com páginas e DontNeed.
fn purgeable_objects(dev: &GemDevice, sizes: &[usize]) -> Vec<Arc<GemObject>> {
    let guard = dev.lock();
    let held = guard.held();

    sizes
        .iter()
        .map(|&pages| {
            let obj = dev.new_object(&held, pages * PAGE_SIZE).unwrap();
            obj.get_pages(&held).unwrap();
            obj.madvise(&held, Madv::DontNeed);
            obj
        })
        .collect()
}

/// Cria `n` objetos de uma página com vmap em cache e sem usuários.
fn vunmapable_objects(dev: &GemDevice, n: usize) -> Vec<Arc<GemObject>> {
    let guard = dev.lock();
    let held = guard.held();

    (0..n)
        .map(|_| {
            let obj = dev.new_object(&held, PAGE_SIZE).unwrap();
            obj.vmap(&held).unwrap();
            obj.put_vaddr(&held);
            obj
        })
        .collect()
}

/// Roda `f` enquanto outra thread segura o `struct_mutex`.
fn with_lock_held_elsewhere<R>(dev: &Arc<GemDevice>, f: impl FnOnce() -> R) -> R {
    let (locked_tx, locked_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let holder = {
        let dev = Arc::clone(dev);
        thread::spawn(move || {
            let _guard = dev.lock();
            locked_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        })
    };

    locked_rx.recv().unwrap();
    let result = f();
    release_tx.send(()).unwrap();
    holder.join().unwrap();
    result
}

// =============================================================================
// COUNT
// =============================================================================

#[test]
fn count_sums_purgeable_pages() {
    let dev = device();
    purgeable_objects(&dev, &[4, 8, 2]);
    let shrinker = GemShrinker::new(Arc::clone(&dev));

    assert_eq!(shrinker.count(), 14);
    // Sem mutação entre as chamadas, mesmo resultado.
    assert_eq!(shrinker.count(), 14);
}

#[test]
fn count_skips_objects_that_are_not_purgeable() {
    let dev = device();
    let objs = purgeable_objects(&dev, &[1, 2, 4, 8]);

    {
        let guard = dev.lock();
        let held = guard.held();
        objs[0].madvise(&held, Madv::WillNeed);
        objs[1].set_imported(&held, true);
        dev.move_to_active(&held, &objs[2]).unwrap();
        // Objeto sem páginas não conta.
        let empty = dev.new_object(&held, 16 * PAGE_SIZE).unwrap();
        empty.madvise(&held, Madv::DontNeed);
    }

    assert_eq!(GemShrinker::new(dev).count(), 8);
}

#[test]
fn count_has_no_side_effects() {
    let dev = device();
    let objs = purgeable_objects(&dev, &[3, 5]);
    GemShrinker::new(Arc::clone(&dev)).count();

    let guard = dev.lock();
    let held = guard.held();
    assert!(objs.iter().all(|o| o.has_pages(&held)));
    assert!(objs.iter().all(|o| o.madv(&held) == Madv::DontNeed));
    assert_eq!(dev.inactive_len(&held), 2);
}

// =============================================================================
// SCAN
// =============================================================================

#[test]
fn scan_checks_budget_before_each_object() {
    let dev = device();
    let objs = purgeable_objects(&dev, &[4, 8, 2]);
    let shrinker = GemShrinker::new(Arc::clone(&dev));

    // 0 < 10 → purga 4; 4 < 10 → purga 8; 12 >= 10 → para.
    assert_eq!(shrinker.scan(10), ScanResult::Freed(12));

    {
        let guard = dev.lock();
        let held = guard.held();
        assert_eq!(objs[0].madv(&held), Madv::Purged);
        assert_eq!(objs[1].madv(&held), Madv::Purged);
        assert_eq!(objs[2].madv(&held), Madv::DontNeed);
        assert!(objs[2].has_pages(&held), "terceiro objeto intocado");
    }

    assert_eq!(shrinker.count(), 2);

    let stats = dev.trace().stats();
    assert_eq!(stats.purge_events, 1);
    assert_eq!(stats.purged_bytes, pages_to_bytes(12) as u64);
}

#[test]
fn scan_accounts_whole_objects_only() {
    let dev = device();
    let sizes = [3, 1, 7, 2, 5, 1, 9];
    let objs = purgeable_objects(&dev, &sizes);
    let shrinker = GemShrinker::new(Arc::clone(&dev));

    let requested = 9;
    let freed = shrinker.scan(requested).freed();

    let guard = dev.lock();
    let held = guard.held();
    let purged: Vec<usize> = objs
        .iter()
        .filter(|o| o.madv(&held) == Madv::Purged)
        .map(|o| o.num_pages())
        .collect();

    assert_eq!(freed, purged.iter().sum::<usize>());
    let last = *purged.last().unwrap();
    assert!(freed >= requested);
    assert!(freed - last < requested, "só o último objeto pode passar do orçamento");
}

#[test]
fn scan_without_candidates_frees_nothing() {
    let dev = device();
    let objs = purgeable_objects(&dev, &[2, 2]);
    {
        let guard = dev.lock();
        let held = guard.held();
        for obj in objs.iter() {
            obj.madvise(&held, Madv::WillNeed);
        }
    }

    let shrinker = GemShrinker::new(Arc::clone(&dev));
    assert_eq!(shrinker.scan(100), ScanResult::Freed(0));
    assert_eq!(dev.trace().stats().purge_events, 0);
}

#[test]
fn scan_with_zero_budget_does_nothing() {
    let dev = device();
    purgeable_objects(&dev, &[1]);
    let shrinker = GemShrinker::new(Arc::clone(&dev));

    assert_eq!(shrinker.scan(0), ScanResult::Freed(0));
    assert_eq!(shrinker.count(), 1);
}

#[test]
fn purge_also_drops_the_vmap() {
    let dev = device();
    let obj = {
        let guard = dev.lock();
        let held = guard.held();
        let obj = dev.new_object(&held, 2 * PAGE_SIZE).unwrap();
        obj.vmap(&held).unwrap();
        obj.put_vaddr(&held);
        obj.madvise(&held, Madv::DontNeed);
        obj
    };

    assert_eq!(GemShrinker::new(Arc::clone(&dev)).scan(1), ScanResult::Freed(2));

    let guard = dev.lock();
    let held = guard.held();
    assert!(!obj.has_vaddr(&held));
    assert!(!obj.has_pages(&held));
}

#[test]
fn purged_objects_are_skipped_on_the_next_scan() {
    let dev = device();
    let objs = purgeable_objects(&dev, &[4, 8, 2]);
    let shrinker = GemShrinker::new(Arc::clone(&dev));

    assert_eq!(shrinker.scan(10), ScanResult::Freed(12));
    assert_eq!(shrinker.scan(10), ScanResult::Freed(2));
    assert_eq!(shrinker.scan(10), ScanResult::Freed(0));

    let guard = dev.lock();
    let held = guard.held();
    // Purga não tira objetos da lista.
    assert_eq!(dev.inactive_len(&held), objs.len());
}

// =============================================================================
// LOCK OCUPADO / REENTRÂNCIA
// =============================================================================

#[test]
fn busy_lock_makes_every_pass_back_off() {
    let dev = device();
    let objs = purgeable_objects(&dev, &[4, 8, 2]);
    vunmapable_objects(&dev, 3);
    let shrinker = GemShrinker::new(Arc::clone(&dev));

    let (count, scan, notify, acc) = with_lock_held_elsewhere(&dev, || {
        let mut acc = 7usize;
        let notify = shrinker.purge_vmaps(&mut acc);
        (shrinker.count(), shrinker.scan(100), notify, acc)
    });

    assert_eq!(count, 0);
    assert_eq!(scan, ScanResult::Stop);
    assert_ne!(scan, ScanResult::Freed(0));
    assert_eq!(notify, NotifyResult::Done);
    assert_eq!(acc, 7);

    let guard = dev.lock();
    let held = guard.held();
    assert_eq!(dev.inactive_len(&held), 6);
    assert!(objs.iter().all(|o| o.has_pages(&held)));
    assert_eq!(dev.trace().stats(), TraceStats::default());
}

#[test]
fn passes_reuse_the_callers_lock_without_releasing_it() {
    let dev = device();
    let objs = purgeable_objects(&dev, &[4, 8, 2]);
    vunmapable_objects(&dev, 2);
    let shrinker = GemShrinker::new(Arc::clone(&dev));

    let guard = dev.lock();

    assert_eq!(shrinker.count(), 14);
    assert!(dev.struct_mutex().is_locked_by_current());

    assert_eq!(shrinker.scan(5), ScanResult::Freed(12));
    assert!(dev.struct_mutex().is_locked_by_current());

    let mut acc = 0;
    assert_eq!(shrinker.purge_vmaps(&mut acc), NotifyResult::Done);
    assert_eq!(acc, 2);
    assert!(dev.struct_mutex().is_locked_by_current());

    // O chamador continua usando o lock normalmente.
    let held = guard.held();
    assert_eq!(objs[0].madv(&held), Madv::Purged);
    drop(guard);
    assert!(!dev.struct_mutex().is_locked());
}

#[test]
fn shrinker_lock_reports_release_obligation() {
    let dev = device();

    {
        let lock = ShrinkerLock::acquire(&dev).unwrap();
        assert!(lock.must_unlock());
        assert!(dev.struct_mutex().is_locked_by_current());
    }
    assert!(!dev.struct_mutex().is_locked());

    let outer = dev.lock();
    {
        let lock = ShrinkerLock::acquire(&dev).unwrap();
        assert!(!lock.must_unlock());
    }
    assert!(dev.struct_mutex().is_locked_by_current());
    drop(outer);

    let busy = with_lock_held_elsewhere(&dev, || ShrinkerLock::acquire(&dev).is_none());
    assert!(busy);
}

// =============================================================================
// PURGE DE VMAP
// =============================================================================

#[test]
fn vmap_purge_stops_at_batch_and_adds_to_accumulator() {
    let dev = device();
    let objs = vunmapable_objects(&dev, 20);
    let shrinker = GemShrinker::new(Arc::clone(&dev));

    let mut acc = 5usize;
    assert_eq!(shrinker.purge_vmaps(&mut acc), NotifyResult::Done);
    assert_eq!(acc, 20);

    {
        let guard = dev.lock();
        let held = guard.held();
        let mapped = objs.iter().filter(|o| o.has_vaddr(&held)).count();
        assert_eq!(mapped, 5);
        assert!(objs.iter().all(|o| o.has_pages(&held)), "vunmap mantém storage");
    }

    // Próxima chamada continua de onde parou.
    assert_eq!(shrinker.purge_vmaps(&mut acc), NotifyResult::Done);
    assert_eq!(acc, 25);

    assert_eq!(shrinker.purge_vmaps(&mut acc), NotifyResult::Done);
    assert_eq!(acc, 25);

    let stats = dev.trace().stats();
    assert_eq!(stats.vmap_purge_events, 2);
    assert_eq!(stats.vmaps_purged, 20);
}

#[test]
fn vmap_purge_leaves_mappings_in_use() {
    let dev = device();
    let busy = {
        let guard = dev.lock();
        let held = guard.held();
        let obj = dev.new_object(&held, PAGE_SIZE).unwrap();
        obj.vmap(&held).unwrap();
        obj
    };
    let idle = vunmapable_objects(&dev, 1);

    let mut acc = 0;
    GemShrinker::new(Arc::clone(&dev)).purge_vmaps(&mut acc);
    assert_eq!(acc, 1);

    let guard = dev.lock();
    let held = guard.held();
    assert!(busy.has_vaddr(&held));
    assert!(!idle[0].has_vaddr(&held));
}

#[test]
fn vmap_batch_is_configurable() {
    let dev = GemDevice::new(ShrinkerConfig {
        vmap_purge_batch: 4,
        ..ShrinkerConfig::default()
    });
    vunmapable_objects(&dev, 10);

    let mut acc = 0;
    GemShrinker::new(dev).purge_vmaps(&mut acc);
    assert_eq!(acc, 4);
}

// =============================================================================
// INIT / CLEANUP
// =============================================================================

#[test]
fn init_registers_both_reclaim_paths() {
    let dev = device();
    let registry = Arc::new(ShrinkerRegistry::default());
    let chain = Arc::new(VmapPurgeChain::default());
    purgeable_objects(&dev, &[4, 8, 2]);
    vunmapable_objects(&dev, 3);

    shrinker::init(&dev, &registry, &chain).unwrap();
    assert!(shrinker::is_initialized(&dev));

    let (id, nid) = shrinker::registration(&dev).unwrap();
    assert!(registry.is_registered(id));
    assert_eq!(registry.info(id), Some(("drm-forge_gem", 2)));
    assert!(chain.is_registered(nid.unwrap()));

    // Pressão de memória chega pelo framework.
    assert_eq!(registry.shrink(10), 12);

    // Falta de espaço virtual chega pela cadeia.
    let mut freed = 0;
    assert_eq!(chain.notify(&mut freed), NotifyResult::Done);
    assert_eq!(freed, 3);

    shrinker::cleanup(&dev);
    assert!(!shrinker::is_initialized(&dev));
    assert!(registry.is_empty());
    assert!(chain.is_empty());

    // Segunda chamada é no-op.
    shrinker::cleanup(&dev);
}

#[test]
fn init_twice_is_rejected() {
    let dev = device();
    let registry = Arc::new(ShrinkerRegistry::default());
    let chain = Arc::new(VmapPurgeChain::default());

    shrinker::init(&dev, &registry, &chain).unwrap();
    assert_eq!(
        shrinker::init(&dev, &registry, &chain),
        Err(MmError::AlreadyRegistered)
    );
    assert_eq!(registry.len(), 1);
    assert_eq!(chain.len(), 1);

    shrinker::cleanup(&dev);
}

#[test]
fn init_fails_when_shrinker_cannot_be_allocated() {
    let dev = device();
    let registry = Arc::new(ShrinkerRegistry::new(0));
    let chain = Arc::new(VmapPurgeChain::default());

    assert_eq!(
        shrinker::init(&dev, &registry, &chain),
        Err(MmError::OutOfMemory)
    );
    assert!(!shrinker::is_initialized(&dev));
    assert!(chain.is_empty());

    // cleanup sem init é no-op.
    shrinker::cleanup(&dev);
}

#[test]
fn init_survives_vmap_registration_failure() {
    let dev = device();
    let registry = Arc::new(ShrinkerRegistry::default());
    let chain = Arc::new(VmapPurgeChain::new(0));

    shrinker::init(&dev, &registry, &chain).unwrap();
    let (id, nid) = shrinker::registration(&dev).unwrap();
    assert!(registry.is_registered(id));
    assert_eq!(nid, None);

    shrinker::cleanup(&dev);
    assert!(registry.is_empty());
}

#[test]
fn framework_contract_goes_through_trait_objects() {
    let dev = device();
    purgeable_objects(&dev, &[4, 8, 2]);
    let agent: Arc<dyn Shrinker> = Arc::new(GemShrinker::new(Arc::clone(&dev)));

    assert_eq!(agent.count_objects(&ShrinkControl::new(0)), 14);
    assert_eq!(agent.scan_objects(&ShrinkControl::new(10)).into_raw(), 12);

    let raw = with_lock_held_elsewhere(&dev, || {
        agent.scan_objects(&ShrinkControl::new(10)).into_raw()
    });
    assert_eq!(raw, crate::mm::shrinker::SHRINK_STOP);
}
