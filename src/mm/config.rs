//! # Configuração do Reclaim de Memória
//!
//! Define constantes e configurações do shrinker GEM.

// =============================================================================
// CONSTANTES DE TAMANHO
// =============================================================================

/// Tamanho de uma página (4 KiB)
pub const PAGE_SIZE: usize = 4096;

/// Bits de offset dentro de uma página
pub const PAGE_SHIFT: usize = 12;

/// Máscara para alinhar endereços a página
pub const PAGE_MASK: usize = !(PAGE_SIZE - 1);

// =============================================================================
// CONFIGURAÇÃO DO SHRINKER
// =============================================================================

/// Nome do shrinker registrado no framework de pressão de memória
pub const SHRINKER_NAME: &str = "drm-forge_gem";

/// Custo relativo para recriar um objeto (mesmo default do framework)
pub const DEFAULT_SEEKS: u32 = 2;

/// Objetos pedidos por chamada de `scan_objects` no driver de pressão
pub const SHRINK_BATCH: usize = 128;

/// Máximo de vunmaps por evento de pressão de espaço virtual.
///
/// Heurística: sem informação melhor, paramos depois de alguns; o evento
/// volta a disparar se ainda faltar espaço.
pub const VMAP_PURGE_BATCH: usize = 15;

/// Capacidade padrão dos registros de shrinker/notifier
pub const MAX_SHRINKERS: usize = 64;

/// Parâmetros ajustáveis do shrinker GEM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShrinkerConfig {
    pub name: &'static str,
    pub seeks: u32,
    pub vmap_purge_batch: usize,
}

impl Default for ShrinkerConfig {
    fn default() -> Self {
        Self {
            name: SHRINKER_NAME,
            seeks: DEFAULT_SEEKS,
            vmap_purge_batch: VMAP_PURGE_BATCH,
        }
    }
}

/// Arredonda `size` para cima até múltiplo de página.
///
/// `None` se o resultado não couber em `usize`.
pub const fn page_align_up(size: usize) -> Option<usize> {
    match size.checked_add(PAGE_SIZE - 1) {
        Some(end) => Some(end & PAGE_MASK),
        None => None,
    }
}

/// Converte tamanho em bytes (alinhado) para número de páginas.
pub const fn bytes_to_pages(size: usize) -> usize {
    size >> PAGE_SHIFT
}

/// Converte número de páginas para bytes.
pub const fn pages_to_bytes(pages: usize) -> usize {
    pages << PAGE_SHIFT
}
