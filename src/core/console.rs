// =============================================================================
// CONSOLE DE LOG - ZERO OVERHEAD
// =============================================================================
//
// Destino dos logs do shrinker GEM.
//
// ARQUITETURA:
// O driver não conhece o hardware de saída. O kernel hospedeiro registra um
// writer (`set_writer`) que recebe fatias de texto já prontas:
// - SEM core::fmt - Evita geração de código SSE/AVX
// - SEM alocação - Apenas strings literais e valores imediatos
// - SEM lock no caminho de escrita - Apenas um load atômico
//
// Sem writer registrado, toda saída é descartada.
//
// FUNÇÕES DISPONÍVEIS:
// - emit_str(s)      : Envia string literal
// - emit_hex(v)      : Envia u64 em hexadecimal
// - emit_nl()        : Envia newline
//
// NOTA IMPORTANTE:
// Não há exclusão mútua entre CPUs. Em ambiente SMP os logs podem se
// intercalar. Isso é aceitável para debugging.
//
// =============================================================================

use core::sync::atomic::{AtomicPtr, Ordering};

/// Assinatura do writer registrado pelo kernel hospedeiro.
pub type ConsoleWriter = fn(&str);

/// Writer atual (null = descartar).
static WRITER: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

/// Registra o writer que recebe toda saída de log.
pub fn set_writer(writer: ConsoleWriter) {
    WRITER.store(writer as *mut (), Ordering::Release);
}

/// Remove o writer atual. Logs posteriores são descartados.
pub fn clear_writer() {
    WRITER.store(core::ptr::null_mut(), Ordering::Release);
}

#[inline(always)]
fn writer() -> Option<ConsoleWriter> {
    let raw = WRITER.load(Ordering::Acquire);
    if raw.is_null() {
        return None;
    }
    // SAFETY: o único valor não-nulo armazenado em WRITER vem de
    // `set_writer`, que recebe um `fn(&str)` válido.
    Some(unsafe { core::mem::transmute::<*mut (), ConsoleWriter>(raw) })
}

// =============================================================================
// FUNÇÕES DE ESCRITA - CORE
// =============================================================================

/// Envia uma string para o console.
#[inline(never)]
pub fn emit_str(s: &str) {
    if let Some(write) = writer() {
        write(s);
    }
}

/// Envia uma nova linha para o console.
#[inline(never)]
pub fn emit_nl() {
    emit_str("\n");
}

// =============================================================================
// FUNÇÕES DE ESCRITA - FORMATAÇÃO NUMÉRICA
// =============================================================================

/// Converte um nibble (0-15) no dígito ASCII correspondente.
#[inline(always)]
fn nibble_to_ascii(nibble: u8) -> u8 {
    if nibble < 10 {
        b'0' + nibble
    } else {
        b'A' + (nibble - 10)
    }
}

/// Formata `value` como 0x0123456789ABCDEF (sempre 18 caracteres).
pub fn format_hex(value: u64, buf: &mut [u8; 18]) -> &str {
    buf[0] = b'0';
    buf[1] = b'x';

    let mut i = 0usize;
    while i < 16 {
        let shift = 60 - (i * 4);
        buf[2 + i] = nibble_to_ascii(((value >> shift) & 0xF) as u8);
        i += 1;
    }

    // SAFETY: só escrevemos dígitos ASCII em `buf`.
    unsafe { core::str::from_utf8_unchecked(&buf[..]) }
}

/// Envia um valor u64 em formato hexadecimal.
///
/// Formato de saída: 0x0123456789ABCDEF (sempre 18 caracteres)
#[inline(never)]
pub fn emit_hex(value: u64) {
    let mut buf = [0u8; 18];
    emit_str(format_hex(value, &mut buf));
}
