// =============================================================================
// SISTEMA DE LOGGING - ZERO OVERHEAD
// =============================================================================
//
// Logging do shrinker GEM com custo ZERO em release.
//
// ARQUITETURA:
// - Usa features do Cargo para compile-time filtering
// - Com feature "no_logs", TODOS os macros viram expressões vazias
// - SEM core::fmt - Evita geração de código SSE/AVX
// - SEM alocação - Apenas strings literais
// - Escreve APENAS no console registrado (`core::console`)
//
// NÍVEIS DE LOG (do mais crítico ao menos):
// - ERROR: Erros fatais ou críticos
// - WARN:  Situações suspeitas mas recuperáveis
// - INFO:  Fluxo normal de execução
// - DEBUG: Informações de debugging
// - TRACE: Detalhes extremos (cada passada do shrinker)
//
// FEATURES:
// - no_logs:   Remove 100% dos logs (custo zero no binário)
// - log_info:  Até DEBUG
// - log_trace: Todos os níveis (padrão)
//
// COMO USAR:
//   kinfo!("(Shrinker) Registrado");           // Apenas string
//   kinfo!("(Shrinker) Freed=", freed);        // String + hex
//
// =============================================================================

pub const P_ERROR: &str = "\x1b[1;31m[ERRO]\x1b[0m ";
pub const P_WARN: &str = "\x1b[1;33m[WARN]\x1b[0m ";
pub const P_INFO: &str = "\x1b[32m[INFO]\x1b[0m ";
pub const P_DEBUG: &str = "\x1b[36m[DEBG]\x1b[0m ";
pub const P_TRACE: &str = "\x1b[35m[TRAC]\x1b[0m ";

// =============================================================================
// MACROS DE LOG - NÍVEL ERROR
// =============================================================================

#[cfg(not(feature = "no_logs"))]
#[macro_export]
macro_rules! kerror {
    ($msg:expr) => {{
        $crate::core::console::emit_str($crate::core::logging::P_ERROR);
        $crate::core::console::emit_str($msg);
        $crate::core::console::emit_nl();
    }};
    ($msg:expr, $val:expr) => {{
        $crate::core::console::emit_str($crate::core::logging::P_ERROR);
        $crate::core::console::emit_str($msg);
        $crate::core::console::emit_hex($val as u64);
        $crate::core::console::emit_nl();
    }};
}

#[cfg(feature = "no_logs")]
#[macro_export]
macro_rules! kerror {
    ($($t:tt)*) => {{}};
}

// =============================================================================
// MACROS DE LOG - NÍVEL WARN
// =============================================================================

#[cfg(not(feature = "no_logs"))]
#[macro_export]
macro_rules! kwarn {
    ($msg:expr) => {{
        $crate::core::console::emit_str($crate::core::logging::P_WARN);
        $crate::core::console::emit_str($msg);
        $crate::core::console::emit_nl();
    }};
    ($msg:expr, $val:expr) => {{
        $crate::core::console::emit_str($crate::core::logging::P_WARN);
        $crate::core::console::emit_str($msg);
        $crate::core::console::emit_hex($val as u64);
        $crate::core::console::emit_nl();
    }};
}

#[cfg(feature = "no_logs")]
#[macro_export]
macro_rules! kwarn {
    ($($t:tt)*) => {{}};
}

// =============================================================================
// MACROS DE LOG - NÍVEL INFO
// =============================================================================

#[cfg(not(feature = "no_logs"))]
#[macro_export]
macro_rules! kinfo {
    ($msg:expr) => {{
        $crate::core::console::emit_str($crate::core::logging::P_INFO);
        $crate::core::console::emit_str($msg);
        $crate::core::console::emit_nl();
    }};
    ($msg:expr, $val:expr) => {{
        $crate::core::console::emit_str($crate::core::logging::P_INFO);
        $crate::core::console::emit_str($msg);
        $crate::core::console::emit_hex($val as u64);
        $crate::core::console::emit_nl();
    }};
}

#[cfg(feature = "no_logs")]
#[macro_export]
macro_rules! kinfo {
    ($($t:tt)*) => {{}};
}

// =============================================================================
// MACROS DE LOG - NÍVEL DEBUG
// =============================================================================

#[cfg(all(not(feature = "no_logs"), any(feature = "log_trace", feature = "log_info")))]
#[macro_export]
macro_rules! kdebug {
    ($msg:expr) => {{
        $crate::core::console::emit_str($crate::core::logging::P_DEBUG);
        $crate::core::console::emit_str($msg);
        $crate::core::console::emit_nl();
    }};
    ($msg:expr, $val:expr) => {{
        $crate::core::console::emit_str($crate::core::logging::P_DEBUG);
        $crate::core::console::emit_str($msg);
        $crate::core::console::emit_hex($val as u64);
        $crate::core::console::emit_nl();
    }};
}

#[cfg(not(all(not(feature = "no_logs"), any(feature = "log_trace", feature = "log_info"))))]
#[macro_export]
macro_rules! kdebug {
    ($msg:expr) => {{
        let _ = $msg;
    }};
    ($msg:expr, $val:expr) => {{
        let _ = ($msg, $val);
    }};
}

// =============================================================================
// MACROS DE LOG - NÍVEL TRACE
// =============================================================================

#[cfg(all(not(feature = "no_logs"), feature = "log_trace"))]
#[macro_export]
macro_rules! ktrace {
    ($msg:expr) => {{
        $crate::core::console::emit_str($crate::core::logging::P_TRACE);
        $crate::core::console::emit_str($msg);
        $crate::core::console::emit_nl();
    }};
    ($msg:expr, $val:expr) => {{
        $crate::core::console::emit_str($crate::core::logging::P_TRACE);
        $crate::core::console::emit_str($msg);
        $crate::core::console::emit_hex($val as u64);
        $crate::core::console::emit_nl();
    }};
}

#[cfg(not(all(not(feature = "no_logs"), feature = "log_trace")))]
#[macro_export]
macro_rules! ktrace {
    ($msg:expr) => {{
        let _ = $msg;
    }};
    ($msg:expr, $val:expr) => {{
        let _ = ($msg, $val);
    }};
}

// =============================================================================
// MACROS DE STATUS (OK/FAIL)
// =============================================================================

/// kok! - Log de sucesso (prefixo verde [OK]).
#[cfg(not(feature = "no_logs"))]
#[macro_export]
macro_rules! kok {
    ($msg:expr) => {{
        $crate::core::console::emit_str("\x1b[32m[OK]\x1b[0m ");
        $crate::core::console::emit_str($msg);
        $crate::core::console::emit_nl();
    }};
}

#[cfg(feature = "no_logs")]
#[macro_export]
macro_rules! kok {
    ($($t:tt)*) => {{}};
}

/// kfail! - Log de falha (prefixo vermelho [FAIL]).
#[cfg(not(feature = "no_logs"))]
#[macro_export]
macro_rules! kfail {
    ($msg:expr) => {{
        $crate::core::console::emit_str("\x1b[1;31m[FAIL]\x1b[0m ");
        $crate::core::console::emit_str($msg);
        $crate::core::console::emit_nl();
    }};
}

#[cfg(feature = "no_logs")]
#[macro_export]
macro_rules! kfail {
    ($($t:tt)*) => {{}};
}
