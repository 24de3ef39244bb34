// =============================================================================
// KMEM LOGGING - ZERO OVERHEAD
// =============================================================================
//
// Mesmo esquema de logs do kernel forge, mas escrevendo no `LogSink`
// instalado em `debug::klog` em vez de falar direto com a serial.
//
// NÍVEIS DE LOG (do mais crítico ao menos):
// - ERROR: Corrupção do alocador, falhas fatais
// - WARN:  Ponteiros inválidos, double free, OOM
// - INFO:  Criação/destruição de caches, inicialização do heap
// - DEBUG: Crescimento de caches, seeding de memória
// - TRACE: Cada alocação e cada free
//
// FEATURES:
// - no_logs:   Remove 100% dos logs
// - log_error: ERROR + WARN
// - log_info:  + INFO
// - log_debug: + DEBUG
// - log_trace: Todos os níveis (padrão)
//
// COMO USAR:
//   kinfo!("(Slab) Cache criado");             // Apenas string
//   kinfo!("(Slab) slab_size=", slab_size);    // String + hex
//
// =============================================================================

pub const P_ERROR: &str = "\x1b[1;31m[ERRO]\x1b[0m ";
pub const P_WARN: &str = "\x1b[1;33m[WARN]\x1b[0m ";
pub const P_INFO: &str = "\x1b[32m[INFO]\x1b[0m ";
pub const P_DEBUG: &str = "\x1b[36m[DEBG]\x1b[0m ";
pub const P_TRACE: &str = "\x1b[35m[TRAC]\x1b[0m ";
pub const P_OK: &str = "\x1b[32m[OK]\x1b[0m ";
pub const P_FAIL: &str = "\x1b[1;31m[FAIL]\x1b[0m ";

// =============================================================================
// MACRO BASE
// =============================================================================

#[doc(hidden)]
#[macro_export]
macro_rules! __kmem_emit {
    ($prefix:expr, $msg:expr) => {{
        $crate::debug::klog::emit_str($prefix);
        $crate::debug::klog::emit_str($msg);
        $crate::debug::klog::emit_nl();
    }};
    ($prefix:expr, $msg:expr, $val:expr) => {{
        $crate::debug::klog::emit_str($prefix);
        $crate::debug::klog::emit_str($msg);
        $crate::debug::klog::emit_hex($val as u64);
        $crate::debug::klog::emit_nl();
    }};
}

// =============================================================================
// ERROR / WARN - sempre ativos (exceto com no_logs)
// =============================================================================

#[cfg(not(feature = "no_logs"))]
#[macro_export]
macro_rules! kerror {
    ($msg:expr) => {
        $crate::__kmem_emit!($crate::debug::logging::P_ERROR, $msg)
    };
    ($msg:expr, $val:expr) => {
        $crate::__kmem_emit!($crate::debug::logging::P_ERROR, $msg, $val)
    };
}

#[cfg(feature = "no_logs")]
#[macro_export]
macro_rules! kerror {
    ($($t:tt)*) => {{}};
}

#[cfg(not(feature = "no_logs"))]
#[macro_export]
macro_rules! kwarn {
    ($msg:expr) => {
        $crate::__kmem_emit!($crate::debug::logging::P_WARN, $msg)
    };
    ($msg:expr, $val:expr) => {
        $crate::__kmem_emit!($crate::debug::logging::P_WARN, $msg, $val)
    };
}

#[cfg(feature = "no_logs")]
#[macro_export]
macro_rules! kwarn {
    ($($t:tt)*) => {{}};
}

// =============================================================================
// INFO
// =============================================================================

#[cfg(not(any(feature = "no_logs", feature = "log_error")))]
#[macro_export]
macro_rules! kinfo {
    ($msg:expr) => {
        $crate::__kmem_emit!($crate::debug::logging::P_INFO, $msg)
    };
    ($msg:expr, $val:expr) => {
        $crate::__kmem_emit!($crate::debug::logging::P_INFO, $msg, $val)
    };
}

#[cfg(any(feature = "no_logs", feature = "log_error"))]
#[macro_export]
macro_rules! kinfo {
    ($($t:tt)*) => {{}};
}

// =============================================================================
// DEBUG
// =============================================================================

#[cfg(all(
    not(feature = "no_logs"),
    any(feature = "log_trace", feature = "log_debug")
))]
#[macro_export]
macro_rules! kdebug {
    ($msg:expr) => {
        $crate::__kmem_emit!($crate::debug::logging::P_DEBUG, $msg)
    };
    ($msg:expr, $val:expr) => {
        $crate::__kmem_emit!($crate::debug::logging::P_DEBUG, $msg, $val)
    };
}

#[cfg(not(all(
    not(feature = "no_logs"),
    any(feature = "log_trace", feature = "log_debug")
)))]
#[macro_export]
macro_rules! kdebug {
    ($($t:tt)*) => {{}};
}

// =============================================================================
// TRACE
// =============================================================================

#[cfg(all(not(feature = "no_logs"), feature = "log_trace"))]
#[macro_export]
macro_rules! ktrace {
    ($msg:expr) => {
        $crate::__kmem_emit!($crate::debug::logging::P_TRACE, $msg)
    };
    ($msg:expr, $val:expr) => {
        $crate::__kmem_emit!($crate::debug::logging::P_TRACE, $msg, $val)
    };
}

#[cfg(not(all(not(feature = "no_logs"), feature = "log_trace")))]
#[macro_export]
macro_rules! ktrace {
    ($($t:tt)*) => {{}};
}

// =============================================================================
// MACROS DE STATUS (OK/FAIL)
// =============================================================================

/// kok! - Log de sucesso (prefixo verde [OK]).
#[cfg(not(feature = "no_logs"))]
#[macro_export]
macro_rules! kok {
    ($msg:expr) => {
        $crate::__kmem_emit!($crate::debug::logging::P_OK, $msg)
    };
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
    ($msg:expr) => {
        $crate::__kmem_emit!($crate::debug::logging::P_FAIL, $msg)
    };
}

#[cfg(feature = "no_logs")]
#[macro_export]
macro_rules! kfail {
    ($($t:tt)*) => {{}};
}
