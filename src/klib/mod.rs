//! Kernel Library (KLib).
//!
//! Utilitários agnósticos de hardware usados pelo alocador: alinhamento,
//! bitmap de slots, lista intrusiva e índice ordenado por endereço.

pub mod bitmap;
pub mod list;
pub mod tree;

#[cfg(any(test, feature = "self_test"))]
pub mod test_framework;

/// Alinha um valor para cima ao próximo múltiplo de `align` (potência de 2).
///
/// # Exemplo
/// `align_up(10, 4) -> 12`
#[inline(always)]
pub const fn align_up(val: usize, align: usize) -> usize {
    (val + align - 1) & !(align - 1)
}

/// Versão de `align_up` que detecta overflow.
#[inline(always)]
pub const fn checked_align_up(val: usize, align: usize) -> Option<usize> {
    match val.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

/// Alinha um valor para baixo ao múltiplo anterior de `align`.
///
/// # Exemplo
/// `align_down(10, 4) -> 8`
#[inline(always)]
pub const fn align_down(val: usize, align: usize) -> usize {
    val & !(align - 1)
}

/// Verifica se um valor está alinhado.
#[inline(always)]
pub const fn is_aligned(val: usize, align: usize) -> bool {
    val & (align - 1) == 0
}
