//! Tabela de buckets do heap

use crate::mm::config::{HEAP_BUCKET_SIZES, HEAP_HEADER_SIZE};

/// Menor bucket que comporta `size` bytes + cabeçalho.
///
/// `None` quando não cabe em nenhum bucket (caminho de alocação grande).
pub fn bucket_index(size: usize) -> Option<usize> {
    let padded = size.checked_add(HEAP_HEADER_SIZE)?;
    HEAP_BUCKET_SIZES.iter().position(|&bucket| bucket >= padded)
}

/// Bytes utilizáveis pelo chamador num buffer do bucket
#[inline]
pub fn usable_in_bucket(index: usize) -> usize {
    HEAP_BUCKET_SIZES[index] - HEAP_HEADER_SIZE
}
