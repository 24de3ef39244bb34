//! # Configuração do Alocador
//!
//! Define constantes e limites globais do kmem (Slab + Heap).

use core::mem::size_of;

pub use crate::klib::{align_down, align_up, checked_align_up, is_aligned};

// =============================================================================
// PÁGINAS
// =============================================================================

/// Tamanho de página padrão (4 KiB)
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Menor página aceita do Page Source
pub const MIN_PAGE_SIZE: usize = 512;

// =============================================================================
// SLAB
// =============================================================================

/// Cada slab comporta pelo menos esta quantidade de buffers
pub const MIN_BUFFERS_PER_SLAB: usize = 8;

/// Alinhamento mínimo de todo buffer (tamanho é arredondado para cá)
pub const MIN_BUFFER_ALIGN: usize = size_of::<usize>();

/// Assinatura do registro de metadados no fim de cada slab ("SLABTAIL")
pub const SLAB_TRAILER_MAGIC: u64 = 0x534C_4142_5441_494C;

/// Padrões de política de cache (guardados, não aplicados)
pub const DEFAULT_FREE_SLABS_THRESHOLD: usize = 2;
pub const DEFAULT_MIN_BUFFERS: usize = 0;
pub const DEFAULT_MAX_SLABS: usize = usize::MAX;

/// Iterações de spin antes de declarar o lock do cache travado (fatal)
pub const LOCK_SPIN_LIMIT: usize = 1 << 28;

// =============================================================================
// HEAP
// =============================================================================

/// Tamanhos dos buckets do heap
pub const HEAP_BUCKET_SIZES: [usize; HEAP_BUCKET_COUNT] =
    [16, 32, 48, 64, 96, 128, 196, 256, 512, 1024, 2048, 4096];

pub const HEAP_BUCKET_COUNT: usize = 12;

/// Nomes dos caches de cada bucket (logs e estatísticas)
pub const HEAP_BUCKET_NAMES: [&str; HEAP_BUCKET_COUNT] = [
    "kmalloc-16",
    "kmalloc-32",
    "kmalloc-48",
    "kmalloc-64",
    "kmalloc-96",
    "kmalloc-128",
    "kmalloc-196",
    "kmalloc-256",
    "kmalloc-512",
    "kmalloc-1024",
    "kmalloc-2048",
    "kmalloc-4096",
];

/// Maior bucket; acima disso a alocação vai direto para o Page Source
pub const HEAP_MAX_BUCKET_SIZE: usize = HEAP_BUCKET_SIZES[HEAP_BUCKET_COUNT - 1];

/// Bytes reservados antes de cada ponteiro devolvido pelo heap
pub const HEAP_HEADER_SIZE: usize = 16;

/// Tag do cabeçalho para alocações grandes (fora dos buckets)
pub const HEAP_LARGE_TAG: u32 = u32::MAX;

/// Assinatura do cabeçalho do heap
pub const HEAP_HEADER_MAGIC: u32 = 0x4B48_4450; // "KHDP"

const _: () = assert!(HEAP_HEADER_SIZE % MIN_BUFFER_ALIGN == 0);
const _: () = assert!(HEAP_BUCKET_SIZES[0] >= HEAP_HEADER_SIZE);
const _: () = assert!(DEFAULT_PAGE_SIZE.is_power_of_two());
