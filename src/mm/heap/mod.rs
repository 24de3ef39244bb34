//! # Kernel Heap
//!
//! Front end `malloc`/`free` do kernel sobre 12 caches de tamanho fixo.
//!
//! ## 🏗️ Arquitetura
//! - **Buckets:** 16, 32, 48, 64, 96, 128, 196, 256, 512, 1024, 2048, 4096 bytes.
//!   O pedido é acrescido do cabeçalho (`HEAP_HEADER_SIZE`) e vai para o menor
//!   bucket que comporta o total.
//! - **Alocação grande:** acima do maior bucket, arredonda para páginas e pede
//!   direto ao Page Source. O cabeçalho guarda o tamanho exato usado.
//! - **Cabeçalho:** é o que permite a `free` achar o dono a partir do ponteiro.
//!
//! ## Uso
//! `Heap` é um valor explícito: quem inicializa o alocador é dono dele e o
//! passa por referência. Um por kernel. `KernelAllocator` embrulha o heap
//! como `#[global_allocator]`.
//!
//! ## ⚠️ Pontos de Atenção
//! - O caminho grande sempre fala com o Page Source, então ignora caches.
//! - Com `guard_pages`, cada alocação grande leva uma página extra sem acesso
//!   logo após os dados.

pub mod bucket;
pub mod global;
pub mod header;

use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::mm::config::{HEAP_BUCKET_COUNT, HEAP_BUCKET_NAMES, HEAP_BUCKET_SIZES, HEAP_HEADER_SIZE};
use crate::mm::error::{MmError, MmResult};
use crate::mm::page_source::{init_slab_allocator, PageGeometry, PageSource};
#[cfg(feature = "guard_pages")]
use crate::mm::page_source::Protection;
use crate::mm::slab::{AllocFlags, Cache, CacheConfig, CacheCounters, CacheStats, SlabGeometry};

pub use bucket::bucket_index;
pub use global::KernelAllocator;
pub use header::{HeaderTag, HeapHeader};

/// Estatísticas do heap inteiro
#[derive(Debug, Clone, Copy)]
pub struct HeapStats {
    /// Contagens estruturais por bucket
    pub buckets: [CacheCounters; HEAP_BUCKET_COUNT],
    /// Estatísticas detalhadas por bucket (feature `alloc_stats`)
    pub detailed: [Option<CacheStats>; HEAP_BUCKET_COUNT],
    pub large_allocations: usize,
    pub large_frees: usize,
    pub large_live_bytes: usize,
    pub large_failures: usize,
}

#[derive(Default)]
struct LargeCounters {
    allocations: AtomicUsize,
    frees: AtomicUsize,
    live_bytes: AtomicUsize,
    failures: AtomicUsize,
}

/// Heap do kernel
pub struct Heap<'p> {
    pages: &'p dyn PageSource,
    page: PageGeometry,
    caches: [Cache<'p>; HEAP_BUCKET_COUNT],
    large: LargeCounters,
}

impl<'p> Heap<'p> {
    /// Cria o heap e os caches de todos os buckets (InitHeap).
    pub fn new(pages: &'p dyn PageSource) -> MmResult<Self> {
        let page = init_slab_allocator(pages)?;

        // Geometrias primeiro: a criação dos caches não falha mais
        let mut geometries = [SlabGeometry::default(); HEAP_BUCKET_COUNT];
        for (geometry, size) in geometries.iter_mut().zip(HEAP_BUCKET_SIZES) {
            *geometry = SlabGeometry::compute(size, &page)?;
        }
        let caches = core::array::from_fn(|i| {
            let config = CacheConfig::new(HEAP_BUCKET_NAMES[i], HEAP_BUCKET_SIZES[i]);
            Cache::with_geometry(pages, page, geometries[i], config)
        });

        crate::kok!("(Heap) Inicializado");
        Ok(Self {
            pages,
            page,
            caches,
            large: LargeCounters::default(),
        })
    }

    /// Geometria de página em uso
    pub fn page(&self) -> PageGeometry {
        self.page
    }

    /// Bucket que atende `size`, se houver
    pub fn bucket_of(&self, size: usize) -> Option<usize> {
        bucket_index(size)
    }

    /// Cache de um bucket
    pub fn cache(&self, bucket: usize) -> Option<&Cache<'p>> {
        self.caches.get(bucket)
    }

    /// Aloca `size` bytes (AllocateFromHeap).
    pub fn allocate(&self, size: usize) -> MmResult<NonNull<u8>> {
        self.allocate_with(size, AllocFlags::empty())
    }

    /// Aloca com flags. `NO_SLEEP` nunca chama o Page Source.
    pub fn allocate_with(&self, size: usize, flags: AllocFlags) -> MmResult<NonNull<u8>> {
        let Some(index) = bucket_index(size) else {
            return self.allocate_large(size, flags);
        };

        let block = self.caches[index].allocate(flags)?;
        // SAFETY: buffer do bucket tem ao menos HEAP_HEADER_SIZE bytes
        let ptr = unsafe { HeapHeader::new(HeaderTag::Bucket(index)).install(block) };
        crate::ktrace!("(Heap) alloc=", ptr.as_ptr() as usize);
        Ok(ptr)
    }

    /// Aloca e zera `size` bytes
    pub fn allocate_zeroed(&self, size: usize) -> MmResult<NonNull<u8>> {
        let ptr = self.allocate(size)?;
        // SAFETY: `size` bytes utilizáveis recém-alocados
        unsafe { core::ptr::write_bytes(ptr.as_ptr(), 0, size) };
        Ok(ptr)
    }

    fn allocate_large(&self, size: usize, flags: AllocFlags) -> MmResult<NonNull<u8>> {
        if flags.contains(AllocFlags::NO_SLEEP) {
            self.large.failures.fetch_add(1, Ordering::Relaxed);
            return Err(MmError::OutOfMemory);
        }

        let span = size
            .checked_add(HEAP_HEADER_SIZE)
            .and_then(|bytes| self.page.round_up(bytes))
            .ok_or(MmError::InvalidSize)?;
        let total = span
            .checked_add(self.guard_size())
            .ok_or(MmError::InvalidSize)?;

        let block = match self.pages.alloc_pages(total) {
            Ok(block) => block,
            Err(e) => {
                self.large.failures.fetch_add(1, Ordering::Relaxed);
                crate::kwarn!("(Heap) alocação grande falhou, size=", size);
                return Err(e);
            }
        };

        #[cfg(feature = "guard_pages")]
        {
            // SAFETY: a guard page está dentro da faixa recém-alocada
            let guard = unsafe { NonNull::new_unchecked(block.as_ptr().add(span)) };
            if let Err(e) = self.pages.protect(guard, self.page.size(), Protection::NONE) {
                crate::kwarn!("(Heap) guard page recusada=", guard.as_ptr() as usize);
                // SAFETY: faixa recém-alocada, ainda sem dono
                if let Err(rollback) = unsafe { self.pages.free_pages(block, total) } {
                    crate::kerror!("(Heap) rollback da guard page falhou=", block.as_ptr() as usize);
                    crate::kerror!(rollback.as_str());
                }
                self.large.failures.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        }

        // SAFETY: faixa de `span` bytes, alinhada a página
        let ptr = unsafe { HeapHeader::new(HeaderTag::Large { size: span }).install(block) };
        self.large.allocations.fetch_add(1, Ordering::Relaxed);
        self.large.live_bytes.fetch_add(span, Ordering::Relaxed);
        crate::kdebug!("(Heap) alocação grande, span=", span);
        Ok(ptr)
    }

    #[inline]
    fn guard_size(&self) -> usize {
        if cfg!(feature = "guard_pages") {
            self.page.size()
        } else {
            0
        }
    }

    /// Lê o dono de um ponteiro devolvido pelo heap
    ///
    /// # Safety
    /// Os `HEAP_HEADER_SIZE` bytes antes de `ptr` precisam ser legíveis.
    unsafe fn owner(&self, ptr: NonNull<u8>) -> MmResult<(NonNull<u8>, HeaderTag)> {
        let block = HeapHeader::block_of(ptr).ok_or(MmError::InvalidAddress)?;
        match HeapHeader::read(block).tag() {
            Some(tag) => Ok((block, tag)),
            None => {
                crate::kwarn!("(Heap) cabeçalho inválido, ptr=", ptr.as_ptr() as usize);
                Err(MmError::InvalidAddress)
            }
        }
    }

    /// Libera um ponteiro do heap (FreeToHeap).
    ///
    /// # Safety
    /// `ptr` precisa ter vindo deste heap (ou, no mínimo, ter os bytes do
    /// cabeçalho legíveis). Depois do free o chamador não pode mais usá-lo.
    pub unsafe fn free(&self, ptr: NonNull<u8>) -> MmResult<()> {
        let (block, tag) = self.owner(ptr)?;

        match tag {
            HeaderTag::Bucket(index) => self.caches[index].free(block),
            HeaderTag::Large { size } => self.free_large(block, size),
        }
    }

    unsafe fn free_large(&self, block: NonNull<u8>, size: usize) -> MmResult<()> {
        if !self.page.is_aligned(block.as_ptr() as usize) || !self.page.is_aligned(size) {
            crate::kwarn!("(Heap) free grande desalinhado=", block.as_ptr() as usize);
            return Err(MmError::InvalidAddress);
        }

        // Um segundo free do mesmo ponteiro cai no magic zerado
        HeapHeader::clear_magic(block);

        #[cfg(feature = "guard_pages")]
        {
            let guard = NonNull::new_unchecked(block.as_ptr().add(size));
            if let Err(e) = self.pages.protect(guard, self.page.size(), Protection::RW) {
                HeapHeader::restore_magic(block);
                return Err(e);
            }
        }

        if let Err(e) = self.pages.free_pages(block, size + self.guard_size()) {
            HeapHeader::restore_magic(block);
            crate::kwarn!("(Heap) Page Source recusou free=", block.as_ptr() as usize);
            return Err(e);
        }

        self.large.frees.fetch_add(1, Ordering::Relaxed);
        self.large.live_bytes.fetch_sub(size, Ordering::Relaxed);
        crate::kdebug!("(Heap) free grande, span=", size);
        Ok(())
    }

    /// Bytes utilizáveis atrás de `ptr`
    ///
    /// # Safety
    /// Mesma exigência de `free`.
    pub unsafe fn usable_size(&self, ptr: NonNull<u8>) -> MmResult<usize> {
        let (_, tag) = self.owner(ptr)?;
        Ok(match tag {
            HeaderTag::Bucket(index) => bucket::usable_in_bucket(index),
            HeaderTag::Large { size } => size - HEAP_HEADER_SIZE,
        })
    }

    /// Redimensiona uma alocação.
    ///
    /// Se o novo tamanho continua no mesmo bucket (ou na mesma faixa grande),
    /// devolve o próprio `ptr`. Senão aloca, copia e libera o antigo.
    ///
    /// # Safety
    /// Mesma exigência de `free`. Em caso de sucesso com ponteiro novo, o
    /// antigo não pode mais ser usado.
    pub unsafe fn reallocate(&self, ptr: NonNull<u8>, new_size: usize) -> MmResult<NonNull<u8>> {
        let (_, tag) = self.owner(ptr)?;

        let (usable, same_class) = match tag {
            HeaderTag::Bucket(index) => {
                (bucket::usable_in_bucket(index), bucket_index(new_size) == Some(index))
            }
            HeaderTag::Large { size } => {
                let span = new_size
                    .checked_add(HEAP_HEADER_SIZE)
                    .and_then(|bytes| self.page.round_up(bytes));
                (
                    size - HEAP_HEADER_SIZE,
                    bucket_index(new_size).is_none() && span == Some(size),
                )
            }
        };

        if same_class {
            return Ok(ptr);
        }

        let new_ptr = self.allocate(new_size)?;
        core::ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.as_ptr(), usable.min(new_size));
        self.free(ptr)?;
        Ok(new_ptr)
    }

    /// Semeia os caches com memória já reservada (AddMemoryToHeap).
    ///
    /// Percorre `start..end` entregando um slab por bucket, em rodízio, até
    /// nenhum bucket caber no que sobrou. Retorna quantos slabs foram
    /// adicionados.
    ///
    /// # Safety
    /// `start..end` precisa ser memória válida, exclusiva do heap enquanto os
    /// caches existirem. Esses slabs serão devolvidos ao Page Source quando
    /// o heap for destruído.
    pub unsafe fn add_memory(&self, start: usize, end: usize) -> MmResult<usize> {
        if start >= end {
            return Err(MmError::InvalidParameter);
        }
        if start == 0 || !self.page.is_aligned(start) {
            return Err(MmError::NotAligned);
        }

        crate::kinfo!("(Heap) Semeando memória, início=", start);
        crate::kinfo!("(Heap) Semeando memória, fim=", end);

        let mut cursor = start;
        let mut bucket = 0usize;
        let mut misses = 0usize;
        let mut seeded = 0usize;

        while misses < HEAP_BUCKET_COUNT {
            let cache = &self.caches[bucket];
            let slab_size = cache.geometry().slab_size;

            match cursor.checked_add(slab_size) {
                Some(next) if next <= end => {
                    cache.add_slab(NonNull::new_unchecked(cursor as *mut u8))?;
                    cursor = next;
                    seeded += 1;
                    misses = 0;
                }
                _ => misses += 1,
            }
            bucket = (bucket + 1) % HEAP_BUCKET_COUNT;
        }

        crate::kdebug!("(Heap) slabs semeados=", seeded);
        Ok(seeded)
    }

    /// Estatísticas de todos os buckets e do caminho grande
    pub fn statistics(&self) -> HeapStats {
        HeapStats {
            buckets: core::array::from_fn(|i| self.caches[i].counters()),
            detailed: core::array::from_fn(|i| self.caches[i].statistics()),
            large_allocations: self.large.allocations.load(Ordering::Relaxed),
            large_frees: self.large.frees.load(Ordering::Relaxed),
            large_live_bytes: self.large.live_bytes.load(Ordering::Relaxed),
            large_failures: self.large.failures.load(Ordering::Relaxed),
        }
    }

    /// Despeja as estatísticas no log
    pub fn dump_statistics(&self) {
        let stats = self.statistics();
        crate::kinfo!("=== Heap: estatísticas ===");
        for (i, counters) in stats.buckets.iter().enumerate() {
            if counters.total_slabs == 0 {
                continue;
            }
            crate::kinfo!(HEAP_BUCKET_NAMES[i]);
            crate::kinfo!("  slabs=", counters.total_slabs);
            crate::kinfo!("  livres=", counters.free_slabs);
            crate::kinfo!("  parciais=", counters.partial_slabs);
            crate::kinfo!("  em uso=", counters.in_use_slabs);
            crate::kinfo!("  buffers livres=", counters.free_buffer_count);
            if let Some(detail) = stats.detailed[i] {
                crate::kinfo!("  allocs=", detail.allocations);
                crate::kinfo!("  frees=", detail.frees);
                crate::kinfo!("  grows=", detail.grows);
            }
        }
        crate::kinfo!("(Heap) grandes vivas=", stats.large_allocations - stats.large_frees);
        crate::kinfo!("(Heap) bytes grandes=", stats.large_live_bytes);
    }
}
