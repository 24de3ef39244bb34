//! # Page Source
//!
//! Fornecedor de faixas de memória alinhadas a página para o alocador.
//!
//! No kernel real é o VMM; no boot (antes do VMM estar pronto) e nos testes,
//! `RegionPageSource` recorta páginas de uma única região reservada.
//!
//! ## Contrato
//! - Todos os tamanhos são múltiplos de `page_size()`.
//! - `alloc_pages` devolve memória alinhada a `page_size()`, exclusiva do chamador.
//! - `free_pages` recebe exatamente a faixa entregue por `alloc_pages`.
//!
//! ## ⚠️ Ponto de Atenção
//! `alloc_pages` pode bloquear. O cache solta o próprio lock antes de
//! chamar o Page Source, mas o Page Source continua sendo chamado de
//! contextos sem garantia de poder dormir (não resolvido aqui).

use core::alloc::Layout;
use core::ptr::NonNull;

use bitflags::bitflags;
use linked_list_allocator::Heap as RegionHeap;
use spin::Mutex;

use crate::mm::config::{is_aligned, DEFAULT_PAGE_SIZE, MIN_PAGE_SIZE};
use crate::mm::error::{MmError, MmResult};

bitflags! {
    /// Proteção de uma faixa de páginas
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Protection: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC = 1 << 2;
    }
}

impl Protection {
    /// Sem acesso (guard page)
    pub const NONE: Self = Self::empty();
    /// Leitura + escrita (padrão do heap)
    pub const RW: Self = Self::READ.union(Self::WRITE);
}

/// Capacidade de obter e devolver páginas
pub trait PageSource: Sync {
    /// Tamanho da página (potência de 2)
    fn page_size(&self) -> usize;

    /// Obtém `size` bytes alinhados a página.
    fn alloc_pages(&self, size: usize) -> MmResult<NonNull<u8>>;

    /// Devolve uma faixa obtida com `alloc_pages`.
    ///
    /// # Safety
    /// `base..base + size` deve ter vindo deste Page Source e não pode mais
    /// ser acessada pelo chamador.
    unsafe fn free_pages(&self, base: NonNull<u8>, size: usize) -> MmResult<()>;

    /// Altera a proteção de uma faixa. Padrão: não suportado, ignora.
    fn protect(&self, _base: NonNull<u8>, _size: usize, _prot: Protection) -> MmResult<()> {
        Ok(())
    }
}

/// Geometria de página validada (tamanho + shift)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageGeometry {
    size: usize,
    shift: u32,
}

impl PageGeometry {
    pub fn new(page_size: usize) -> MmResult<Self> {
        if !page_size.is_power_of_two() || page_size < MIN_PAGE_SIZE {
            crate::kerror!("(Slab) page_size inválido=", page_size);
            return Err(MmError::InvalidParameter);
        }
        Ok(Self {
            size: page_size,
            shift: page_size.trailing_zeros(),
        })
    }

    /// Geometria do Page Source informado
    pub fn of(pages: &dyn PageSource) -> MmResult<Self> {
        Self::new(pages.page_size())
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn shift(&self) -> u32 {
        self.shift
    }

    /// Arredonda `bytes` para múltiplo de página (None em overflow)
    #[inline]
    pub fn round_up(&self, bytes: usize) -> Option<usize> {
        crate::klib::checked_align_up(bytes, self.size)
    }

    #[inline]
    pub fn is_aligned(&self, addr: usize) -> bool {
        is_aligned(addr, self.size)
    }

    #[inline]
    pub fn pages_for(&self, bytes: usize) -> Option<usize> {
        self.round_up(bytes).map(|b| b >> self.shift)
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self {
            size: DEFAULT_PAGE_SIZE,
            shift: DEFAULT_PAGE_SIZE.trailing_zeros(),
        }
    }
}

/// Configuração única do alocador: valida o Page Source e registra a geometria.
pub fn init_slab_allocator(pages: &dyn PageSource) -> MmResult<PageGeometry> {
    let geometry = PageGeometry::of(pages)?;
    crate::kinfo!("(Slab) init: page_size=", geometry.size());
    crate::kdebug!("(Slab) init: page_shift=", geometry.shift());
    Ok(geometry)
}

// =============================================================================
// REGION PAGE SOURCE
// =============================================================================

/// Page Source sobre uma região contígua reservada.
///
/// Usa um `linked_list_allocator::Heap` para recortar faixas alinhadas a
/// página e reaproveitá-las quando devolvidas.
pub struct RegionPageSource {
    page_size: usize,
    start: usize,
    end: usize,
    region: Mutex<RegionHeap>,
}

impl RegionPageSource {
    /// Page Source vazio (sem região). Toda alocação falha até `init`.
    pub const fn empty(page_size: usize) -> Self {
        Self {
            page_size,
            start: 0,
            end: 0,
            region: Mutex::new(RegionHeap::empty()),
        }
    }

    /// Cria o Page Source sobre `start..start + size`.
    ///
    /// # Safety
    /// A região deve estar mapeada, ser válida para leitura/escrita e não ser
    /// usada por mais ninguém enquanto este Page Source existir.
    pub unsafe fn new(start: usize, size: usize, page_size: usize) -> MmResult<Self> {
        let geometry = PageGeometry::new(page_size)?;
        if !geometry.is_aligned(start) || start == 0 {
            return Err(MmError::NotAligned);
        }
        if size < page_size || !geometry.is_aligned(size) {
            return Err(MmError::InvalidSize);
        }
        let end = start.checked_add(size).ok_or(MmError::InvalidSize)?;

        let mut heap = RegionHeap::empty();
        heap.init(start as *mut u8, size);

        crate::kdebug!("(PageSource) região início=", start);
        crate::kdebug!("(PageSource) região tamanho=", size);

        Ok(Self {
            page_size,
            start,
            end,
            region: Mutex::new(heap),
        })
    }

    /// Bytes ainda livres na região
    pub fn free_bytes(&self) -> usize {
        self.region.lock().free()
    }

    /// Bytes entregues (inclui fragmentação interna do gerenciador)
    pub fn used_bytes(&self) -> usize {
        self.region.lock().used()
    }

    /// A faixa está inteira dentro da região?
    pub fn contains(&self, base: usize, size: usize) -> bool {
        match base.checked_add(size) {
            Some(end) => base >= self.start && end <= self.end,
            None => false,
        }
    }

    fn layout_for(&self, size: usize) -> MmResult<Layout> {
        if size == 0 || !is_aligned(size, self.page_size) {
            return Err(MmError::InvalidSize);
        }
        Layout::from_size_align(size, self.page_size).map_err(|_| MmError::InvalidSize)
    }
}

impl PageSource for RegionPageSource {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn alloc_pages(&self, size: usize) -> MmResult<NonNull<u8>> {
        let layout = self.layout_for(size)?;
        match self.region.lock().allocate_first_fit(layout) {
            Ok(ptr) => {
                crate::ktrace!("(PageSource) alloc=", ptr.as_ptr() as usize);
                Ok(ptr)
            }
            Err(()) => {
                crate::kwarn!("(PageSource) OOM! size=", size);
                Err(MmError::OutOfMemory)
            }
        }
    }

    unsafe fn free_pages(&self, base: NonNull<u8>, size: usize) -> MmResult<()> {
        let layout = self.layout_for(size)?;
        let addr = base.as_ptr() as usize;
        if !is_aligned(addr, self.page_size) {
            return Err(MmError::NotAligned);
        }
        if !self.contains(addr, size) {
            crate::kwarn!("(PageSource) free fora da região=", addr);
            return Err(MmError::NotMapped);
        }
        self.region.lock().deallocate(base, layout);
        crate::ktrace!("(PageSource) free=", addr);
        Ok(())
    }
}
