//! Global Allocator - `GlobalAlloc` sobre o heap do kernel.
//!
//! O heap é criado uma única vez em `init`, depois que o Page Source está
//! pronto. Até lá toda alocação devolve nulo. Nenhuma estrutura do heap
//! vive fora das páginas que ele mesmo gerencia, então ele pode ser o
//! `#[global_allocator]` do kernel.
//!
//! ```ignore
//! #[global_allocator]
//! static ALLOCATOR: KernelAllocator = KernelAllocator::new();
//!
//! ALLOCATOR.init(&BOOT_PAGES)?;
//! ```

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};

use spin::Once;

use crate::mm::config::MIN_BUFFER_ALIGN;
use crate::mm::error::{MmError, MmResult};
use crate::mm::page_source::PageSource;

use super::Heap;

/// Heap do kernel exposto como `GlobalAlloc`.
///
/// Alinhamento acima de `MIN_BUFFER_ALIGN` não é suportado: devolve nulo.
pub struct KernelAllocator {
    heap: Once<Heap<'static>>,
}

impl KernelAllocator {
    pub const fn new() -> Self {
        Self { heap: Once::new() }
    }

    /// Cria o heap sobre `pages`. Só a primeira chamada tem efeito.
    pub fn init(&self, pages: &'static dyn PageSource) -> MmResult<&Heap<'static>> {
        if self.heap.is_completed() {
            crate::kwarn!("(Heap) alocador global já inicializado");
            return Err(MmError::InitFailed);
        }
        let heap = Heap::new(pages)?;
        crate::kok!("(Heap) alocador global pronto");
        Ok(self.heap.call_once(|| heap))
    }

    /// Heap já criado, para seeding e estatísticas
    pub fn heap(&self) -> Option<&Heap<'static>> {
        self.heap.get()
    }

    #[inline]
    fn usable(&self, layout: &Layout) -> Option<&Heap<'static>> {
        if layout.align() > MIN_BUFFER_ALIGN {
            crate::ktrace!("(Heap) alinhamento não suportado=", layout.align());
            return None;
        }
        self.heap.get()
    }
}

impl Default for KernelAllocator {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl GlobalAlloc for KernelAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        match self.usable(&layout) {
            Some(heap) => heap
                .allocate(layout.size().max(1))
                .map_or(ptr::null_mut(), NonNull::as_ptr),
            None => ptr::null_mut(),
        }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        match self.usable(&layout) {
            Some(heap) => heap
                .allocate_zeroed(layout.size().max(1))
                .map_or(ptr::null_mut(), NonNull::as_ptr),
            None => ptr::null_mut(),
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        let (Some(heap), Some(ptr)) = (self.heap.get(), NonNull::new(ptr)) else {
            return;
        };
        if let Err(e) = heap.free(ptr) {
            crate::kerror!("(Heap) dealloc recusado=", ptr.as_ptr() as usize);
            crate::kerror!(e.as_str());
        }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let (Some(heap), Some(ptr)) = (self.usable(&layout), NonNull::new(ptr)) else {
            return ptr::null_mut();
        };
        heap.reallocate(ptr, new_size.max(1))
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }
}
