//! Memória de apoio para os testes unitários no host.

use std::alloc::{alloc_zeroed, dealloc, Layout};

use crate::mm::page_source::RegionPageSource;

/// Região alinhada a página obtida do alocador do host, com um
/// `RegionPageSource` sobre ela.
pub struct TestMemory {
    base: *mut u8,
    layout: Layout,
    pages: RegionPageSource,
}

impl TestMemory {
    pub fn new(size: usize, page_size: usize) -> Self {
        let layout = Layout::from_size_align(size, page_size).unwrap();
        let base = unsafe { alloc_zeroed(layout) };
        assert!(!base.is_null());
        let pages = unsafe { RegionPageSource::new(base as usize, size, page_size).unwrap() };
        Self {
            base,
            layout,
            pages,
        }
    }

    pub fn page_source(&self) -> &RegionPageSource {
        &self.pages
    }
}

impl Drop for TestMemory {
    fn drop(&mut self) {
        unsafe { dealloc(self.base, self.layout) };
    }
}

/// Bloco avulso alinhado a página, fora de qualquer Page Source.
pub struct RawPages {
    base: *mut u8,
    layout: Layout,
}

impl RawPages {
    pub fn new(size: usize, page_size: usize) -> Self {
        let layout = Layout::from_size_align(size, page_size).unwrap();
        let base = unsafe { alloc_zeroed(layout) };
        assert!(!base.is_null());
        Self { base, layout }
    }

    pub fn base(&self) -> usize {
        self.base as usize
    }

    pub fn end(&self) -> usize {
        self.base as usize + self.layout.size()
    }
}

impl Drop for RawPages {
    fn drop(&mut self) {
        unsafe { dealloc(self.base, self.layout) };
    }
}
