//! Page Source de teste: memória do host, com contagem de chamadas.

#![allow(dead_code)]

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::Mutex;

use kmem::{MmError, MmResult, PageSource, Protection};

pub const PAGE_SIZE: usize = 4096;

#[derive(Default)]
struct Ledger {
    live: HashMap<usize, usize>,
    alloc_calls: usize,
    free_calls: usize,
    alloc_sizes: Vec<usize>,
    freed_sizes: Vec<usize>,
    protect_calls: Vec<(usize, usize, Protection)>,
    fail: bool,
}

/// Page Source sobre `std::alloc` que registra cada chamada
pub struct CountingPageSource {
    page_size: usize,
    limit: Option<usize>,
    ledger: Mutex<Ledger>,
}

impl CountingPageSource {
    pub fn new() -> Self {
        Self::with_page_size(PAGE_SIZE)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size,
            limit: None,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    /// Recusa alocações acima de `bytes` vivos
    pub fn with_limit(bytes: usize) -> Self {
        Self {
            page_size: PAGE_SIZE,
            limit: Some(bytes),
            ledger: Mutex::new(Ledger::default()),
        }
    }

    /// Toda alocação seguinte falha
    pub fn set_failing(&self, fail: bool) {
        self.ledger.lock().unwrap().fail = fail;
    }

    pub fn alloc_calls(&self) -> usize {
        self.ledger.lock().unwrap().alloc_calls
    }

    pub fn free_calls(&self) -> usize {
        self.ledger.lock().unwrap().free_calls
    }

    pub fn alloc_sizes(&self) -> Vec<usize> {
        self.ledger.lock().unwrap().alloc_sizes.clone()
    }

    pub fn freed_sizes(&self) -> Vec<usize> {
        self.ledger.lock().unwrap().freed_sizes.clone()
    }

    pub fn protect_calls(&self) -> Vec<(usize, usize, Protection)> {
        self.ledger.lock().unwrap().protect_calls.clone()
    }

    /// Faixas ainda não devolvidas
    pub fn live_ranges(&self) -> usize {
        self.ledger.lock().unwrap().live.len()
    }

    pub fn live_bytes(&self) -> usize {
        self.ledger.lock().unwrap().live.values().sum()
    }

    fn layout(&self, size: usize) -> Layout {
        Layout::from_size_align(size, self.page_size).unwrap()
    }
}

impl PageSource for CountingPageSource {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn alloc_pages(&self, size: usize) -> MmResult<NonNull<u8>> {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.alloc_calls += 1;
        ledger.alloc_sizes.push(size);

        if ledger.fail {
            return Err(MmError::OutOfMemory);
        }
        if let Some(limit) = self.limit {
            let live: usize = ledger.live.values().sum();
            if live + size > limit {
                return Err(MmError::OutOfMemory);
            }
        }

        let ptr = unsafe { alloc_zeroed(self.layout(size)) };
        let ptr = NonNull::new(ptr).ok_or(MmError::OutOfMemory)?;
        ledger.live.insert(ptr.as_ptr() as usize, size);
        Ok(ptr)
    }

    unsafe fn free_pages(&self, base: NonNull<u8>, size: usize) -> MmResult<()> {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.free_calls += 1;
        ledger.freed_sizes.push(size);

        let addr = base.as_ptr() as usize;
        match ledger.live.get(&addr).copied() {
            Some(live) if live == size => {
                ledger.live.remove(&addr);
                dealloc(base.as_ptr(), self.layout(size));
                Ok(())
            }
            Some(_) => Err(MmError::InvalidSize),
            None => Err(MmError::NotMapped),
        }
    }

    fn protect(&self, base: NonNull<u8>, size: usize, prot: Protection) -> MmResult<()> {
        let mut ledger = self.ledger.lock().unwrap();
        ledger
            .protect_calls
            .push((base.as_ptr() as usize, size, prot));
        Ok(())
    }
}

impl Drop for CountingPageSource {
    fn drop(&mut self) {
        let page_size = self.page_size;
        let ledger = self.ledger.get_mut().unwrap();
        for (&addr, &size) in ledger.live.iter() {
            let layout = Layout::from_size_align(size, page_size).unwrap();
            unsafe { dealloc(addr as *mut u8, layout) };
        }
    }
}

/// Memória reservada por fora do Page Source (seeding)
pub struct Reserved {
    base: *mut u8,
    layout: Layout,
}

impl Reserved {
    pub fn pages(count: usize) -> Self {
        let layout = Layout::from_size_align(count * PAGE_SIZE, PAGE_SIZE).unwrap();
        let base = unsafe { alloc_zeroed(layout) };
        assert!(!base.is_null());
        Self { base, layout }
    }

    pub fn start(&self) -> usize {
        self.base as usize
    }

    pub fn end(&self) -> usize {
        self.base as usize + self.layout.size()
    }
}

impl Drop for Reserved {
    fn drop(&mut self) {
        unsafe { dealloc(self.base, self.layout) };
    }
}

/// Gerador pseudo-aleatório determinístico para sequências de teste
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next_u64(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    pub fn below(&mut self, bound: usize) -> usize {
        (self.next_u64() % bound as u64) as usize
    }
}
