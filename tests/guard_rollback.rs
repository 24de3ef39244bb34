//! Guard page recusada: a faixa volta ao Page Source e a falha do
//! rollback aparece no log.

#![cfg(all(feature = "guard_pages", not(feature = "no_logs")))]

mod common;

use std::ptr::NonNull;
use std::sync::Mutex;

use common::{CountingPageSource, PAGE_SIZE};
use kmem::debug::{install_sink, LogSink};
use kmem::{Heap, MmError, MmResult, PageSource, Protection};

struct Capture(Mutex<String>);

impl LogSink for Capture {
    fn write_str(&self, s: &str) {
        self.0.lock().unwrap().push_str(s);
    }
}

static CAPTURE: Capture = Capture(Mutex::new(String::new()));

/// Recusa proteger páginas e, opcionalmente, recusa devolvê-las
struct NoGuards {
    inner: CountingPageSource,
    refuse_free: bool,
}

impl PageSource for NoGuards {
    fn page_size(&self) -> usize {
        self.inner.page_size()
    }

    fn alloc_pages(&self, size: usize) -> MmResult<NonNull<u8>> {
        self.inner.alloc_pages(size)
    }

    unsafe fn free_pages(&self, base: NonNull<u8>, size: usize) -> MmResult<()> {
        if self.refuse_free {
            return Err(MmError::NotMapped);
        }
        self.inner.free_pages(base, size)
    }

    fn protect(&self, _base: NonNull<u8>, _size: usize, _prot: Protection) -> MmResult<()> {
        Err(MmError::InvalidParameter)
    }
}

#[test]
fn refused_guard_page_rolls_back_and_logs_failures() {
    install_sink(&CAPTURE);

    let source = NoGuards {
        inner: CountingPageSource::new(),
        refuse_free: false,
    };
    let heap = Heap::new(&source).unwrap();
    assert_eq!(heap.allocate(5000), Err(MmError::InvalidParameter));
    assert_eq!(source.inner.freed_sizes(), vec![3 * PAGE_SIZE]);
    assert_eq!(source.inner.live_ranges(), 0);
    assert_eq!(heap.statistics().large_failures, 1);
    drop(heap);

    let stuck = NoGuards {
        inner: CountingPageSource::new(),
        refuse_free: true,
    };
    let heap = Heap::new(&stuck).unwrap();
    assert_eq!(heap.allocate(5000), Err(MmError::InvalidParameter));
    assert_eq!(heap.statistics().large_failures, 1);

    let log = CAPTURE.0.lock().unwrap().clone();
    assert!(log.contains("guard page recusada"));
    assert!(log.contains("rollback da guard page falhou=0x"));
    assert!(log.contains(MmError::NotMapped.as_str()));
}
