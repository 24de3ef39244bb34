//! Cenários do heap: buckets, caminho grande, seeding.

mod common;

use std::ptr::NonNull;

use common::{CountingPageSource, Reserved, PAGE_SIZE};
use kmem::mm::config::{HEAP_BUCKET_COUNT, HEAP_BUCKET_SIZES, HEAP_HEADER_SIZE};
use kmem::{AllocFlags, Heap, MmError};

const GUARD: usize = if cfg!(feature = "guard_pages") {
    PAGE_SIZE
} else {
    0
};

#[test]
fn bucket_boundaries_are_exact() {
    let source = CountingPageSource::new();
    let heap = Heap::new(&source).unwrap();

    for (boundary, bucket) in [(16, 0), (64, 3), (256, 7), (4096, 11)] {
        let size = boundary - HEAP_HEADER_SIZE;
        assert_eq!(heap.bucket_of(size), Some(bucket));
        assert_eq!(HEAP_BUCKET_SIZES[bucket], boundary);

        let ptr = heap.allocate(size).unwrap();
        assert_eq!(heap.cache(bucket).unwrap().counters().in_use_slabs, 1);
        assert_eq!(unsafe { heap.usable_size(ptr) }, Ok(size));
        unsafe { heap.free(ptr) }.unwrap();

        // Um byte a mais vai para o próximo bucket (ou para o caminho grande)
        assert_ne!(heap.bucket_of(size + 1), Some(bucket));
    }
    assert_eq!(heap.bucket_of(4096 - HEAP_HEADER_SIZE + 1), None);
}

#[test]
fn every_bucket_serves_its_class() {
    let source = CountingPageSource::new();
    let heap = Heap::new(&source).unwrap();

    let ptrs: Vec<_> = (0..HEAP_BUCKET_COUNT)
        .map(|bucket| heap.allocate(HEAP_BUCKET_SIZES[bucket] - HEAP_HEADER_SIZE).unwrap())
        .collect();
    for bucket in 0..HEAP_BUCKET_COUNT {
        let counters = heap.cache(bucket).unwrap().counters();
        assert_eq!(counters.total_slabs, 1, "bucket {}", bucket);
    }
    assert_eq!(source.alloc_calls(), HEAP_BUCKET_COUNT);

    for ptr in ptrs {
        assert_eq!(ptr.as_ptr() as usize % 8, 0);
        unsafe { heap.free(ptr) }.unwrap();
    }
}

#[test]
fn large_allocation_frees_exact_rounded_size() {
    let source = CountingPageSource::new();
    let heap = Heap::new(&source).unwrap();

    let ptr = heap.allocate(5000).unwrap();
    assert_eq!(source.alloc_sizes(), vec![2 * PAGE_SIZE + GUARD]);

    let block = ptr.as_ptr() as usize - HEAP_HEADER_SIZE;
    assert_eq!(block % PAGE_SIZE, 0);
    assert_eq!(
        unsafe { heap.usable_size(ptr) },
        Ok(2 * PAGE_SIZE - HEAP_HEADER_SIZE)
    );

    unsafe { ptr.as_ptr().write_bytes(0x77, 5000) };
    unsafe { heap.free(ptr) }.unwrap();

    assert_eq!(source.freed_sizes(), vec![2 * PAGE_SIZE + GUARD]);
    assert_eq!(source.live_ranges(), 0);

    let stats = heap.statistics();
    assert_eq!(stats.large_allocations, 1);
    assert_eq!(stats.large_frees, 1);
    assert_eq!(stats.large_live_bytes, 0);
}

#[test]
fn page_sized_request_takes_large_path() {
    let source = CountingPageSource::new();
    let heap = Heap::new(&source).unwrap();

    let ptr = heap.allocate(PAGE_SIZE).unwrap();
    assert_eq!(source.alloc_sizes(), vec![2 * PAGE_SIZE + GUARD]);
    unsafe { heap.free(ptr) }.unwrap();

    let ptr = heap.allocate(3 * PAGE_SIZE - HEAP_HEADER_SIZE).unwrap();
    assert_eq!(source.alloc_sizes()[1], 3 * PAGE_SIZE + GUARD);
    unsafe { heap.free(ptr) }.unwrap();
}

#[test]
fn no_sleep_never_reaches_page_source() {
    let source = CountingPageSource::new();
    let heap = Heap::new(&source).unwrap();

    assert_eq!(
        heap.allocate_with(100, AllocFlags::NO_SLEEP),
        Err(MmError::OutOfMemory)
    );
    assert_eq!(
        heap.allocate_with(100_000, AllocFlags::NO_SLEEP),
        Err(MmError::OutOfMemory)
    );
    assert_eq!(source.alloc_calls(), 0);
}

#[test]
fn page_source_failure_is_reported() {
    let source = CountingPageSource::new();
    let heap = Heap::new(&source).unwrap();
    source.set_failing(true);

    assert_eq!(heap.allocate(10), Err(MmError::OutOfMemory));
    assert_eq!(heap.allocate(20_000), Err(MmError::OutOfMemory));
    assert_eq!(heap.statistics().large_failures, 1);
}

#[test]
fn bad_pointers_are_rejected() {
    let source = CountingPageSource::new();
    let heap = Heap::new(&source).unwrap();

    let mut junk = [0u64; 8];
    let inside = NonNull::new(junk[2..].as_mut_ptr().cast::<u8>()).unwrap();
    assert_eq!(unsafe { heap.free(inside) }, Err(MmError::InvalidAddress));
    assert_eq!(unsafe { heap.usable_size(inside) }, Err(MmError::InvalidAddress));

    let a = heap.allocate(30).unwrap();
    let b = heap.allocate(30).unwrap();
    unsafe { heap.free(a) }.unwrap();
    assert_eq!(unsafe { heap.free(a) }, Err(MmError::DoubleFree));

    let large = heap.allocate(9000).unwrap();
    unsafe { heap.free(large) }.unwrap();
    unsafe { heap.free(b) }.unwrap();
}

#[test]
fn failed_large_free_keeps_header_valid() {
    let source = CountingPageSource::new();
    let heap = Heap::new(&source).unwrap();

    // Bloco "grande" forjado fora do Page Source
    let reserved = Reserved::pages(2);
    let block = reserved.start();
    unsafe {
        let header = kmem::mm::heap::HeapHeader::new(kmem::mm::heap::HeaderTag::Large {
            size: PAGE_SIZE,
        });
        let ptr = header.install(NonNull::new(block as *mut u8).unwrap());

        assert_eq!(heap.free(ptr), Err(MmError::NotMapped));
        // Cabeçalho restaurado: a mesma falha se repete
        assert_eq!(heap.usable_size(ptr), Ok(PAGE_SIZE - HEAP_HEADER_SIZE));
        assert_eq!(heap.free(ptr), Err(MmError::NotMapped));
    }
}

#[test]
fn reallocate_moves_between_classes() {
    let source = CountingPageSource::new();
    let heap = Heap::new(&source).unwrap();

    let ptr = heap.allocate(100).unwrap();
    unsafe { ptr.as_ptr().write_bytes(0x42, 100) };

    unsafe {
        assert_eq!(heap.reallocate(ptr, 110), Ok(ptr));

        let large = heap.reallocate(ptr, 10_000).unwrap();
        assert_ne!(large, ptr);
        assert!(std::slice::from_raw_parts(large.as_ptr(), 100)
            .iter()
            .all(|&b| b == 0x42));
        assert_eq!(heap.reallocate(large, 10_100), Ok(large));

        let small = heap.reallocate(large, 50).unwrap();
        assert!(std::slice::from_raw_parts(small.as_ptr(), 50)
            .iter()
            .all(|&b| b == 0x42));
        heap.free(small).unwrap();
    }
    assert_eq!(heap.statistics().large_live_bytes, 0);
}

#[test]
fn add_memory_seeds_buckets_round_robin() {
    let source = CountingPageSource::new();
    let reserved = Reserved::pages(256);
    let heap = Heap::new(&source).unwrap();

    assert_eq!(
        unsafe { heap.add_memory(reserved.end(), reserved.start()) },
        Err(MmError::InvalidParameter)
    );
    assert_eq!(
        unsafe { heap.add_memory(reserved.start() + 1, reserved.end()) },
        Err(MmError::NotAligned)
    );

    let seeded = unsafe { heap.add_memory(reserved.start(), reserved.end()) }.unwrap();
    let total: usize = (0..HEAP_BUCKET_COUNT)
        .map(|b| heap.cache(b).unwrap().counters().total_slabs)
        .sum();
    assert_eq!(seeded, total);

    // Rodízio: nenhum bucket fica sem slab, e a diferença entre eles é pequena
    let per_bucket: Vec<usize> = (0..HEAP_BUCKET_COUNT)
        .map(|b| heap.cache(b).unwrap().counters().free_slabs)
        .collect();
    let min = *per_bucket.iter().min().unwrap();
    let max = *per_bucket.iter().max().unwrap();
    assert!(min >= 1);
    assert!(max - min <= 1);

    // Memória semeada atende sem o Page Source, mesmo com NO_SLEEP
    let ptrs: Vec<_> = (0..HEAP_BUCKET_COUNT)
        .map(|b| {
            heap.allocate_with(HEAP_BUCKET_SIZES[b] - HEAP_HEADER_SIZE, AllocFlags::NO_SLEEP)
                .unwrap()
        })
        .collect();
    assert_eq!(source.alloc_calls(), 0);

    for ptr in ptrs {
        unsafe { heap.free(ptr) }.unwrap();
    }

    // Seeding repetido sobre a mesma faixa é recusado
    assert_eq!(
        unsafe { heap.add_memory(reserved.start(), reserved.end()) },
        Err(MmError::AlreadyMapped)
    );
}

#[test]
fn small_range_seeds_only_what_fits() {
    let source = CountingPageSource::new();
    let reserved = Reserved::pages(3);
    let heap = Heap::new(&source).unwrap();

    let seeded = unsafe { heap.add_memory(reserved.start(), reserved.end()) }.unwrap();
    assert_eq!(seeded, 3);
    for bucket in 0..3 {
        assert_eq!(heap.cache(bucket).unwrap().counters().free_slabs, 1);
    }
    assert_eq!(heap.cache(3).unwrap().counters().free_slabs, 0);
}

#[test]
fn statistics_cover_every_bucket() {
    let source = CountingPageSource::new();
    let heap = Heap::new(&source).unwrap();

    let a = heap.allocate(10).unwrap();
    let b = heap.allocate(1000).unwrap();
    let stats = heap.statistics();
    assert_eq!(stats.buckets[1].in_use_slabs, 1);
    assert_eq!(stats.buckets[9].in_use_slabs, 1);
    assert_eq!(stats.buckets[0].total_slabs, 0);

    if cfg!(feature = "alloc_stats") {
        let detail = stats.detailed[1].unwrap();
        assert_eq!(detail.allocations, 1);
        assert_eq!(detail.buffer_size, 32);
    } else {
        assert!(stats.detailed.iter().all(Option::is_none));
    }

    heap.dump_statistics();
    unsafe {
        heap.free(a).unwrap();
        heap.free(b).unwrap();
    }
}

#[test]
fn dropping_heap_returns_all_slabs() {
    let source = CountingPageSource::new();
    {
        let heap = Heap::new(&source).unwrap();
        for size in [8, 40, 100, 300, 700, 2000, 4000] {
            for _ in 0..20 {
                heap.allocate(size).unwrap();
            }
        }
        assert!(source.live_ranges() > 7);
    }
    assert_eq!(source.live_ranges(), 0);
}

#[cfg(feature = "guard_pages")]
#[test]
fn large_allocation_gets_guard_page() {
    use kmem::Protection;

    let source = CountingPageSource::new();
    let heap = Heap::new(&source).unwrap();

    let ptr = heap.allocate(5000).unwrap();
    let block = ptr.as_ptr() as usize - HEAP_HEADER_SIZE;
    assert_eq!(
        source.protect_calls(),
        vec![(block + 2 * PAGE_SIZE, PAGE_SIZE, Protection::NONE)]
    );

    unsafe { heap.free(ptr) }.unwrap();
    assert_eq!(
        source.protect_calls()[1],
        (block + 2 * PAGE_SIZE, PAGE_SIZE, Protection::RW)
    );
}
