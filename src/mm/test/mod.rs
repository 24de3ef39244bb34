//! # Testes do Alocador no Boot
//!
//! Suites executadas sobre o Page Source real, logo depois dele existir.
//!
//! - `slab_test.rs` - caches: crescimento, estados, double free, destruição
//! - `heap_test.rs` - heap: buckets, alocação grande, realloc
//!
//! # Uso
//! Chamar `run_memory_tests(&page_source)` no boot (feature `self_test`).


use crate::klib::test_framework::{run_test_suite, SuiteReport};
use crate::mm::page_source::PageSource;

/// Contexto das suites: o Page Source sob teste
pub type TestPages = dyn PageSource;

/// Executa todas as suites de memória
pub fn run_memory_tests(pages: &TestPages) -> SuiteReport {
    crate::kinfo!("╔════════════════════════════════════════╗");
    crate::kinfo!("║     🧪 TESTES DO ALOCADOR              ║");
    crate::kinfo!("╚════════════════════════════════════════╝");

    let mut report = run_test_suite("Slab", slab_test::SLAB_TESTS, pages);
    report.merge(run_test_suite("Heap", heap_test::HEAP_TESTS, pages));

    if report.all_passed() {
        crate::kok!("(MM) Todos os testes do alocador passaram");
    } else {
        crate::kfail!("(MM) Testes do alocador falharam");
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::testing::TestMemory;

    #[test]
    fn boot_suites_pass_on_region_source() {
        let memory = TestMemory::new(1024 * 4096, 4096);
        let report = run_memory_tests(memory.page_source());
        assert_eq!(report.failed, 0);
        assert!(report.passed > 0);
    }
}
