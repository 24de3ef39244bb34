//! # Memory Management (MM) - Alocador dinâmico do kernel
//!
//! Slab allocator + heap por buckets. Consumido por todo subsistema que
//! precisa de memória dinâmica (threads, tasks, nós do VFS, buffers de IPC).
//!
//! ## 🏗️ Arquitetura dos Módulos
//!
//! | Módulo        | Responsabilidade                                           |
//! |---------------|------------------------------------------------------------|
//! | `page_source` | Contrato com quem fornece páginas (VMM) + região de boot.  |
//! | `slab`        | Caches de objetos de tamanho fixo, máquina de estados.     |
//! | `heap`        | `malloc`/`free` sobre 12 buckets + caminho grande.         |
//! | `config`      | Constantes e limites.                                      |
//! | `error`       | `MmError` / `MmResult`.                                    |
//!
//! ## Ordem de Inicialização
//! 1. Page Source pronto (VMM ou `RegionPageSource`).
//! 2. `Heap::new(&pages)` (valida a página, cria os caches).
//! 3. Opcional: `heap.add_memory(start, end)` com memória reservada no boot.
//! 4. Opcional: `test::run_memory_tests(&pages)` (feature `self_test`).
//!
//! ## ⚠️ Pontos de Atenção
//! - **Lock por cache:** operações em caches diferentes não competem.
//! - **Page Source bloqueante:** o cache solta o lock para crescer, mas o
//!   Page Source ainda pode ser chamado em contexto que não pode dormir.
//!   Use `AllocFlags::NO_SLEEP` nesses contextos.
//! - **Slab vazio não volta ao Page Source:** só na destruição do cache.

pub mod config;
pub mod error;
pub mod heap;
pub mod page_source;
pub mod slab;

#[cfg(any(test, feature = "self_test"))]
pub mod test;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{MmError, MmResult};
pub use heap::Heap;
pub use page_source::{init_slab_allocator, PageGeometry, PageSource, Protection, RegionPageSource};
