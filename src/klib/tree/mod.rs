//! Árvores e índices ordenados.

pub mod index;

pub use index::{compare_address, AddressIndex, TreeLinks, TreeStore};
