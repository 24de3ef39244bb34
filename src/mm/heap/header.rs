//! Cabeçalho `HEAP_DATA` gravado antes de cada ponteiro devolvido pelo heap.
//!
//! ```text
//! bloco                      ponteiro do usuário
//! | tag u32 | magic u32 | size usize | dados ...
//! |<------- HEAP_HEADER_SIZE ------->|
//! ```

use core::mem::size_of;
use core::ptr::NonNull;

use crate::mm::config::{HEAP_BUCKET_COUNT, HEAP_HEADER_MAGIC, HEAP_HEADER_SIZE, HEAP_LARGE_TAG};

/// Dono de uma alocação do heap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderTag {
    /// Buffer do cache deste bucket
    Bucket(usize),
    /// Faixa direta do Page Source com este tamanho (múltiplo de página)
    Large { size: usize },
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct HeapHeader {
    tag: u32,
    magic: u32,
    size: usize,
}

const _: () = assert!(size_of::<HeapHeader>() <= HEAP_HEADER_SIZE);

impl HeapHeader {
    pub fn new(tag: HeaderTag) -> Self {
        match tag {
            HeaderTag::Bucket(index) => Self {
                tag: index as u32,
                magic: HEAP_HEADER_MAGIC,
                size: 0,
            },
            HeaderTag::Large { size } => Self {
                tag: HEAP_LARGE_TAG,
                magic: HEAP_HEADER_MAGIC,
                size,
            },
        }
    }

    /// Decodifica o dono. `None` se o cabeçalho não é válido.
    pub fn tag(&self) -> Option<HeaderTag> {
        if self.magic != HEAP_HEADER_MAGIC {
            return None;
        }
        if self.tag == HEAP_LARGE_TAG {
            return Some(HeaderTag::Large { size: self.size });
        }
        let index = self.tag as usize;
        (index < HEAP_BUCKET_COUNT).then_some(HeaderTag::Bucket(index))
    }

    /// Grava o cabeçalho no início de `block` e devolve o ponteiro do usuário.
    ///
    /// # Safety
    /// `block` precisa ter pelo menos `HEAP_HEADER_SIZE` bytes graváveis,
    /// alinhados a `usize`.
    pub unsafe fn install(self, block: NonNull<u8>) -> NonNull<u8> {
        block.as_ptr().cast::<HeapHeader>().write(self);
        NonNull::new_unchecked(block.as_ptr().add(HEAP_HEADER_SIZE))
    }

    /// Início do bloco que contém o ponteiro do usuário `ptr`
    pub fn block_of(ptr: NonNull<u8>) -> Option<NonNull<u8>> {
        let addr = (ptr.as_ptr() as usize).checked_sub(HEAP_HEADER_SIZE)?;
        NonNull::new(addr as *mut u8)
    }

    /// Lê o cabeçalho do bloco.
    ///
    /// # Safety
    /// `block` precisa apontar para memória legível com um `HeapHeader`.
    pub unsafe fn read(block: NonNull<u8>) -> Self {
        block.as_ptr().cast::<HeapHeader>().read()
    }

    /// Invalida o cabeçalho (antes de devolver a faixa)
    ///
    /// # Safety
    /// Mesma exigência de `install`.
    pub unsafe fn clear_magic(block: NonNull<u8>) {
        (*block.as_ptr().cast::<HeapHeader>()).magic = 0;
    }

    /// Desfaz `clear_magic` quando a devolução falhou
    ///
    /// # Safety
    /// Mesma exigência de `install`.
    pub unsafe fn restore_magic(block: NonNull<u8>) {
        (*block.as_ptr().cast::<HeapHeader>()).magic = HEAP_HEADER_MAGIC;
    }
}
