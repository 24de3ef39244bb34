//! Geometria do slab
//!
//! Calculada uma vez na criação do cache a partir do tamanho do buffer e da
//! página. O layout de todo slab do cache é:
//!
//! ```text
//! base                                  base + metadata_offset      base + slab_size
//! | buf 0 | buf 1 | ... | buf N-1 | pad | SlabRecord | bitmap words |
//! ```
//!
//! Os metadados ficam na cauda: o buffer 0 começa alinhado a página.

use crate::klib::bitmap::Bitmap;
use crate::mm::config::{checked_align_up, MIN_BUFFERS_PER_SLAB, MIN_BUFFER_ALIGN};
use crate::mm::error::{MmError, MmResult};
use crate::mm::page_source::PageGeometry;

use super::slab::RECORD_SIZE;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlabGeometry {
    /// Tamanho do buffer já arredondado para `MIN_BUFFER_ALIGN`
    pub buffer_size: usize,
    /// Múltiplo de página
    pub slab_size: usize,
    /// Buffers por slab
    pub buffer_count: usize,
    /// Offset do registro do slab
    pub metadata_offset: usize,
}

impl SlabGeometry {
    pub fn compute(buffer_size: usize, page: &PageGeometry) -> MmResult<Self> {
        if buffer_size == 0 {
            return Err(MmError::InvalidSize);
        }
        let buffer_size =
            checked_align_up(buffer_size, MIN_BUFFER_ALIGN).ok_or(MmError::InvalidSize)?;

        // Menor múltiplo de página com MIN_BUFFERS_PER_SLAB buffers + metadados
        let minimum = buffer_size
            .checked_mul(MIN_BUFFERS_PER_SLAB)
            .and_then(|b| b.checked_add(Self::metadata_size(MIN_BUFFERS_PER_SLAB)))
            .ok_or(MmError::InvalidSize)?;
        let slab_size = page.round_up(minimum).ok_or(MmError::InvalidSize)?;

        // Estimativa pelo registro, depois desconta o bitmap
        let mut buffer_count = (slab_size - RECORD_SIZE) / buffer_size;
        while buffer_count * buffer_size + Self::metadata_size(buffer_count) > slab_size {
            buffer_count -= 1;
        }

        Ok(Self {
            buffer_size,
            slab_size,
            buffer_count,
            metadata_offset: slab_size - Self::metadata_size(buffer_count),
        })
    }

    /// Bytes de metadados (registro + bitmap) para `count` buffers
    pub const fn metadata_size(count: usize) -> usize {
        RECORD_SIZE + Bitmap::words_for(count) * core::mem::size_of::<u64>()
    }

    /// Palavras do bitmap de cada slab
    #[inline]
    pub const fn bitmap_words(&self) -> usize {
        Bitmap::words_for(self.buffer_count)
    }

    /// Fim da área de buffers (offset relativo à base)
    #[inline]
    pub const fn buffers_end(&self) -> usize {
        self.buffer_count * self.buffer_size
    }
}
