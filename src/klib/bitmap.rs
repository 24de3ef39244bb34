//! Bitmap genérico
//!
//! Usado como mapa de ocupação dos buffers de um slab (1 = em uso).
//! As palavras vivem dentro da própria memória do slab; o bitmap só
//! empresta a fatia.

/// Bits por palavra do bitmap
pub const BITS_PER_WORD: usize = u64::BITS as usize;

/// Bitmap para gerenciamento de bits
pub struct Bitmap<'a> {
    data: &'a mut [u64],
    len: usize,
}

impl<'a> Bitmap<'a> {
    /// Cria bitmap sobre slice existente
    pub fn new(data: &'a mut [u64], bits: usize) -> Self {
        debug_assert!(data.len() >= Self::words_for(bits));
        Self { data, len: bits }
    }

    /// Quantidade de palavras `u64` necessárias para `bits` bits
    pub const fn words_for(bits: usize) -> usize {
        (bits + BITS_PER_WORD - 1) / BITS_PER_WORD
    }

    /// Número de bits gerenciados
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Define um bit
    pub fn set(&mut self, index: usize) {
        debug_assert!(index < self.len);
        let word = index / BITS_PER_WORD;
        let bit = index % BITS_PER_WORD;
        self.data[word] |= 1 << bit;
    }

    /// Limpa um bit
    pub fn clear(&mut self, index: usize) {
        debug_assert!(index < self.len);
        let word = index / BITS_PER_WORD;
        let bit = index % BITS_PER_WORD;
        self.data[word] &= !(1 << bit);
    }

    /// Testa um bit
    pub fn test(&self, index: usize) -> bool {
        debug_assert!(index < self.len);
        let word = index / BITS_PER_WORD;
        let bit = index % BITS_PER_WORD;
        (self.data[word] & (1 << bit)) != 0
    }

    /// Zera todos os bits gerenciados
    pub fn clear_all(&mut self) {
        let words = Self::words_for(self.len);
        for word in self.data[..words].iter_mut() {
            *word = 0;
        }
    }

    /// Conta bits definidos (buffers em uso)
    pub fn count_ones(&self) -> usize {
        let words = Self::words_for(self.len);
        let mut total = 0usize;
        for (i, &word) in self.data[..words].iter().enumerate() {
            let mut w = word;
            let tail = self.len - i * BITS_PER_WORD;
            if tail < BITS_PER_WORD {
                w &= (1u64 << tail) - 1;
            }
            total += w.count_ones() as usize;
        }
        total
    }

    /// Encontra primeiro bit livre (0)
    pub fn find_first_zero(&self) -> Option<usize> {
        for (i, &word) in self.data.iter().enumerate() {
            if word != u64::MAX {
                let bit = word.trailing_ones() as usize;
                let index = i * BITS_PER_WORD + bit;
                if index < self.len {
                    return Some(index);
                }
            }
        }
        None
    }
}
