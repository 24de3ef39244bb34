//! Slab: faixa alinhada a página dividida em buffers de mesmo tamanho.
//!
//! Todo o registro do slab vive na cauda do próprio slab, no offset da
//! geometria: um `SlabRecord` (assinatura, contagem, estado, links das
//! listas e da árvore) seguido do bitmap de ocupação. O handle `SlabId` é o
//! endereço base. Nenhuma memória fora dos slabs é usada para registrá-los.

use core::mem::size_of;
use core::num::NonZeroUsize;

use crate::klib::bitmap::Bitmap;
use crate::klib::list::{Link, LinkStore, ListLinks};
use crate::klib::tree::{TreeLinks, TreeStore};
use crate::mm::config::SLAB_TRAILER_MAGIC;

use super::geometry::SlabGeometry;

/// Estado de um slab
///
/// ```text
/// NEW -> FREE <-> MIXED <-> USED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlabState {
    /// Bytes recém-obtidos, metadados ainda não inicializados
    New,
    /// Nenhum buffer em uso
    Free,
    /// Parcialmente ocupado
    Mixed,
    /// Todos os buffers em uso
    Used,
}

impl SlabState {
    /// Estado esperado para `used` de `capacity` buffers em uso
    pub fn of(used: usize, capacity: usize) -> Self {
        if used == 0 {
            SlabState::Free
        } else if used == capacity {
            SlabState::Used
        } else {
            SlabState::Mixed
        }
    }

    /// A transição `self -> to` é legal?
    pub fn can_transition(self, to: SlabState) -> bool {
        matches!(
            (self, to),
            (SlabState::New, SlabState::Free)
                | (SlabState::Free, SlabState::Mixed)
                | (SlabState::Mixed, SlabState::Free)
                | (SlabState::Mixed, SlabState::Used)
                | (SlabState::Used, SlabState::Mixed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SlabState::New => "NEW",
            SlabState::Free => "FREE",
            SlabState::Mixed => "MIXED",
            SlabState::Used => "USED",
        }
    }

    const fn as_raw(self) -> u8 {
        match self {
            SlabState::New => 0,
            SlabState::Free => 1,
            SlabState::Mixed => 2,
            SlabState::Used => 3,
        }
    }

    /// Valor desconhecido vira NEW, que nenhuma verificação aceita
    const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => SlabState::Free,
            2 => SlabState::Mixed,
            3 => SlabState::Used,
            _ => SlabState::New,
        }
    }
}

/// Handle de um slab: o endereço base
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlabId(NonZeroUsize);

impl SlabId {
    #[inline]
    pub(crate) fn new(base: usize) -> Option<Self> {
        NonZeroUsize::new(base).map(Self)
    }

    #[inline]
    pub fn base(&self) -> usize {
        self.0.get()
    }
}

#[inline]
fn raw_link(link: Link<SlabId>) -> usize {
    link.node().map_or(0, |id| id.base())
}

#[inline]
fn link_of(raw: usize) -> Link<SlabId> {
    match SlabId::new(raw) {
        Some(id) => Link::Node(id),
        None => Link::End,
    }
}

/// Registro na cauda do slab, seguido pelo bitmap.
///
/// Links são endereços base crus; 0 marca o fim.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct SlabRecord {
    magic: u64,
    id: usize,
    used: u32,
    state: u8,
    free_linked: u8,
    partial_linked: u8,
    _reserved: u8,
    free_prev: usize,
    free_next: usize,
    partial_prev: usize,
    partial_next: usize,
    left: usize,
    right: usize,
    height: u32,
    _pad: u32,
}

pub const RECORD_SIZE: usize = size_of::<SlabRecord>();

const _: () = assert!(RECORD_SIZE == 80);
const _: () = assert!(RECORD_SIZE % size_of::<u64>() == 0);

/// Acesso aos registros dos slabs de um cache.
///
/// Só guarda a geometria: os dados vivem nos próprios slabs, e o lock do
/// cache serializa todo acesso.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SlabArena {
    geometry: SlabGeometry,
}

impl SlabArena {
    pub(crate) const fn new(geometry: SlabGeometry) -> Self {
        Self { geometry }
    }

    #[inline]
    fn record_ptr(&self, id: SlabId) -> *mut SlabRecord {
        (id.base() + self.geometry.metadata_offset) as *mut SlabRecord
    }

    #[inline]
    fn read(&self, id: SlabId) -> SlabRecord {
        // SAFETY: `id` veio de `format` sobre memória do cache
        unsafe { self.record_ptr(id).read() }
    }

    #[inline]
    fn update(&mut self, id: SlabId, f: impl FnOnce(&mut SlabRecord)) {
        let mut record = self.read(id);
        f(&mut record);
        // SAFETY: idem `read`
        unsafe { self.record_ptr(id).write(record) };
    }

    /// Grava um registro NEW sobre `base` e zera o bitmap.
    ///
    /// # Safety
    /// `base..base + slab_size` precisa ser memória válida, exclusiva do
    /// cache, enquanto o slab existir.
    pub(crate) unsafe fn format(&mut self, base: usize) -> Option<SlabId> {
        let id = SlabId::new(base)?;
        let record = SlabRecord {
            magic: SLAB_TRAILER_MAGIC,
            id: base,
            used: 0,
            state: SlabState::New.as_raw(),
            free_linked: 0,
            partial_linked: 0,
            _reserved: 0,
            free_prev: 0,
            free_next: 0,
            partial_prev: 0,
            partial_next: 0,
            left: 0,
            right: 0,
            height: 0,
            _pad: 0,
        };
        self.record_ptr(id).write(record);
        self.bitmap(id).clear_all();
        Some(id)
    }

    /// O registro ainda identifica este slab?
    pub(crate) fn trailer_matches(&self, id: SlabId) -> bool {
        let record = self.read(id);
        record.magic == SLAB_TRAILER_MAGIC && record.id == id.base()
    }

    #[inline]
    pub(crate) fn used(&self, id: SlabId) -> usize {
        self.read(id).used as usize
    }

    pub(crate) fn set_used(&mut self, id: SlabId, used: usize) {
        self.update(id, |r| r.used = used as u32);
    }

    #[inline]
    pub(crate) fn state(&self, id: SlabId) -> SlabState {
        SlabState::from_raw(self.read(id).state)
    }

    pub(crate) fn set_state(&mut self, id: SlabId, state: SlabState) {
        self.update(id, |r| r.state = state.as_raw());
    }

    pub(crate) fn in_free_list(&self, id: SlabId) -> bool {
        self.read(id).free_linked != 0
    }

    pub(crate) fn in_partial_list(&self, id: SlabId) -> bool {
        self.read(id).partial_linked != 0
    }

    /// O endereço cai dentro deste slab?
    #[inline]
    pub(crate) fn contains(&self, id: SlabId, addr: usize) -> bool {
        addr >= id.base() && addr - id.base() < self.geometry.slab_size
    }

    /// Bitmap de ocupação, logo após o registro
    pub(crate) fn bitmap(&mut self, id: SlabId) -> Bitmap<'_> {
        let words = (id.base() + self.geometry.metadata_offset + RECORD_SIZE) as *mut u64;
        // O `&mut self` garante uma única visão do bitmap por vez
        let data = unsafe { core::slice::from_raw_parts_mut(words, self.geometry.bitmap_words()) };
        Bitmap::new(data, self.geometry.buffer_count)
    }
}

/// Links da lista de slabs completamente livres
pub(crate) struct FreeLinks(pub(crate) SlabArena);

impl LinkStore<SlabId> for FreeLinks {
    fn links(&self, node: SlabId) -> ListLinks<SlabId> {
        let r = self.0.read(node);
        ListLinks::from_parts(link_of(r.free_prev), link_of(r.free_next), r.free_linked != 0)
    }

    fn set_links(&mut self, node: SlabId, links: ListLinks<SlabId>) {
        self.0.update(node, |r| {
            r.free_prev = raw_link(links.prev());
            r.free_next = raw_link(links.next());
            r.free_linked = links.is_linked() as u8;
        });
    }
}

/// Links da lista de slabs parcialmente livres
pub(crate) struct PartialLinks(pub(crate) SlabArena);

impl LinkStore<SlabId> for PartialLinks {
    fn links(&self, node: SlabId) -> ListLinks<SlabId> {
        let r = self.0.read(node);
        ListLinks::from_parts(
            link_of(r.partial_prev),
            link_of(r.partial_next),
            r.partial_linked != 0,
        )
    }

    fn set_links(&mut self, node: SlabId, links: ListLinks<SlabId>) {
        self.0.update(node, |r| {
            r.partial_prev = raw_link(links.prev());
            r.partial_next = raw_link(links.next());
            r.partial_linked = links.is_linked() as u8;
        });
    }
}

/// Índice por endereço: a chave é a faixa inteira do slab
impl TreeStore<SlabId> for SlabArena {
    fn tree_links(&self, node: SlabId) -> TreeLinks<SlabId> {
        let r = self.read(node);
        TreeLinks::from_parts(SlabId::new(r.left), SlabId::new(r.right), r.height)
    }

    fn set_tree_links(&mut self, node: SlabId, links: TreeLinks<SlabId>) {
        self.update(node, |r| {
            r.left = links.left().map_or(0, |id| id.base());
            r.right = links.right().map_or(0, |id| id.base());
            r.height = links.height();
        });
    }

    fn span(&self, node: SlabId) -> (usize, usize) {
        (node.base(), node.base() + self.geometry.slab_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::klib::list::IntrusiveList;
    use crate::mm::page_source::PageGeometry;
    use crate::mm::testing::RawPages;

    fn geometry() -> SlabGeometry {
        SlabGeometry::compute(64, &PageGeometry::new(4096).unwrap()).unwrap()
    }

    #[test]
    fn state_of_usage() {
        assert_eq!(SlabState::of(0, 8), SlabState::Free);
        assert_eq!(SlabState::of(3, 8), SlabState::Mixed);
        assert_eq!(SlabState::of(8, 8), SlabState::Used);
    }

    #[test]
    fn only_adjacent_transitions_are_legal() {
        use SlabState::*;
        assert!(New.can_transition(Free));
        assert!(Free.can_transition(Mixed));
        assert!(Mixed.can_transition(Free));
        assert!(Mixed.can_transition(Used));
        assert!(Used.can_transition(Mixed));

        assert!(!New.can_transition(Mixed));
        assert!(!Free.can_transition(Used));
        assert!(!Used.can_transition(Free));
        assert!(!Free.can_transition(New));
        assert!(!Mixed.can_transition(Mixed));
    }

    #[test]
    fn raw_state_round_trips_and_rejects_garbage() {
        for state in [SlabState::New, SlabState::Free, SlabState::Mixed, SlabState::Used] {
            assert_eq!(SlabState::from_raw(state.as_raw()), state);
        }
        assert_eq!(SlabState::from_raw(0xFF), SlabState::New);
    }

    #[test]
    fn format_writes_record_and_clears_bitmap() {
        let geometry = geometry();
        let memory = RawPages::new(geometry.slab_size, 4096);

        // Sujeira prévia na área de metadados
        unsafe {
            core::ptr::write_bytes(
                (memory.base() + geometry.metadata_offset) as *mut u8,
                0xFF,
                geometry.slab_size - geometry.metadata_offset,
            );
        }

        let mut arena = SlabArena::new(geometry);
        let id = unsafe { arena.format(memory.base()) }.unwrap();

        assert_eq!(id.base(), memory.base());
        assert!(arena.trailer_matches(id));
        assert_eq!(arena.state(id), SlabState::New);
        assert_eq!(arena.used(id), 0);
        assert!(!arena.in_free_list(id) && !arena.in_partial_list(id));
        assert_eq!(arena.bitmap(id).count_ones(), 0);
        assert_eq!(arena.bitmap(id).len(), 62);
        assert!(arena.contains(id, memory.base() + 4095));
        assert!(!arena.contains(id, memory.base() + 4096));

        // Assinatura pisada: o registro não identifica mais o slab
        unsafe { ((memory.base() + geometry.metadata_offset) as *mut u64).write(0) };
        assert!(!arena.trailer_matches(id));
    }

    #[test]
    fn record_fits_before_bitmap() {
        let geometry = geometry();
        assert!(geometry.buffers_end() <= geometry.metadata_offset);
        assert_eq!(
            geometry.metadata_offset + RECORD_SIZE + geometry.bitmap_words() * 8,
            geometry.slab_size
        );
    }

    #[test]
    fn lists_link_through_slab_memory() {
        let geometry = geometry();
        let memory = RawPages::new(3 * geometry.slab_size, 4096);
        let mut arena = SlabArena::new(geometry);
        let ids: [SlabId; 3] = core::array::from_fn(|i| unsafe {
            arena.format(memory.base() + i * geometry.slab_size).unwrap()
        });

        let mut free = IntrusiveList::new();
        let mut partial = IntrusiveList::new();
        for id in ids {
            free.push_front(&mut FreeLinks(arena), id);
        }
        partial.push_front(&mut PartialLinks(arena), ids[1]);

        assert!(arena.in_free_list(ids[1]) && arena.in_partial_list(ids[1]));
        assert!(!arena.in_partial_list(ids[0]));

        free.remove(&mut FreeLinks(arena), ids[1]);
        let order: std::vec::Vec<SlabId> = free.iter(&FreeLinks(arena)).collect();
        assert_eq!(order, [ids[2], ids[0]]);
        assert!(!arena.in_free_list(ids[1]));
        assert_eq!(partial.front(), Some(ids[1]));
    }
}
