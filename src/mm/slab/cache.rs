//! # Cache de objetos
//!
//! Um `Cache` possui todos os slabs de um tamanho de buffer.
//!
//! ## Coleções
//! | Coleção       | Estados       | Estrutura                     |
//! |---------------|---------------|-------------------------------|
//! | `free_list`   | FREE          | lista intrusiva               |
//! | `partial_list`| MIXED         | lista intrusiva               |
//! | `in_use`      | MIXED, USED   | índice por faixa de endereço  |
//!
//! Um slab MIXED está na lista parcial e no índice ao mesmo tempo.
//!
//! ## Contabilidade
//! `free_buffer_count` só recebe a capacidade de um slab na transição
//! FREE -> MIXED. Slabs FREE recém-criados não contam. Mantido assim.
//!
//! ## Locking
//! Um `spin::Mutex` por cache. O crescimento solta o lock durante a chamada
//! ao Page Source e revalida o estado depois.

use core::ptr::NonNull;

use bitflags::bitflags;
use spin::{Mutex, MutexGuard};

use crate::klib::list::IntrusiveList;
use crate::klib::tree::AddressIndex;
use crate::mm::config::{
    DEFAULT_FREE_SLABS_THRESHOLD, DEFAULT_MAX_SLABS, DEFAULT_MIN_BUFFERS, LOCK_SPIN_LIMIT,
};
use crate::mm::error::{MmError, MmResult};
use crate::mm::page_source::{PageGeometry, PageSource};

use super::fatal;
use super::geometry::SlabGeometry;
use super::slab::{FreeLinks, PartialLinks, SlabArena, SlabId, SlabState};
use super::stats::{CacheCounters, CacheStats, StatCounters};

bitflags! {
    /// Flags de alocação de buffer
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AllocFlags: u32 {
        /// Nunca crescer nem bloquear: cache vazio => `OutOfMemory`
        const NO_SLEEP = 1 << 0;
    }
}

/// Construtor/destrutor por objeto.
///
/// Registrado na criação do cache e exposto por `Cache::hooks`, mas não é
/// chamado em alocação, free ou destruição.
pub trait ObjectHooks: Sync {
    fn construct(&self, buffer: NonNull<u8>);
    fn destruct(&self, buffer: NonNull<u8>);
}

/// Política do cache. `min_buffers` e `max_slabs` são apenas registrados.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub free_slabs_threshold: usize,
    pub min_buffers: usize,
    pub max_slabs: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            free_slabs_threshold: DEFAULT_FREE_SLABS_THRESHOLD,
            min_buffers: DEFAULT_MIN_BUFFERS,
            max_slabs: DEFAULT_MAX_SLABS,
        }
    }
}

/// Parâmetros de criação de um cache
#[derive(Clone, Copy)]
pub struct CacheConfig<'h> {
    pub name: &'static str,
    pub buffer_size: usize,
    pub policy: CachePolicy,
    pub hooks: Option<&'h dyn ObjectHooks>,
}

impl<'h> CacheConfig<'h> {
    pub fn new(name: &'static str, buffer_size: usize) -> Self {
        Self {
            name,
            buffer_size,
            policy: CachePolicy::default(),
            hooks: None,
        }
    }

    pub fn with_policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_hooks(mut self, hooks: &'h dyn ObjectHooks) -> Self {
        self.hooks = Some(hooks);
        self
    }
}

/// Situação de um slab, para diagnóstico
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlabReport {
    pub id: SlabId,
    pub base: usize,
    pub state: SlabState,
    pub used: usize,
    pub in_free_list: bool,
    pub in_partial_list: bool,
    pub in_index: bool,
}

/// Estado mutável do cache (sempre sob o lock)
struct CacheState {
    /// Registros na cauda de cada slab
    arena: SlabArena,
    free_list: IntrusiveList<SlabId>,
    partial_list: IntrusiveList<SlabId>,
    /// Faixa inteira do slab -> slab
    in_use: AddressIndex<SlabId>,
    free_buffer_count: usize,
    free_slabs_count: usize,
    total_slabs: usize,
    stats: StatCounters,
}

impl CacheState {
    fn new(geometry: SlabGeometry) -> Self {
        Self {
            arena: SlabArena::new(geometry),
            free_list: IntrusiveList::new(),
            partial_list: IntrusiveList::new(),
            in_use: AddressIndex::new(),
            free_buffer_count: 0,
            free_slabs_count: 0,
            total_slabs: 0,
            stats: StatCounters::default(),
        }
    }

    fn counters(&self) -> CacheCounters {
        CacheCounters {
            total_slabs: self.total_slabs,
            free_slabs: self.free_slabs_count,
            partial_slabs: self.partial_list.len(),
            in_use_slabs: self.in_use.len(),
            free_buffer_count: self.free_buffer_count,
        }
    }

    /// Formata um slab sobre `base` e leva-o de NEW para FREE.
    ///
    /// # Safety
    /// Mesma exigência de `SlabArena::format`.
    unsafe fn install(&mut self, base: usize, geometry: &SlabGeometry, name: &str) -> SlabId {
        let Some(id) = self.arena.format(base) else {
            fatal(name, "slab na base nula");
        };
        self.transition(id, SlabState::Free, geometry, name);
        id
    }

    /// Aplica uma transição da máquina de estados com seus efeitos nas coleções.
    fn transition(&mut self, id: SlabId, to: SlabState, geometry: &SlabGeometry, name: &str) {
        let from = self.arena.state(id);
        if !from.can_transition(to) {
            crate::kerror!("(Slab) transição ilegal a partir de:");
            crate::kerror!(from.as_str());
            fatal(name, "transição de estado ilegal");
        }

        let arena = self.arena;
        match (from, to) {
            (SlabState::New, SlabState::Free) => {
                self.free_list.push_front(&mut FreeLinks(arena), id);
                self.total_slabs += 1;
                self.free_slabs_count += 1;
            }
            (SlabState::Free, SlabState::Mixed) => {
                self.free_list.remove(&mut FreeLinks(arena), id);
                self.partial_list.push_front(&mut PartialLinks(arena), id);
                if !self.in_use.insert(&mut self.arena, id) {
                    fatal(name, "slab já presente no índice");
                }
                self.free_buffer_count += geometry.buffer_count;
                self.free_slabs_count -= 1;
            }
            (SlabState::Mixed, SlabState::Free) => {
                self.partial_list.remove(&mut PartialLinks(arena), id);
                if !self.in_use.remove(&mut self.arena, id) {
                    fatal(name, "slab ausente do índice");
                }
                self.free_list.push_front(&mut FreeLinks(arena), id);
                self.free_buffer_count -= geometry.buffer_count;
                self.free_slabs_count += 1;
            }
            (SlabState::Mixed, SlabState::Used) => {
                self.partial_list.remove(&mut PartialLinks(arena), id);
            }
            (SlabState::Used, SlabState::Mixed) => {
                self.partial_list.push_front(&mut PartialLinks(arena), id);
            }
            _ => fatal(name, "transição de estado ilegal"),
        }

        self.arena.set_state(id, to);
    }

    /// Slab cuja faixa contém `addr`, em qualquer estado
    fn find_slab(&self, addr: usize) -> Option<SlabId> {
        if let Some(id) = self.in_use.search(&self.arena, addr) {
            return Some(id);
        }
        self.free_list
            .iter(&FreeLinks(self.arena))
            .find(|&id| self.arena.contains(id, addr))
    }

    /// Algum slab do cache toca `[base, end)`?
    fn overlaps(&self, base: usize, end: usize, slab_size: usize) -> bool {
        self.in_use.overlaps(&self.arena, base, end)
            || self
                .free_list
                .iter(&FreeLinks(self.arena))
                .any(|id| base < id.base() + slab_size && id.base() < end)
    }
}

/// Cache de buffers de tamanho fixo
pub struct Cache<'p> {
    name: &'static str,
    geometry: SlabGeometry,
    page: PageGeometry,
    policy: CachePolicy,
    hooks: Option<&'p dyn ObjectHooks>,
    pages: &'p dyn PageSource,
    state: Mutex<CacheState>,
}

impl<'p> Cache<'p> {
    /// Cria o cache (InitCache). Nenhum slab é alocado aqui.
    pub fn new(pages: &'p dyn PageSource, config: CacheConfig<'p>) -> MmResult<Self> {
        let page = PageGeometry::of(pages)?;
        let geometry = match SlabGeometry::compute(config.buffer_size, &page) {
            Ok(g) => g,
            Err(e) => {
                crate::kwarn!("(Slab) buffer_size inválido=", config.buffer_size);
                return Err(e);
            }
        };
        Ok(Self::with_geometry(pages, page, geometry, config))
    }

    /// Cria o cache com a geometria já calculada
    pub(crate) fn with_geometry(
        pages: &'p dyn PageSource,
        page: PageGeometry,
        geometry: SlabGeometry,
        config: CacheConfig<'p>,
    ) -> Self {
        crate::kinfo!("(Slab) Cache criado:");
        crate::kinfo!(config.name);
        crate::kdebug!("(Slab)   buffer_size=", geometry.buffer_size);
        crate::kdebug!("(Slab)   slab_size=", geometry.slab_size);
        crate::kdebug!("(Slab)   buffers/slab=", geometry.buffer_count);

        Self {
            name: config.name,
            geometry,
            page,
            policy: config.policy,
            hooks: config.hooks,
            pages,
            state: Mutex::new(CacheState::new(geometry)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn geometry(&self) -> &SlabGeometry {
        &self.geometry
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    pub fn hooks(&self) -> Option<&'p dyn ObjectHooks> {
        self.hooks
    }

    /// Adquire o lock com limite de spin. Estourar o limite é fatal.
    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        for _ in 0..LOCK_SPIN_LIMIT {
            if let Some(guard) = self.state.try_lock() {
                return guard;
            }
            core::hint::spin_loop();
        }
        fatal(self.name, "lock do cache travado")
    }

    /// Aloca um buffer (AllocateBuffer).
    pub fn allocate(&self, flags: AllocFlags) -> MmResult<NonNull<u8>> {
        let geometry = self.geometry;
        let mut guard = self.lock_state();

        while guard.free_buffer_count == 0 && guard.free_list.is_empty() {
            if flags.contains(AllocFlags::NO_SLEEP) {
                guard.stats.on_failure();
                crate::ktrace!("(Slab) NO_SLEEP em cache vazio");
                return Err(MmError::OutOfMemory);
            }

            // Page Source pode bloquear: chamado sem o lock
            drop(guard);
            let grown = self.pages.alloc_pages(geometry.slab_size);
            guard = self.lock_state();

            match grown {
                Ok(base) => {
                    // SAFETY: faixa nova e exclusiva vinda do Page Source
                    unsafe { guard.install(base.as_ptr() as usize, &geometry, self.name) };
                    guard.stats.on_grow();
                    crate::kdebug!("(Slab) grow: slab=", base.as_ptr() as usize);
                }
                Err(e) => {
                    // Outro caminho pode ter instalado um slab sem o lock
                    if !guard.free_list.is_empty() {
                        crate::kdebug!("(Slab) grow falhou, mas há slab livre");
                        continue;
                    }
                    guard.stats.on_failure();
                    crate::kwarn!("(Slab) grow falhou, buffer_size=", geometry.buffer_size);
                    return Err(e);
                }
            }
        }

        let state = &mut *guard;
        let id = match state.partial_list.front() {
            Some(id) => id,
            None => {
                let Some(id) = state.free_list.front() else {
                    fatal(self.name, "nenhum slab com buffer livre");
                };
                state.transition(id, SlabState::Mixed, &geometry, self.name);
                id
            }
        };

        let Some(slot) = state.arena.bitmap(id).find_first_zero() else {
            fatal(self.name, "slab parcial sem buffer livre");
        };
        state.arena.bitmap(id).set(slot);
        let used = state.arena.used(id) + 1;
        state.arena.set_used(id, used);
        state.free_buffer_count -= 1;

        if used == geometry.buffer_count {
            state.transition(id, SlabState::Used, &geometry, self.name);
        }

        let in_use = state.in_use.len();
        state.stats.on_alloc(in_use);

        let addr = id.base() + slot * geometry.buffer_size;
        crate::ktrace!("(Slab) alloc=", addr);
        match NonNull::new(addr as *mut u8) {
            Some(ptr) => Ok(ptr),
            None => fatal(self.name, "endereço nulo em slab"),
        }
    }

    /// Devolve um buffer (FreeBuffer).
    ///
    /// Ponteiro desconhecido, fora de um início de buffer ou já livre
    /// retorna erro sem alterar nenhum estado.
    pub fn free(&self, ptr: NonNull<u8>) -> MmResult<()> {
        let geometry = self.geometry;
        let addr = ptr.as_ptr() as usize;
        let mut guard = self.lock_state();
        let state = &mut *guard;

        let Some(id) = state.in_use.search(&state.arena, addr) else {
            crate::kwarn!("(Slab) free: ponteiro desconhecido=", addr);
            return Err(MmError::InvalidAddress);
        };

        if !state.arena.trailer_matches(id) {
            crate::kerror!("(Slab) trailer corrompido, slab=", id.base());
            fatal(self.name, "trailer do slab corrompido");
        }

        let offset = addr - id.base();
        if offset >= geometry.buffers_end() || offset % geometry.buffer_size != 0 {
            crate::kwarn!("(Slab) free: fora do início de buffer=", addr);
            return Err(MmError::InvalidAddress);
        }

        let slot = offset / geometry.buffer_size;
        {
            let mut bitmap = state.arena.bitmap(id);
            if !bitmap.test(slot) {
                crate::kwarn!("(Slab) double free=", addr);
                return Err(MmError::DoubleFree);
            }
            bitmap.clear(slot);
        }

        let was_used = state.arena.state(id) == SlabState::Used;
        let used = state.arena.used(id) - 1;
        state.arena.set_used(id, used);
        state.free_buffer_count += 1;

        if was_used {
            state.transition(id, SlabState::Mixed, &geometry, self.name);
        }
        if used == 0 {
            state.transition(id, SlabState::Free, &geometry, self.name);
        }

        state.stats.on_free();
        crate::ktrace!("(Slab) free=", addr);
        Ok(())
    }

    /// Adiciona memória obtida por fora como slab FREE (AddSlabToCache).
    ///
    /// # Safety
    /// `base..base + slab_size` precisa ser memória válida e exclusiva do
    /// cache até ele ser destruído. A faixa será devolvida ao Page Source
    /// em `destroy`.
    pub unsafe fn add_slab(&self, base: NonNull<u8>) -> MmResult<()> {
        let geometry = self.geometry;
        let addr = base.as_ptr() as usize;
        if !self.page.is_aligned(addr) {
            crate::kwarn!("(Slab) add_slab: base desalinhada=", addr);
            return Err(MmError::NotAligned);
        }
        let end = addr
            .checked_add(geometry.slab_size)
            .ok_or(MmError::InvalidAddress)?;

        let mut state = self.lock_state();
        if state.overlaps(addr, end, geometry.slab_size) {
            crate::kwarn!("(Slab) add_slab: faixa já pertence a um slab=", addr);
            return Err(MmError::AlreadyMapped);
        }

        state.install(addr, &geometry, self.name);
        crate::kdebug!("(Slab) add_slab=", addr);
        Ok(())
    }

    /// Leva todos os slabs a FREE e devolve-os ao Page Source (DestroyCache).
    ///
    /// O cache fica vazio e pode voltar a crescer depois.
    pub fn destroy(&self) {
        let geometry = self.geometry;
        let (mut released, arena) = {
            let mut guard = self.lock_state();
            let state = &mut *guard;

            // Todo slab indexado é MIXED ou USED
            while let Some(id) = state.in_use.root() {
                if state.arena.state(id) == SlabState::Used {
                    state.transition(id, SlabState::Mixed, &geometry, self.name);
                }
                state.free_buffer_count += state.arena.used(id);
                state.arena.set_used(id, 0);
                state.arena.bitmap(id).clear_all();
                state.transition(id, SlabState::Free, &geometry, self.name);
            }

            let released = core::mem::take(&mut state.free_list);
            let stats = core::mem::take(&mut state.stats);
            *state = CacheState::new(geometry);
            state.stats = stats;
            (released, state.arena)
        };

        if !released.is_empty() {
            crate::kinfo!("(Slab) Destruindo cache:");
            crate::kinfo!(self.name);
            crate::kdebug!("(Slab)   slabs=", released.len());
        }

        // Desliga antes de devolver: o registro some junto com a faixa
        while let Some(id) = released.pop_front(&mut FreeLinks(arena)) {
            let Some(ptr) = NonNull::new(id.base() as *mut u8) else {
                continue;
            };
            // SAFETY: o cache não referencia mais a faixa
            if let Err(e) = unsafe { self.pages.free_pages(ptr, geometry.slab_size) } {
                crate::kerror!("(Slab) destroy: Page Source recusou slab=", id.base());
                crate::kerror!(e.as_str());
            }
        }
    }

    /// Contagens estruturais do cache
    pub fn counters(&self) -> CacheCounters {
        self.lock_state().counters()
    }

    /// Estatísticas (GetCacheStatistics). `None` sem a feature `alloc_stats`.
    #[cfg(feature = "alloc_stats")]
    pub fn statistics(&self) -> Option<CacheStats> {
        let state = self.lock_state();
        Some(state.stats.snapshot(&self.geometry, state.counters()))
    }

    /// Estatísticas (GetCacheStatistics). `None` sem a feature `alloc_stats`.
    #[cfg(not(feature = "alloc_stats"))]
    pub fn statistics(&self) -> Option<CacheStats> {
        None
    }

    /// Estado e pertinência às coleções do slab que contém `addr`
    pub fn slab_report(&self, addr: usize) -> Option<SlabReport> {
        let state = self.lock_state();
        let id = state.find_slab(addr)?;
        let arena = &state.arena;
        Some(SlabReport {
            id,
            base: id.base(),
            state: arena.state(id),
            used: arena.used(id),
            in_free_list: arena.in_free_list(id),
            in_partial_list: arena.in_partial_list(id),
            in_index: state.in_use.contains(arena, id),
        })
    }

    /// Percorre todos os slabs e confere as invariantes do cache.
    pub fn verify(&self) -> MmResult<()> {
        let geometry = self.geometry;
        let mut guard = self.lock_state();
        let state = &mut *guard;
        let mut arena = state.arena;

        if !state.in_use.is_consistent(&arena) {
            crate::kerror!("(Slab) verify: índice inconsistente");
            crate::kerror!(self.name);
            return Err(MmError::CorruptedMetadata);
        }

        let mut check = |id: SlabId| {
            let used = arena.used(id);
            let st = arena.state(id);
            let ok = used <= geometry.buffer_count
                && st == SlabState::of(used, geometry.buffer_count)
                && arena.trailer_matches(id)
                && arena.bitmap(id).count_ones() == used
                && arena.in_free_list(id) == (st == SlabState::Free)
                && arena.in_partial_list(id) == (st == SlabState::Mixed);
            if !ok {
                crate::kerror!("(Slab) verify: slab inconsistente=", id.base());
            }
            ok.then_some((st, used))
        };

        let mut free_slabs = 0usize;
        for id in state.free_list.iter(&FreeLinks(state.arena)) {
            match check(id) {
                Some((SlabState::Free, _)) => free_slabs += 1,
                _ => return Err(MmError::CorruptedMetadata),
            }
        }

        let mut expected_free_buffers = 0usize;
        let mut used_slabs = 0usize;
        let mut mixed_slabs = 0usize;
        for id in state.in_use.iter(&state.arena) {
            match check(id) {
                Some((SlabState::Mixed, used)) => {
                    mixed_slabs += 1;
                    expected_free_buffers += geometry.buffer_count - used;
                }
                Some((SlabState::Used, _)) => used_slabs += 1,
                _ => return Err(MmError::CorruptedMetadata),
            }
        }

        let ok = free_slabs == state.free_slabs_count
            && state.free_list.len() == state.free_slabs_count
            && mixed_slabs == state.partial_list.len()
            && state.free_slabs_count + mixed_slabs + used_slabs == state.total_slabs
            && state.in_use.len() == mixed_slabs + used_slabs
            && state.free_buffer_count == expected_free_buffers;

        if !ok {
            crate::kerror!("(Slab) verify: contadores inconsistentes");
            crate::kerror!(self.name);
            return Err(MmError::CorruptedMetadata);
        }
        Ok(())
    }
}

impl Drop for Cache<'_> {
    fn drop(&mut self) {
        self.destroy();
    }
}
