/// Arquivo: klib/tree/index.rs
///
/// Propósito: Índice ordenado de intervalos de endereço.
/// Responde "qual intervalo contém este endereço?" em O(log n).
///
/// Detalhes de Implementação:
/// - Árvore AVL intrusiva: os links (esquerda, direita, altura) vivem no
///   próprio nó e são acessados por um `TreeStore`. O índice não aloca.
/// - Chave: endereço base do intervalo `[base, end)` do nó.
/// - Intervalos são disjuntos; inserções sobrepostas são recusadas.
/// - O comparador trata um endereço dentro de `[base, end)` como EQUAL.
/// - Sem ponteiro para o pai; sucessor é achado descendo da raiz.
use core::cmp::Ordering;

/// Compara `addr` com o intervalo `[base, end)`.
///
/// `Less` se está antes, `Greater` se está depois, `Equal` se contido.
#[inline]
pub fn compare_address(addr: usize, base: usize, end: usize) -> Ordering {
    if addr < base {
        Ordering::Less
    } else if addr >= end {
        Ordering::Greater
    } else {
        Ordering::Equal
    }
}

/// Links de árvore embutidos no nó
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeLinks<H> {
    left: Option<H>,
    right: Option<H>,
    height: u32,
}

impl<H> TreeLinks<H> {
    pub const fn new() -> Self {
        Self {
            left: None,
            right: None,
            height: 0,
        }
    }

    pub const fn from_parts(left: Option<H>, right: Option<H>, height: u32) -> Self {
        Self {
            left,
            right,
            height,
        }
    }
}

impl<H: Copy> TreeLinks<H> {
    #[inline]
    pub fn left(&self) -> Option<H> {
        self.left
    }

    #[inline]
    pub fn right(&self) -> Option<H> {
        self.right
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }
}

impl<H> Default for TreeLinks<H> {
    fn default() -> Self {
        Self::new()
    }
}

/// Onde ficam os links de árvore e o intervalo de cada nó
pub trait TreeStore<H> {
    fn tree_links(&self, node: H) -> TreeLinks<H>;
    fn set_tree_links(&mut self, node: H, links: TreeLinks<H>);
    /// Intervalo `[base, end)` coberto pelo nó
    fn span(&self, node: H) -> (usize, usize);
}

/// Índice de intervalos disjuntos
pub struct AddressIndex<H> {
    root: Option<H>,
    len: usize,
}

impl<H: Copy + Eq> AddressIndex<H> {
    pub const fn new() -> Self {
        Self { root: None, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Raiz atual (qualquer nó indexado, útil para esvaziar o índice)
    pub fn root(&self) -> Option<H> {
        self.root
    }

    /// Insere `node`. Retorna `false` se o intervalo é vazio ou sobrepõe outro.
    pub fn insert<S>(&mut self, store: &mut S, node: H) -> bool
    where
        S: TreeStore<H> + ?Sized,
    {
        let (base, end) = store.span(node);
        if base >= end || self.overlaps(&*store, base, end) {
            return false;
        }
        self.root = Some(insert_at(store, self.root, node, base));
        self.len += 1;
        true
    }

    /// Remove `node`. Retorna `false` se ele não está indexado.
    pub fn remove<S>(&mut self, store: &mut S, node: H) -> bool
    where
        S: TreeStore<H> + ?Sized,
    {
        if !self.contains(&*store, node) {
            return false;
        }
        let (base, _) = store.span(node);
        self.root = remove_at(store, self.root, node, base);
        store.set_tree_links(node, TreeLinks::new());
        self.len -= 1;
        true
    }

    /// `node` está indexado?
    pub fn contains<S>(&self, store: &S, node: H) -> bool
    where
        S: TreeStore<H> + ?Sized,
    {
        let (base, _) = store.span(node);
        self.search(store, base) == Some(node)
    }

    /// Busca o nó cujo intervalo contém `addr`
    pub fn search<S>(&self, store: &S, addr: usize) -> Option<H>
    where
        S: TreeStore<H> + ?Sized,
    {
        let mut cursor = self.root;
        while let Some(node) = cursor {
            let (base, end) = store.span(node);
            let links = store.tree_links(node);
            cursor = match compare_address(addr, base, end) {
                Ordering::Less => links.left,
                Ordering::Greater => links.right,
                Ordering::Equal => return Some(node),
            };
        }
        None
    }

    /// Algum nó indexado toca `[base, end)`?
    pub fn overlaps<S>(&self, store: &S, base: usize, end: usize) -> bool
    where
        S: TreeStore<H> + ?Sized,
    {
        let mut cursor = self.root;
        while let Some(node) = cursor {
            let (node_base, node_end) = store.span(node);
            if node_base < end && base < node_end {
                return true;
            }
            let links = store.tree_links(node);
            cursor = if end <= node_base {
                links.left
            } else {
                links.right
            };
        }
        false
    }

    /// Nó de menor endereço
    pub fn first<S>(&self, store: &S) -> Option<H>
    where
        S: TreeStore<H> + ?Sized,
    {
        let mut node = self.root?;
        while let Some(left) = store.tree_links(node).left {
            node = left;
        }
        Some(node)
    }

    /// Próximo nó em ordem de endereço
    pub fn successor<S>(&self, store: &S, node: H) -> Option<H>
    where
        S: TreeStore<H> + ?Sized,
    {
        let (base, _) = store.span(node);
        let mut cursor = self.root;
        let mut next = None;
        while let Some(current) = cursor {
            let (current_base, _) = store.span(current);
            let links = store.tree_links(current);
            if base < current_base {
                next = Some(current);
                cursor = links.left;
            } else {
                cursor = links.right;
            }
        }
        next
    }

    /// Percorre os nós em ordem crescente de endereço
    pub fn iter<'a, S>(&'a self, store: &'a S) -> Iter<'a, H, S>
    where
        S: TreeStore<H> + ?Sized,
    {
        Iter {
            index: self,
            store,
            next: self.first(store),
        }
    }

    /// Confere ordem, disjunção, alturas e fator de balanceamento
    pub fn is_consistent<S>(&self, store: &S) -> bool
    where
        S: TreeStore<H> + ?Sized,
    {
        let mut count = 0;
        let mut last_end = 0;
        for node in self.iter(store) {
            let (base, end) = store.span(node);
            if base < last_end || base >= end {
                return false;
            }
            last_end = end;
            count += 1;
        }
        count == self.len && checked_height(store, self.root).is_some()
    }
}

impl<H: Copy + Eq> Default for AddressIndex<H> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Iter<'a, H, S: ?Sized> {
    index: &'a AddressIndex<H>,
    store: &'a S,
    next: Option<H>,
}

impl<'a, H: Copy + Eq, S: TreeStore<H> + ?Sized> Iterator for Iter<'a, H, S> {
    type Item = H;

    fn next(&mut self) -> Option<H> {
        let node = self.next?;
        self.next = self.index.successor(self.store, node);
        Some(node)
    }
}

// =============================================================================
// AVL
// =============================================================================

fn height<H: Copy, S: TreeStore<H> + ?Sized>(store: &S, node: Option<H>) -> u32 {
    node.map_or(0, |n| store.tree_links(n).height)
}

fn update<H: Copy, S: TreeStore<H> + ?Sized>(store: &mut S, node: H) {
    let mut links = store.tree_links(node);
    links.height = 1 + height(&*store, links.left).max(height(&*store, links.right));
    store.set_tree_links(node, links);
}

fn balance<H: Copy, S: TreeStore<H> + ?Sized>(store: &S, node: H) -> i64 {
    let links = store.tree_links(node);
    height(store, links.left) as i64 - height(store, links.right) as i64
}

fn rotate_right<H: Copy, S: TreeStore<H> + ?Sized>(store: &mut S, node: H) -> H {
    let mut links = store.tree_links(node);
    let Some(pivot) = links.left else {
        return node;
    };
    let mut pivot_links = store.tree_links(pivot);
    links.left = pivot_links.right;
    store.set_tree_links(node, links);
    update(store, node);
    pivot_links.right = Some(node);
    store.set_tree_links(pivot, pivot_links);
    update(store, pivot);
    pivot
}

fn rotate_left<H: Copy, S: TreeStore<H> + ?Sized>(store: &mut S, node: H) -> H {
    let mut links = store.tree_links(node);
    let Some(pivot) = links.right else {
        return node;
    };
    let mut pivot_links = store.tree_links(pivot);
    links.right = pivot_links.left;
    store.set_tree_links(node, links);
    update(store, node);
    pivot_links.left = Some(node);
    store.set_tree_links(pivot, pivot_links);
    update(store, pivot);
    pivot
}

fn rebalance<H: Copy, S: TreeStore<H> + ?Sized>(store: &mut S, node: H) -> H {
    update(store, node);
    let factor = balance(&*store, node);

    if factor > 1 {
        let mut links = store.tree_links(node);
        if let Some(left) = links.left {
            if balance(&*store, left) < 0 {
                links.left = Some(rotate_left(store, left));
                store.set_tree_links(node, links);
            }
        }
        return rotate_right(store, node);
    }

    if factor < -1 {
        let mut links = store.tree_links(node);
        if let Some(right) = links.right {
            if balance(&*store, right) > 0 {
                links.right = Some(rotate_right(store, right));
                store.set_tree_links(node, links);
            }
        }
        return rotate_left(store, node);
    }

    node
}

fn insert_at<H: Copy, S: TreeStore<H> + ?Sized>(
    store: &mut S,
    at: Option<H>,
    node: H,
    base: usize,
) -> H {
    let Some(current) = at else {
        store.set_tree_links(
            node,
            TreeLinks {
                left: None,
                right: None,
                height: 1,
            },
        );
        return node;
    };

    let (current_base, _) = store.span(current);
    let mut links = store.tree_links(current);
    if base < current_base {
        links.left = Some(insert_at(store, links.left, node, base));
    } else {
        links.right = Some(insert_at(store, links.right, node, base));
    }
    store.set_tree_links(current, links);
    rebalance(store, current)
}

/// Desliga o menor nó da subárvore. Retorna (nova raiz, nó removido).
fn remove_min<H: Copy, S: TreeStore<H> + ?Sized>(store: &mut S, node: H) -> (Option<H>, H) {
    let mut links = store.tree_links(node);
    match links.left {
        None => (links.right, node),
        Some(left) => {
            let (new_left, min) = remove_min(store, left);
            links.left = new_left;
            store.set_tree_links(node, links);
            (Some(rebalance(store, node)), min)
        }
    }
}

fn remove_at<H: Copy + Eq, S: TreeStore<H> + ?Sized>(
    store: &mut S,
    at: Option<H>,
    node: H,
    base: usize,
) -> Option<H> {
    let current = at?;
    let mut links = store.tree_links(current);

    if current == node {
        return match (links.left, links.right) {
            (None, right) => right,
            (left, None) => left,
            (Some(left), Some(right)) => {
                let (new_right, min) = remove_min(store, right);
                store.set_tree_links(
                    min,
                    TreeLinks {
                        left: Some(left),
                        right: new_right,
                        height: 0,
                    },
                );
                Some(rebalance(store, min))
            }
        };
    }

    let (current_base, _) = store.span(current);
    if base < current_base {
        links.left = remove_at(store, links.left, node, base);
    } else {
        links.right = remove_at(store, links.right, node, base);
    }
    store.set_tree_links(current, links);
    Some(rebalance(store, current))
}

/// Altura verificada da subárvore; `None` se alguma altura ou fator está errado
fn checked_height<H: Copy, S: TreeStore<H> + ?Sized>(store: &S, node: Option<H>) -> Option<u32> {
    let Some(node) = node else {
        return Some(0);
    };
    let links = store.tree_links(node);
    let left = checked_height(store, links.left)?;
    let right = checked_height(store, links.right)?;
    let height = 1 + left.max(right);
    if links.height != height || left.abs_diff(right) > 1 {
        return None;
    }
    Some(height)
}
