/// Arquivo: klib/list/intrusive.rs
///
/// Propósito: Lista duplamente encadeada intrusiva.
///
/// Detalhes de Implementação:
/// - Os nós são identificados por um handle opaco `H` (Copy + Eq).
/// - Os links vivem dentro do próprio nó e são lidos/gravados por um
///   `LinkStore`; a lista guarda só cabeça, cauda e tamanho, e nunca aloca.
/// - Um nó pode estar em várias listas, uma por conjunto de links.
/// - O fim da lista é a variante explícita `Link::End`, nunca um bit
///   escondido dentro de um ponteiro.

/// Ligação para o próximo/anterior nó da lista
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link<H> {
    /// Ligado ao nó com este handle
    Node(H),
    /// Terminador da lista
    End,
}

impl<H: Copy> Link<H> {
    #[inline]
    pub fn node(self) -> Option<H> {
        match self {
            Link::Node(id) => Some(id),
            Link::End => None,
        }
    }
}

/// Links embutidos no nó
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListLinks<H> {
    prev: Link<H>,
    next: Link<H>,
    linked: bool,
}

impl<H> ListLinks<H> {
    pub const fn new() -> Self {
        Self {
            prev: Link::End,
            next: Link::End,
            linked: false,
        }
    }

    /// Monta os links a partir de uma representação guardada pelo nó
    pub const fn from_parts(prev: Link<H>, next: Link<H>, linked: bool) -> Self {
        Self { prev, next, linked }
    }
}

impl<H: Copy> ListLinks<H> {
    /// O nó está numa lista deste conjunto de links?
    #[inline]
    pub fn is_linked(&self) -> bool {
        self.linked
    }

    #[inline]
    pub fn next(&self) -> Link<H> {
        self.next
    }

    #[inline]
    pub fn prev(&self) -> Link<H> {
        self.prev
    }
}

impl<H> Default for ListLinks<H> {
    fn default() -> Self {
        Self::new()
    }
}

/// Onde ficam os links de cada nó
pub trait LinkStore<H> {
    fn links(&self, node: H) -> ListLinks<H>;
    fn set_links(&mut self, node: H, links: ListLinks<H>);
}

/// Lista intrusiva
pub struct IntrusiveList<H> {
    head: Link<H>,
    tail: Link<H>,
    len: usize,
}

impl<H: Copy + Eq> IntrusiveList<H> {
    pub const fn new() -> Self {
        Self {
            head: Link::End,
            tail: Link::End,
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Primeiro nó, sem remover
    #[inline]
    pub fn front(&self) -> Option<H> {
        self.head.node()
    }

    /// Último nó
    #[inline]
    pub fn back(&self) -> Option<H> {
        self.tail.node()
    }

    /// Insere `node` no início. O(1).
    ///
    /// O nó não pode estar em outra lista do mesmo conjunto de links.
    pub fn push_front<S>(&mut self, store: &mut S, node: H)
    where
        S: LinkStore<H> + ?Sized,
    {
        debug_assert!(!store.links(node).linked);

        let old_head = self.head;
        store.set_links(
            node,
            ListLinks {
                prev: Link::End,
                next: old_head,
                linked: true,
            },
        );

        match old_head {
            Link::Node(head) => {
                let mut links = store.links(head);
                links.prev = Link::Node(node);
                store.set_links(head, links);
            }
            Link::End => self.tail = Link::Node(node),
        }

        self.head = Link::Node(node);
        self.len += 1;
    }

    /// Remove `node` da lista. O(1).
    pub fn remove<S>(&mut self, store: &mut S, node: H)
    where
        S: LinkStore<H> + ?Sized,
    {
        let links = store.links(node);
        debug_assert!(links.linked);

        match links.prev {
            Link::Node(p) => {
                let mut prev = store.links(p);
                prev.next = links.next;
                store.set_links(p, prev);
            }
            Link::End => self.head = links.next,
        }

        match links.next {
            Link::Node(n) => {
                let mut next = store.links(n);
                next.prev = links.prev;
                store.set_links(n, next);
            }
            Link::End => self.tail = links.prev,
        }

        store.set_links(node, ListLinks::new());
        self.len -= 1;
    }

    /// Remove e retorna o primeiro nó
    pub fn pop_front<S>(&mut self, store: &mut S) -> Option<H>
    where
        S: LinkStore<H> + ?Sized,
    {
        let node = self.front()?;
        self.remove(store, node);
        Some(node)
    }

    /// Percorre os nós, do início ao fim
    pub fn iter<'a, S>(&self, store: &'a S) -> Iter<'a, H, S>
    where
        S: LinkStore<H> + ?Sized,
    {
        Iter {
            store,
            cursor: self.head,
        }
    }
}

impl<H: Copy + Eq> Default for IntrusiveList<H> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Iter<'a, H, S: ?Sized> {
    store: &'a S,
    cursor: Link<H>,
}

impl<'a, H: Copy, S: LinkStore<H> + ?Sized> Iterator for Iter<'a, H, S> {
    type Item = H;

    fn next(&mut self) -> Option<H> {
        let node = self.cursor.node()?;
        self.cursor = self.store.links(node).next;
        Some(node)
    }
}
