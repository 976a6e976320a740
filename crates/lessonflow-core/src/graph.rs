//! The page chain of a lesson as an arena with an id index.
//!
//! The chain is validated once in [`PageGraph::build`]; afterwards pages are
//! stored in chain order so neighbour lookups are index arithmetic.

use std::collections::{HashMap, HashSet};

use crate::error::{GraphIntegrityError, LinkKind};
use crate::model::{Page, PageId, PageKind};

#[derive(Debug, Clone)]
pub struct PageGraph {
    pages: Vec<Page>,
    index: HashMap<PageId, usize>,
}

impl PageGraph {
    /// Validate the prev/next links of `pages` and build the graph.
    ///
    /// The input order is irrelevant; the chain is followed from the single
    /// page without a predecessor.
    pub fn build(pages: Vec<Page>) -> Result<Self, GraphIntegrityError> {
        if pages.is_empty() {
            return Err(GraphIntegrityError::Empty);
        }

        let mut by_id: HashMap<PageId, Page> = HashMap::with_capacity(pages.len());
        for page in pages {
            if by_id.contains_key(&page.id) {
                return Err(GraphIntegrityError::DuplicatePage(page.id));
            }
            by_id.insert(page.id, page);
        }

        let mut heads: Vec<PageId> = by_id
            .values()
            .filter(|p| p.prev.is_none())
            .map(|p| p.id)
            .collect();
        heads.sort();
        let head = match heads.as_slice() {
            [] => return Err(GraphIntegrityError::NoHead),
            [head] => *head,
            _ => return Err(GraphIntegrityError::MultipleHeads(heads)),
        };

        let mut ids: Vec<PageId> = by_id.keys().copied().collect();
        ids.sort();
        for id in &ids {
            let page = &by_id[id];
            for (link, target) in [(LinkKind::Prev, page.prev), (LinkKind::Next, page.next)] {
                if let Some(target) = target {
                    if !by_id.contains_key(&target) {
                        return Err(GraphIntegrityError::DanglingLink {
                            page: page.id,
                            link,
                            target,
                        });
                    }
                }
            }
            if let Some(next) = page.next {
                let back = by_id[&next].prev;
                if back != Some(page.id) {
                    return Err(GraphIntegrityError::AsymmetricLink {
                        page: page.id,
                        next,
                        back,
                    });
                }
            }
        }

        let mut order = Vec::with_capacity(by_id.len());
        let mut visited = HashSet::with_capacity(by_id.len());
        let mut cursor = Some(head);
        while let Some(id) = cursor {
            if !visited.insert(id) {
                return Err(GraphIntegrityError::Cycle(id));
            }
            order.push(id);
            cursor = by_id[&id].next;
        }
        if order.len() != by_id.len() {
            let unreachable = ids.into_iter().filter(|id| !visited.contains(id)).collect();
            return Err(GraphIntegrityError::Unreachable(unreachable));
        }

        let mut arena = Vec::with_capacity(order.len());
        let mut index = HashMap::with_capacity(order.len());
        for id in order {
            if let Some(page) = by_id.remove(&id) {
                if page.kind == PageKind::BranchTable && page.answers.is_empty() {
                    return Err(GraphIntegrityError::EmptyBranchTable(page.id));
                }
                index.insert(id, arena.len());
                arena.push(page);
            }
        }

        Ok(Self {
            pages: arena,
            index,
        })
    }

    /// Build a graph from pages in chain order, overwriting their links.
    pub fn from_sequence(mut pages: Vec<Page>) -> Result<Self, GraphIntegrityError> {
        let ids: Vec<PageId> = pages.iter().map(|p| p.id).collect();
        for (i, page) in pages.iter_mut().enumerate() {
            page.prev = i.checked_sub(1).map(|j| ids[j]);
            page.next = ids.get(i + 1).copied();
        }
        Self::build(pages)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// The first page of the lesson.
    pub fn head(&self) -> &Page {
        &self.pages[0]
    }

    pub fn get(&self, id: PageId) -> Option<&Page> {
        self.index.get(&id).map(|&i| &self.pages[i])
    }

    /// Like [`get`](Self::get) but reports a missing page as an integrity
    /// error.
    pub fn page(&self, id: PageId) -> Result<&Page, GraphIntegrityError> {
        self.get(id).ok_or(GraphIntegrityError::UnknownPage(id))
    }

    pub fn contains(&self, id: PageId) -> bool {
        self.index.contains_key(&id)
    }

    /// Zero-based position of a page in the chain.
    pub fn position(&self, id: PageId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    /// Pages in chain order.
    pub fn iter(&self) -> impl Iterator<Item = &Page> {
        self.pages.iter()
    }

    pub fn next_of(&self, id: PageId) -> Option<&Page> {
        self.position(id).and_then(|i| self.pages.get(i + 1))
    }

    pub fn prev_of(&self, id: PageId) -> Option<&Page> {
        self.position(id)
            .and_then(|i| i.checked_sub(1))
            .map(|i| &self.pages[i])
    }

    /// Walk backwards from `from` (inclusive) to the nearest page whose kind
    /// is in `starts`. The walk gives up when it crosses a page whose kind is
    /// in `stops`; `from` itself is never treated as a stop.
    pub fn enclosing(&self, from: PageId, starts: &[PageKind], stops: &[PageKind]) -> Option<&Page> {
        let origin = self.position(from)?;
        for i in (0..=origin).rev() {
            let page = &self.pages[i];
            if starts.contains(&page.kind) {
                return Some(page);
            }
            if i != origin && stops.contains(&page.kind) {
                return None;
            }
        }
        None
    }

    /// Pages after `start` up to, but not including, the first page whose
    /// kind is in `ends`.
    pub fn sub_pages_of(&self, start: PageId, ends: &[PageKind]) -> Vec<&Page> {
        let Some(origin) = self.position(start) else {
            return Vec::new();
        };
        self.pages[origin + 1..]
            .iter()
            .take_while(|p| !ends.contains(&p.kind))
            .collect()
    }

    /// The first page after `start` whose kind is in `kinds`.
    pub fn first_after(&self, start: PageId, kinds: &[PageKind]) -> Option<&Page> {
        let origin = self.position(start)?;
        self.pages[origin + 1..].iter().find(|p| kinds.contains(&p.kind))
    }

    /// Returns `true` when `to` comes later in the chain than `from`.
    pub fn is_forward(&self, from: PageId, to: PageId) -> bool {
        match (self.position(from), self.position(to)) {
            (Some(a), Some(b)) => b > a,
            _ => false,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{Answer, AnswerId, Jump, PageOptions};

    pub(crate) fn page(id: u64, kind: PageKind) -> Page {
        Page {
            id: PageId(id),
            kind,
            title: format!("Page {id}"),
            contents: String::new(),
            prev: None,
            next: None,
            options: PageOptions::default(),
            answers: vec![],
        }
    }

    pub(crate) fn answer(id: u64, score: f64, jump: Jump) -> Answer {
        Answer {
            id: AnswerId(id),
            text: format!("Answer {id}"),
            response: format!("Response {id}"),
            score,
            jump,
        }
    }

    fn linked(ids: &[u64]) -> Vec<Page> {
        let mut pages: Vec<Page> = ids.iter().map(|&id| page(id, PageKind::TrueFalse)).collect();
        for i in 0..pages.len() {
            pages[i].prev = i.checked_sub(1).map(|j| PageId(ids[j]));
            pages[i].next = ids.get(i + 1).map(|&id| PageId(id));
        }
        pages
    }

    #[test]
    fn builds_chain_in_order_regardless_of_input_order() {
        let mut pages = linked(&[5, 2, 9]);
        pages.reverse();
        let graph = PageGraph::build(pages).unwrap();
        let order: Vec<u64> = graph.iter().map(|p| p.id.0).collect();
        assert_eq!(order, vec![5, 2, 9]);
        assert_eq!(graph.head().id, PageId(5));
        assert_eq!(graph.next_of(PageId(2)).unwrap().id, PageId(9));
        assert_eq!(graph.prev_of(PageId(2)).unwrap().id, PageId(5));
        assert!(graph.prev_of(PageId(5)).is_none());
        assert!(graph.is_forward(PageId(5), PageId(9)));
        assert!(!graph.is_forward(PageId(9), PageId(2)));
    }

    #[test]
    fn rejects_empty_and_duplicates() {
        assert_eq!(PageGraph::build(vec![]).unwrap_err(), GraphIntegrityError::Empty);
        let mut pages = linked(&[1, 2]);
        pages.push(page(2, PageKind::Essay));
        assert_eq!(
            PageGraph::build(pages).unwrap_err(),
            GraphIntegrityError::DuplicatePage(PageId(2))
        );
    }

    #[test]
    fn rejects_multiple_heads() {
        let mut pages = linked(&[1, 2, 3]);
        pages[2].prev = None;
        pages[1].next = None;
        assert_eq!(
            PageGraph::build(pages).unwrap_err(),
            GraphIntegrityError::MultipleHeads(vec![PageId(1), PageId(3)])
        );
    }

    #[test]
    fn rejects_dangling_links() {
        let mut pages = linked(&[1, 2]);
        pages[1].next = Some(PageId(77));
        assert_eq!(
            PageGraph::build(pages).unwrap_err(),
            GraphIntegrityError::DanglingLink {
                page: PageId(2),
                link: LinkKind::Next,
                target: PageId(77),
            }
        );
    }

    #[test]
    fn rejects_asymmetric_links() {
        let mut pages = linked(&[1, 2, 3]);
        pages[2].prev = Some(PageId(1));
        let err = PageGraph::build(pages).unwrap_err();
        assert!(matches!(err, GraphIntegrityError::AsymmetricLink { page, .. } if page == PageId(2)));
    }

    #[test]
    fn rejects_detached_loop() {
        let mut pages = linked(&[1]);
        let mut a = page(2, PageKind::Essay);
        let mut b = page(3, PageKind::Essay);
        a.prev = Some(PageId(3));
        a.next = Some(PageId(3));
        b.prev = Some(PageId(2));
        b.next = Some(PageId(2));
        pages.push(a);
        pages.push(b);
        assert_eq!(
            PageGraph::build(pages).unwrap_err(),
            GraphIntegrityError::Unreachable(vec![PageId(2), PageId(3)])
        );
    }

    #[test]
    fn rejects_branch_table_without_answers() {
        let mut pages = linked(&[1, 2]);
        pages[1].kind = PageKind::BranchTable;
        assert_eq!(
            PageGraph::build(pages).unwrap_err(),
            GraphIntegrityError::EmptyBranchTable(PageId(2))
        );
    }

    #[test]
    fn scope_queries() {
        let mut bt = page(2, PageKind::BranchTable);
        bt.answers.push(answer(20, 0.0, Jump::NextPage));
        let graph = PageGraph::from_sequence(vec![
            page(1, PageKind::TrueFalse),
            bt,
            page(3, PageKind::TrueFalse),
            page(4, PageKind::TrueFalse),
            page(5, PageKind::EndOfBranch),
            page(6, PageKind::Essay),
        ])
        .unwrap();

        let members: Vec<u64> = graph
            .sub_pages_of(PageId(2), &[PageKind::BranchTable, PageKind::EndOfBranch])
            .iter()
            .map(|p| p.id.0)
            .collect();
        assert_eq!(members, vec![3, 4]);

        let starts = [PageKind::BranchTable];
        assert_eq!(graph.enclosing(PageId(4), &starts, &[]).unwrap().id, PageId(2));
        assert_eq!(graph.enclosing(PageId(2), &starts, &[]).unwrap().id, PageId(2));
        assert!(graph
            .enclosing(PageId(6), &starts, &[PageKind::EndOfBranch])
            .is_none());
        assert!(graph.enclosing(PageId(1), &starts, &[]).is_none());
        assert_eq!(
            graph.first_after(PageId(2), &[PageKind::EndOfBranch]).unwrap().id,
            PageId(5)
        );
    }
}
