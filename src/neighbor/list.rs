use parking_lot::Mutex;

use crate::core::error::{Result, RxError};

/// One list entry: partner index (owned or ghost) and its topology code.
/// Code 0 is a full interaction; 1..=3 select a special scale factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Neighbor {
    pub index: usize,
    pub special: u8,
}

impl Neighbor {
    pub fn plain(index: usize) -> Self {
        Self { index, special: 0 }
    }
}

/// Location of one particle's entries inside the page storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Span {
    page: usize,
    start: usize,
    len: usize,
}

/// Hands out page ids. Workers hold the lock only while claiming.
#[derive(Debug, Default)]
pub(crate) struct PagePool {
    next: usize,
}

impl PagePool {
    fn claim(pool: &Mutex<PagePool>) -> usize {
        let mut guard = pool.lock();
        let id = guard.next;
        guard.next += 1;
        id
    }

    pub(crate) fn claimed(pool: &Mutex<PagePool>) -> usize {
        pool.lock().next
    }
}

/// Thread-private writer appending one worker's entries to its own pages.
pub(crate) struct PageWriter<'a> {
    pool: &'a Mutex<PagePool>,
    label: &'static str,
    page_size: usize,
    one_atom: usize,
    current: Option<(usize, Vec<Neighbor>)>,
    finished: Vec<(usize, Vec<Neighbor>)>,
    spans: Vec<(usize, Span)>,
    atom: usize,
    atom_start: usize,
}

impl<'a> PageWriter<'a> {
    pub(crate) fn new(
        pool: &'a Mutex<PagePool>,
        label: &'static str,
        page_size: usize,
        one_atom: usize,
    ) -> Self {
        Self {
            pool,
            label,
            page_size,
            one_atom,
            current: None,
            finished: Vec::new(),
            spans: Vec::new(),
            atom: 0,
            atom_start: 0,
        }
    }

    /// Opens the entry run of particle `i`, claiming a fresh page unless the
    /// current one still has room for `one_atom` entries.
    pub(crate) fn begin(&mut self, i: usize) {
        let needs_page = match &self.current {
            Some((_, page)) => self.page_size - page.len() < self.one_atom,
            None => true,
        };
        if needs_page {
            if let Some(full) = self.current.take() {
                self.finished.push(full);
            }
            let id = PagePool::claim(self.pool);
            self.current = Some((id, Vec::with_capacity(self.page_size)));
        }
        self.atom = i;
        self.atom_start = self.current.as_ref().map_or(0, |(_, page)| page.len());
    }

    pub(crate) fn push(&mut self, entry: Neighbor) -> Result<()> {
        let Some((_, page)) = self.current.as_mut() else {
            return Err(RxError::Capacity(format!(
                "{} list written outside of an open particle run",
                self.label
            )));
        };
        if page.len() - self.atom_start >= self.one_atom {
            return Err(RxError::Capacity(format!(
                "{} list of particle {} exceeds one_atom = {}; boost one_atom or page_size",
                self.label, self.atom, self.one_atom
            )));
        }
        page.push(entry);
        Ok(())
    }

    /// Closes the run opened by [`PageWriter::begin`].
    pub(crate) fn end(&mut self) {
        if let Some((id, page)) = &self.current {
            self.spans.push((
                self.atom,
                Span {
                    page: *id,
                    start: self.atom_start,
                    len: page.len() - self.atom_start,
                },
            ));
        }
    }

    pub(crate) fn finish(mut self) -> WorkerPages {
        if let Some(last) = self.current.take() {
            self.finished.push(last);
        }
        WorkerPages {
            pages: self.finished,
            spans: self.spans,
        }
    }
}

/// Pages and spans produced by one worker.
pub(crate) struct WorkerPages {
    pages: Vec<(usize, Vec<Neighbor>)>,
    spans: Vec<(usize, Span)>,
}

/// Neighbor entries of every owned particle, stored in fixed-size pages.
#[derive(Debug, Clone, Default)]
pub struct PagedList {
    pages: Vec<Vec<Neighbor>>,
    spans: Vec<Span>,
}

impl PagedList {
    /// Stitches worker output together. Page ids index the final page vector.
    pub(crate) fn assemble(inum: usize, page_count: usize, workers: Vec<WorkerPages>) -> Self {
        let mut pages = vec![Vec::new(); page_count];
        let mut spans = vec![Span::default(); inum];
        for worker in workers {
            for (id, page) in worker.pages {
                pages[id] = page;
            }
            for (i, span) in worker.spans {
                spans[i] = span;
            }
        }
        Self { pages, spans }
    }

    /// Number of particles with a list ("inum").
    pub fn inum(&self) -> usize {
        self.spans.len()
    }

    pub fn neighbors(&self, i: usize) -> &[Neighbor] {
        let span = self.spans[i];
        if span.len == 0 {
            return &[];
        }
        &self.pages[span.page][span.start..span.start + span.len]
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &[Neighbor])> + '_ {
        (0..self.inum()).map(move |i| (i, self.neighbors(i)))
    }

    /// Total number of entries over all particles.
    pub fn total(&self) -> usize {
        self.spans.iter().map(|s| s.len).sum()
    }

    pub fn pages_used(&self) -> usize {
        self.pages.len()
    }

    /// Every `(i, j)` pair in the list, in list order.
    pub fn pairs(&self) -> Vec<(usize, usize)> {
        self.iter()
            .flat_map(|(i, list)| list.iter().map(move |n| (i, n.index)))
            .collect()
    }
}

/// The nested lists used by multi-timescale force splitting.
#[derive(Debug, Clone, Default)]
pub struct RespaLists {
    pub full: PagedList,
    pub inner: PagedList,
    pub middle: Option<PagedList>,
}
