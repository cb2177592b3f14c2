// Copyright 2023 Remi Bernotavicius

/// Limit/offset window over an ordered listing.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Pagination {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self {
            limit: Some(limit),
            offset,
        }
    }

    /// `LIMIT` for the SQL query; no limit maps to the largest value SQLite takes.
    pub fn sql_limit(&self) -> i64 {
        self.limit
            .and_then(|l| i64::try_from(l).ok())
            .unwrap_or(i64::MAX)
    }

    pub fn sql_offset(&self) -> i64 {
        i64::try_from(self.offset).unwrap_or(i64::MAX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Size of the whole listing, not of this page.
    pub count: usize,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(count: i64, results: Vec<T>) -> Self {
        Self {
            count: usize::try_from(count).unwrap_or_default(),
            results,
        }
    }

    pub fn empty() -> Self {
        Self {
            count: 0,
            results: vec![],
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            count: self.count,
            results: self.results.into_iter().map(f).collect(),
        }
    }

    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        Ok(Page {
            count: self.count,
            results: self.results.into_iter().map(f).collect::<Result<_, _>>()?,
        })
    }
}

#[test]
fn pagination_windows() {
    assert_eq!(Pagination::default().sql_limit(), i64::MAX);
    assert_eq!(Pagination::default().sql_offset(), 0);
    assert_eq!(Pagination::new(2, 10).sql_limit(), 2);
    assert_eq!(Pagination::new(2, 10).sql_offset(), 10);

    let page = Page::new(5, vec![2u32, 3]).map(|i| i * 2);
    assert_eq!(
        page,
        Page {
            count: 5,
            results: vec![4, 6]
        }
    );
    assert_eq!(Page::<u32>::empty().count, 0);
}
