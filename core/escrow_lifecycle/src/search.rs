//! Project listing with totals and a status histogram.
//!
//! The page, the total count and the histogram are fetched concurrently and
//! joined. Privileged callers get unfiltered totals next to their filtered
//! page. A failure in any branch fails the whole search.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::error;

use crate::errors::Result;
use crate::storage::{Page, ProjectFilter, ProjectStore};
use crate::types::{CallerClass, Project, ProjectStatus};

/// Page size used when the caller asks for zero rows.
pub const DEFAULT_PAGE_SIZE: u64 = 20;
/// Largest page a caller may ask for.
pub const MAX_PAGE_SIZE: u64 = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub filter: ProjectFilter,
    pub offset: u64,
    pub limit: u64,
}

impl SearchQuery {
    fn page(&self) -> Page {
        let limit = match self.limit {
            0 => DEFAULT_PAGE_SIZE,
            n => n.min(MAX_PAGE_SIZE),
        };
        Page {
            offset: self.offset,
            limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub rows: Vec<Project>,
    pub total: u64,
    /// One entry per status, zero when absent.
    pub histogram: BTreeMap<ProjectStatus, u64>,
}

/// Histogram with every status present at zero.
pub fn empty_histogram() -> BTreeMap<ProjectStatus, u64> {
    ProjectStatus::ALL.into_iter().map(|s| (s, 0)).collect()
}

pub async fn search(
    projects: &dyn ProjectStore,
    query: &SearchQuery,
    caller: CallerClass,
) -> Result<SearchResult> {
    let totals_filter = match caller {
        CallerClass::Privileged => None,
        CallerClass::Standard => Some(&query.filter),
    };
    let unfiltered = ProjectFilter::default();

    let (rows, total, counts) = tokio::join!(
        projects.list_by_filter(&query.filter, query.page()),
        projects.count_by_filter(totals_filter.unwrap_or(&unfiltered)),
        projects.count_by_status(totals_filter),
    );

    let (rows, total, counts) = match (rows, total, counts) {
        (Ok(rows), Ok(total), Ok(counts)) => (rows, total, counts),
        (Err(err), _, _) | (_, Err(err), _) | (_, _, Err(err)) => {
            error!("Project search failed: {err}");
            return Err(err.into());
        }
    };

    let mut histogram = empty_histogram();
    for (status, count) in counts {
        *histogram.entry(status).or_insert(0) += count;
    }

    Ok(SearchResult {
        rows,
        total,
        histogram,
    })
}
