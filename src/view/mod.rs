//! # Record View
//!
//! Read path over persisted leads: one full fetch, newest first, then search
//! and paging in memory. Nothing is cached between two [`RecordQueryView::load`]
//! calls.

use crate::database::Datastore;
use crate::database::DatastoreError;
use crate::database::Direction;
use crate::database::PersistedLead;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use tracing::warn;

pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Number of page links shown around the current page
const PAGE_WINDOW: usize = 5;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Failed to fetch data. Please try again.")]
    FetchFailed(#[source] DatastoreError),
}

/// One window of the filtered records.
#[derive(Debug)]
pub struct Page<'a> {
    /// 1-based page number
    pub number: usize,
    pub size: usize,
    pub total_pages: usize,
    /// Size of the filtered set
    pub total_records: usize,
    pub records: Vec<&'a PersistedLead>,
}

impl Page<'_> {
    /// `Showing X to Y of Z records`, or `None` for an empty page.
    pub fn showing(&self) -> Option<String> {
        if self.records.is_empty() {
            return None;
        }
        let first = (self.number - 1) * self.size + 1;
        let last = (self.number * self.size).min(self.total_records);
        Some(format!("Showing {} to {} of {} records", first, last, self.total_records))
    }
}

/// True when the lowercased `term` occurs in the company name, website or funding round.
pub fn matches_term(lead: &PersistedLead, term: &str) -> bool {
    let term = term.to_lowercase();
    [lead.company_name(), lead.website_url(), lead.funding_round()]
        .iter()
        .any(|field| field.to_lowercase().contains(&term))
}

pub fn filter_leads<'a>(leads: &'a [PersistedLead], term: &str) -> Vec<&'a PersistedLead> {
    leads.iter().filter(|lead| matches_term(lead, term)).collect()
}

pub fn total_pages(records: usize, page_size: usize) -> usize {
    if page_size == 0 {
        0
    } else {
        records.div_ceil(page_size)
    }
}

/// Slice `[(page - 1) * size, page * size)`; pages outside the range are empty.
pub fn paginate<T>(items: &[T], page: usize, page_size: usize) -> &[T] {
    if page == 0 || page_size == 0 {
        return &[];
    }
    let start = (page - 1).saturating_mul(page_size).min(items.len());
    let end = page.saturating_mul(page_size).min(items.len());
    &items[start..end]
}

/// Up to five page numbers: the first five while near the start, the last
/// five near the end, otherwise centred on `current`.
pub fn page_window(current: usize, total_pages: usize) -> Vec<usize> {
    let count = PAGE_WINDOW.min(total_pages);
    let first = if current <= 3 {
        1
    } else if current + 2 >= total_pages {
        total_pages + 1 - count
    } else {
        current - 2
    };
    (first..first + count).collect()
}

/// Searchable, paged view over one table.
pub struct RecordQueryView {
    store: Arc<dyn Datastore>,
    table: String,
    leads: Vec<PersistedLead>,
    term: String,
    current_page: usize,
    page_size: usize,
}

impl RecordQueryView {
    pub fn new(store: Arc<dyn Datastore>, table: impl Into<String>) -> Self {
        RecordQueryView {
            store,
            table: table.into(),
            leads: Vec::new(),
            term: String::new(),
            current_page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Page sizes below one are raised to one.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Fetches every record, newest first, replacing what the view held.
    /// On failure the view is left empty.
    pub async fn load(&mut self) -> Result<&[PersistedLead], QueryError> {
        self.leads.clear();
        self.current_page = 1;
        let records = self
            .store
            .select(&self.table, "created_at", Direction::Descending)
            .await
            .and_then(|records| records.into_iter().map(PersistedLead::from_record).collect::<Result<Vec<_>, _>>());
        match records {
            Ok(leads) => {
                info!(table = %self.table, records = leads.len(), "loaded records");
                self.leads = leads;
                Ok(self.leads.as_slice())
            }
            Err(error) => {
                warn!(table = %self.table, %error, "failed to load records");
                Err(QueryError::FetchFailed(error))
            }
        }
    }

    pub fn leads(&self) -> &[PersistedLead] {
        &self.leads
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    /// Sets the search term and returns to page 1.
    pub fn search(&mut self, term: &str) -> Vec<&PersistedLead> {
        term.clone_into(&mut self.term);
        self.current_page = 1;
        self.filtered()
    }

    pub fn filtered(&self) -> Vec<&PersistedLead> {
        filter_leads(&self.leads, &self.term)
    }

    pub fn total_pages(&self) -> usize {
        total_pages(self.filtered().len(), self.page_size)
    }

    /// Any page of the filtered records at any size.
    pub fn page(&self, number: usize, page_size: usize) -> Page<'_> {
        let filtered = self.filtered();
        Page {
            number,
            size: page_size,
            total_pages: total_pages(filtered.len(), page_size),
            total_records: filtered.len(),
            records: paginate(&filtered, number, page_size).to_vec(),
        }
    }

    /// The page navigation currently points at.
    pub fn current(&self) -> Page<'_> {
        self.page(self.current_page, self.page_size)
    }

    /// Moves to `page`, clamped to the existing pages, and returns the page moved to.
    pub fn go_to(&mut self, page: usize) -> usize {
        self.current_page = page.clamp(1, self.total_pages().max(1));
        self.current_page
    }

    pub fn page_links(&self) -> Vec<usize> {
        page_window(self.current_page, self.total_pages())
    }
}
