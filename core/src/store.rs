//! Persistence seams and pagination types.
//!
//! Stores are treated as transactional row stores: each write method runs
//! inside a single transaction that commits before the caller performs
//! any external RPC or publish. Uniqueness and version arbitration live
//! in the store, not the application.

use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::appointment::{Appointment, AppointmentId};
use crate::patient::{Patient, PatientId};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors surfaced by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The email unique constraint rejected the write. This, not the
    /// advisory pre-check, is the authority on email uniqueness.
    #[error("email '{email}' is already registered")]
    DuplicateEmail {
        /// The conflicting email.
        email: String,
    },

    /// The referenced row does not exist.
    #[error("{entity} {id} not found")]
    RowNotFound {
        /// Entity kind.
        entity: &'static str,
        /// Row identifier.
        id: String,
    },

    /// Compare-and-swap on the version column failed: another writer
    /// advanced the row since it was read.
    #[error("version conflict on {entity} {id}: expected version {expected}")]
    VersionConflict {
        /// Entity kind.
        entity: &'static str,
        /// Row identifier.
        id: String,
        /// The stale version the writer held.
        expected: i64,
    },

    /// Any other database failure.
    #[error("database error: {0}")]
    Database(String),
}

/// Sort direction for listings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDir {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

impl SortDir {
    /// Parse `"asc"`/`"desc"` (case-insensitive); anything else is
    /// ascending, matching the query surface's lenient contract.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("desc") {
            Self::Desc
        } else {
            Self::Asc
        }
    }

    /// Canonical lowercase form, used in cache keys.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Fields a patient listing can be filtered on.
///
/// Parsing is deliberately total-with-rejection: an unrecognized field
/// yields `None`, and the service answers with an empty page rather than
/// an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchField {
    /// Case-insensitive substring match on name.
    Name,
    /// Case-insensitive substring match on address.
    Address,
    /// Case-insensitive substring match on email.
    Email,
}

impl SearchField {
    /// Parse a field name, `None` if unrecognized.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Some(Self::Name),
            "address" => Some(Self::Address),
            "email" => Some(Self::Email),
            _ => None,
        }
    }
}

/// An active search filter (field + substring value).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchFilter {
    /// Field to match on.
    pub field: SearchField,
    /// Substring to match, case-insensitive.
    pub value: String,
}

/// Pagination and sorting parameters for patient listings.
///
/// Pages are 1-based on the query surface.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// 1-based page number.
    pub page: u32,
    /// Page size, at least 1.
    pub size: u32,
    /// Sort direction.
    pub sort_dir: SortDir,
    /// Field to sort by.
    pub sort_field: String,
}

impl PageRequest {
    /// Create a page request, clamping `page` and `size` to at least 1.
    #[must_use]
    pub fn new(page: u32, size: u32, sort_dir: SortDir, sort_field: impl Into<String>) -> Self {
        Self {
            page: page.max(1),
            size: size.max(1),
            sort_dir,
            sort_field: sort_field.into(),
        }
    }

    /// Zero-based row offset for this page.
    ///
    /// Saturates at page 1: the fields are public (and deserializable),
    /// so a `page` of 0 can reach here without going through [`new`].
    ///
    /// [`new`]: Self::new
    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.page.saturating_sub(1) as u64) * (self.size as u64)
    }
}

/// A page of results with totals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Total matching rows across all pages.
    pub total_elements: u64,
    /// Total page count.
    pub total_pages: u32,
    /// 1-based page number.
    pub page_number: u32,
    /// Requested page size.
    pub page_size: u32,
}

impl<T> Page<T> {
    /// Build a page from items and the total row count.
    #[must_use]
    pub fn new(items: Vec<T>, total_elements: u64, request: &PageRequest) -> Self {
        let size = u64::from(request.size);
        #[allow(clippy::cast_possible_truncation)] // page count bounded by u32 page numbers
        let total_pages = (total_elements.div_ceil(size)) as u32;
        Self {
            items,
            total_elements,
            total_pages,
            page_number: request.page,
            page_size: request.size,
        }
    }

    /// An empty page with zero totals, used for unrecognized search
    /// fields.
    #[must_use]
    pub const fn empty(request: &PageRequest) -> Self {
        Self {
            items: Vec::new(),
            total_elements: 0,
            total_pages: 0,
            page_number: request.page,
            page_size: request.size,
        }
    }

    /// Map the items, keeping the paging envelope.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total_elements: self.total_elements,
            total_pages: self.total_pages,
            page_number: self.page_number,
            page_size: self.page_size,
        }
    }
}

/// Persistence seam for patient records.
///
/// Each write method is a single transaction. Uses `impl Future` returns;
/// the command service is generic over the store rather than holding a
/// trait object.
pub trait PatientStore: Send + Sync {
    /// Insert a new patient. The email unique constraint is enforced
    /// here.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateEmail`] on a unique violation.
    fn insert(&self, patient: &Patient) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Overwrite an existing patient row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::RowNotFound`] if the id is absent, or
    /// [`StoreError::DuplicateEmail`] on a unique violation.
    fn update(&self, patient: &Patient) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Hard-delete a patient row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::RowNotFound`] if the id is absent.
    fn delete(&self, id: PatientId) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Look up a patient by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the read fails.
    fn find_by_id(
        &self,
        id: PatientId,
    ) -> impl Future<Output = Result<Option<Patient>, StoreError>> + Send;

    /// Advisory email existence pre-check, optionally excluding one
    /// patient (for updates).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the read fails.
    fn email_exists(
        &self,
        email: &str,
        excluding: Option<PatientId>,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Paginated, optionally filtered listing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    fn list(
        &self,
        request: &PageRequest,
        filter: Option<&SearchFilter>,
    ) -> impl Future<Output = Result<Page<Patient>, StoreError>> + Send;
}

/// Persistence seam for appointments with store-arbited optimistic
/// concurrency.
pub trait AppointmentStore: Send + Sync {
    /// Insert a new appointment at version 0.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the write fails.
    fn insert(
        &self,
        appointment: &Appointment,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Update an appointment via compare-and-swap on
    /// `expected_version`. On success the stored version advances by
    /// exactly 1 and the new version is returned.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VersionConflict`] if another writer already
    /// advanced the row, or [`StoreError::RowNotFound`] if the id is
    /// absent.
    fn update(
        &self,
        appointment: &Appointment,
        expected_version: i64,
    ) -> impl Future<Output = Result<i64, StoreError>> + Send;

    /// Look up an appointment by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the read fails.
    fn find_by_id(
        &self,
        id: AppointmentId,
    ) -> impl Future<Output = Result<Option<Appointment>, StoreError>> + Send;

    /// Paginated listing of appointments starting within `[from, to]`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    fn list_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        request: &PageRequest,
    ) -> impl Future<Output = Result<Page<Appointment>, StoreError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_dir_parses_leniently() {
        assert_eq!(SortDir::parse("DESC"), SortDir::Desc);
        assert_eq!(SortDir::parse("asc"), SortDir::Asc);
        assert_eq!(SortDir::parse("sideways"), SortDir::Asc);
    }

    #[test]
    fn search_field_rejects_unknown() {
        assert_eq!(SearchField::parse("Email"), Some(SearchField::Email));
        assert_eq!(SearchField::parse("ssn"), None);
    }

    #[test]
    fn page_request_clamps_to_one() {
        let request = PageRequest::new(0, 0, SortDir::Asc, "name");
        assert_eq!(request.page, 1);
        assert_eq!(request.size, 1);
        assert_eq!(request.offset(), 0);
    }

    #[test]
    fn offset_saturates_when_page_zero_bypasses_new() {
        // A deserialized request can carry page 0 without the
        // constructor's clamp.
        let request: PageRequest = serde_json::from_value(serde_json::json!({
            "page": 0,
            "size": 10,
            "sort_dir": "Asc",
            "sort_field": "name",
        }))
        .unwrap();
        assert_eq!(request.page, 0);
        assert_eq!(request.offset(), 0);
    }

    #[test]
    fn page_totals() {
        let request = PageRequest::new(2, 10, SortDir::Asc, "name");
        let page = Page::new(vec![1, 2, 3], 23, &request);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.total_elements, 23);
        assert_eq!(page.page_number, 2);
    }

    #[test]
    fn empty_page_has_zero_totals() {
        let request = PageRequest::new(1, 10, SortDir::Desc, "name");
        let page: Page<()> = Page::empty(&request);
        assert_eq!(page.total_elements, 0);
        assert_eq!(page.total_pages, 0);
        assert!(page.items.is_empty());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // The page count must cover every element without a full
            // page of slack.
            #[test]
            fn page_count_covers_all_elements(total in 0u64..100_000, size in 1u32..1_000) {
                let request = PageRequest::new(1, size, SortDir::Asc, "name");
                let page: Page<()> = Page::new(Vec::new(), total, &request);
                let capacity = u64::from(page.total_pages) * u64::from(size);
                prop_assert!(capacity >= total);
                if total > 0 {
                    prop_assert!(capacity - total < u64::from(size));
                }
            }

            #[test]
            fn sort_dir_parse_is_total(s in ".*") {
                // Lenient parsing never fails, whatever the input.
                let _ = SortDir::parse(&s);
            }

            #[test]
            fn offset_matches_page_arithmetic(page in 1u32..10_000, size in 1u32..1_000) {
                let request = PageRequest::new(page, size, SortDir::Asc, "name");
                prop_assert_eq!(request.offset(), u64::from(page - 1) * u64::from(size));
            }
        }
    }
}
