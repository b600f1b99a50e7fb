//! Cache key composition.
//!
//! Keys are deterministic composites so identical queries share one
//! entry. Filtered listings are never cached, so the search terms do
//! not appear in any key; cardinality is bounded by page/sort
//! combinations alone.

use patientcare_core::cache::{LISTING_PREFIX, PATIENT_PREFIX};
use patientcare_core::patient::PatientId;
use patientcare_core::store::PageRequest;

/// Key for an unfiltered listing page:
/// `patients:{page}:{size}:{sort_dir}:{sort_field}`.
#[must_use]
pub fn listing_key(request: &PageRequest) -> String {
    format!(
        "{LISTING_PREFIX}{}:{}:{}:{}",
        request.page,
        request.size,
        request.sort_dir.as_str(),
        request.sort_field
    )
}

/// Key for a single-patient entry: `patient:{id}`.
#[must_use]
pub fn patient_key(id: PatientId) -> String {
    format!("{PATIENT_PREFIX}{id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use patientcare_core::store::SortDir;

    #[test]
    fn listing_key_is_deterministic() {
        let request = PageRequest::new(2, 25, SortDir::Desc, "email");
        assert_eq!(listing_key(&request), "patients:2:25:desc:email");
        assert_eq!(listing_key(&request), listing_key(&request.clone()));
    }

    #[test]
    fn patient_key_uses_id_namespace() {
        let id = PatientId::new();
        let key = patient_key(id);
        assert_eq!(key, format!("patient:{id}"));
        assert!(!key.starts_with(LISTING_PREFIX));
    }
}
