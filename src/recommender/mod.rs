//! Reference-batch recommender.
//!
//! Given a newly proposed charge, scans all historical batches and picks
//! the single best analogue: within 5% relative mass tolerance, matching
//! on a majority of the seven composition features, highest extraction
//! among the survivors. The audit trail is a functional requirement:
//! every exclusion is logged with its reason so operators can trace why
//! a batch was passed over.

use crate::config::defaults::{
    COMPOSITION_TOLERANCE, MASS_TOLERANCE, MAX_COMPOSITION_MISMATCHES,
};
use crate::store::{BatchStore, StoreError};
use crate::types::{Batch, ProposedCharge};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why a candidate batch was excluded from the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    /// Charge weight outside the relative mass tolerance
    Mass,
    /// Too many composition features outside tolerance
    Chemistry(usize),
}

/// Selects the best historical reference batch for a proposed charge.
pub struct ProcessRecommender {
    store: Arc<BatchStore>,
}

impl ProcessRecommender {
    pub fn new(store: Arc<BatchStore>) -> Self {
        Self { store }
    }

    /// Find the best historical analogue for `input`.
    ///
    /// Returns `Ok(None)` when the store is empty or no candidate
    /// survives both filters; absence is a result, not an error. Ties
    /// on extraction keep the batch encountered first in store order.
    pub fn find_best_match(&self, input: &ProposedCharge) -> Result<Option<Batch>, StoreError> {
        info!("Reference batch search started");

        let all_batches = self.store.list_all_batches()?;
        if all_batches.is_empty() {
            warn!("Store is empty; reference search impossible");
            return Ok(None);
        }

        let scanned = all_batches.len();
        let mut rejected_by_mass = 0usize;
        let mut rejected_by_chemistry = 0usize;
        let mut candidates: Vec<Batch> = Vec::new();

        for batch in all_batches {
            match Self::check_candidate(input, &batch) {
                None => candidates.push(batch),
                Some(Rejection::Mass) => {
                    rejected_by_mass += 1;
                    debug!(
                        batch_id = %batch.batch_id,
                        candidate_weight = batch.sample_weight,
                        input_weight = input.sample_weight,
                        reason = "mass",
                        "Candidate rejected"
                    );
                }
                Some(Rejection::Chemistry(mismatches)) => {
                    rejected_by_chemistry += 1;
                    debug!(
                        batch_id = %batch.batch_id,
                        mismatches,
                        reason = "chemistry",
                        "Candidate rejected"
                    );
                }
            }
        }

        // Highest extraction wins; max_by keeps the later element on ties,
        // so iterate a strict comparison to preserve first-encountered order.
        let mut best: Option<&Batch> = None;
        for candidate in &candidates {
            match best {
                Some(current) if candidate.extraction_percent <= current.extraction_percent => {}
                _ => best = Some(candidate),
            }
        }

        match best {
            Some(batch) => {
                info!(
                    scanned,
                    rejected_by_mass,
                    rejected_by_chemistry,
                    candidates = candidates.len(),
                    best_batch = %batch.batch_id,
                    extraction_percent = batch.extraction_percent,
                    "Reference batch selected"
                );
                Ok(Some(batch.clone()))
            }
            None => {
                warn!(
                    scanned,
                    rejected_by_mass,
                    rejected_by_chemistry,
                    "No batch satisfies the matching criteria"
                );
                Ok(None)
            }
        }
    }

    /// Apply both filters to one candidate. `None` means it survives.
    fn check_candidate(input: &ProposedCharge, candidate: &Batch) -> Option<Rejection> {
        // Mass gate: 5% relative to the candidate's weight. A candidate
        // with zero (or negative) weight cannot anchor a relative
        // tolerance and is treated as a mass mismatch.
        if candidate.sample_weight <= 0.0 {
            return Some(Rejection::Mass);
        }
        let mass_diff_pct =
            (input.sample_weight - candidate.sample_weight).abs() / candidate.sample_weight;
        if mass_diff_pct > MASS_TOLERANCE {
            return Some(Rejection::Mass);
        }

        // Chemistry gate: each feature threshold is relative to the
        // candidate's value, so a candidate value of zero tolerates only
        // an exactly-zero input.
        let mut mismatches = 0usize;
        for ((_, input_value), (_, base_value)) in
            input.composition().into_iter().zip(candidate.composition())
        {
            let threshold = base_value * COMPOSITION_TOLERANCE;
            if (input_value - base_value).abs() > threshold {
                mismatches += 1;
            }
        }
        if mismatches > MAX_COMPOSITION_MISMATCHES {
            return Some(Rejection::Chemistry(mismatches));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_batch(batch_id: &str, weight: f64, extraction: f64) -> Batch {
        Batch {
            batch_id: batch_id.to_string(),
            extraction_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            sulfate_number: 2,
            sample_weight: weight,
            ni_percent: 1.5,
            cu_percent: 1.5,
            pt_percent: 8.0,
            pd_percent: 33.0,
            sio2_percent: 10.0,
            c_percent: 10.0,
            se_percent: 1.5,
            extraction_percent: extraction,
            process_duration: None,
            quality_rating: Some(5),
            operator_id: None,
            notes: None,
            created_at: None,
            is_good: true,
        }
    }

    fn matching_charge(weight: f64) -> ProposedCharge {
        ProposedCharge {
            sample_weight: weight,
            ni_percent: 1.5,
            cu_percent: 1.5,
            pt_percent: 8.0,
            pd_percent: 33.0,
            sio2_percent: 10.0,
            c_percent: 10.0,
            se_percent: 1.5,
        }
    }

    fn recommender_with(batches: &[Batch]) -> ProcessRecommender {
        let store = Arc::new(BatchStore::open_in_memory().unwrap());
        for batch in batches {
            store.upsert_batch(batch).unwrap();
        }
        ProcessRecommender::new(store)
    }

    #[test]
    fn test_empty_store_returns_no_match() {
        let rec = recommender_with(&[]);
        assert!(rec.find_best_match(&matching_charge(1000.0)).unwrap().is_none());
    }

    #[test]
    fn test_identical_charge_matches_reference_batch() {
        let rec = recommender_with(&[make_batch("P-001", 1000.0, 93.0)]);
        let best = rec.find_best_match(&matching_charge(1000.0)).unwrap();
        assert_eq!(best.unwrap().batch_id, "P-001");
    }

    #[test]
    fn test_mass_tolerance_boundaries() {
        let rec = recommender_with(&[make_batch("P-001", 1000.0, 93.0)]);

        // Exactly at the 5% boundary is accepted, both sides
        assert!(rec.find_best_match(&matching_charge(1050.0)).unwrap().is_some());
        assert!(rec.find_best_match(&matching_charge(950.0)).unwrap().is_some());
        // Just past it is rejected
        assert!(rec.find_best_match(&matching_charge(1051.0)).unwrap().is_none());
        assert!(rec.find_best_match(&matching_charge(949.0)).unwrap().is_none());
    }

    #[test]
    fn test_zero_weight_candidate_is_rejected_not_divided() {
        // The store refuses zero-weight batches, so exercise the filter
        // directly: the relative tolerance has no anchor and the
        // candidate counts as a mass mismatch.
        let mut zero = make_batch("ZERO", 1.0, 93.0);
        zero.sample_weight = 0.0;
        assert_eq!(
            ProcessRecommender::check_candidate(&matching_charge(1000.0), &zero),
            Some(Rejection::Mass)
        );
    }

    #[test]
    fn test_three_mismatches_accepted_four_rejected() {
        let rec = recommender_with(&[make_batch("P-001", 1000.0, 93.0)]);

        // Push exactly three features far outside 5% tolerance
        let mut charge = matching_charge(1000.0);
        charge.ni_percent = 3.0;
        charge.cu_percent = 3.0;
        charge.pt_percent = 12.0;
        assert!(rec.find_best_match(&charge).unwrap().is_some());

        // A fourth mismatch crosses the budget
        charge.sio2_percent = 14.0;
        assert!(rec.find_best_match(&charge).unwrap().is_none());
    }

    #[test]
    fn test_exact_base_value_is_not_a_mismatch() {
        let mut base = make_batch("P-001", 1000.0, 93.0);
        base.se_percent = 0.0;
        let mut charge = matching_charge(1000.0);
        charge.se_percent = 0.0;

        // Candidate value zero means threshold zero: equal passes
        assert_eq!(ProcessRecommender::check_candidate(&charge, &base), None);

        // Any nonzero input against a zero base counts as a mismatch.
        // Alone it is within the budget; stacked on three others it tips
        // the candidate over.
        charge.se_percent = 0.001;
        assert_eq!(ProcessRecommender::check_candidate(&charge, &base), None);

        charge.ni_percent = 3.0;
        charge.cu_percent = 3.0;
        charge.pt_percent = 12.0;
        assert_eq!(
            ProcessRecommender::check_candidate(&charge, &base),
            Some(Rejection::Chemistry(4))
        );
    }

    #[test]
    fn test_best_extraction_wins_among_survivors() {
        let rec = recommender_with(&[
            make_batch("A", 1000.0, 86.0),
            make_batch("B", 1000.0, 91.0),
            make_batch("C", 1000.0, 89.0),
        ]);
        let best = rec.find_best_match(&matching_charge(1000.0)).unwrap().unwrap();
        assert_eq!(best.batch_id, "B");
    }

    #[test]
    fn test_extraction_tie_keeps_first_in_store_order() {
        let rec = recommender_with(&[
            make_batch("FIRST", 1000.0, 91.0),
            make_batch("SECOND", 1000.0, 91.0),
        ]);
        let best = rec.find_best_match(&matching_charge(1000.0)).unwrap().unwrap();
        assert_eq!(best.batch_id, "FIRST");
    }
}
