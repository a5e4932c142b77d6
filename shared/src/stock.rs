//! Stock ledger arithmetic
//!
//! Pure functions shared by every storage backend: they decide whether a
//! reservation or adjustment may proceed, the storage layer only applies
//! the result inside its transaction.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{WorkflowError, WorkflowResult};

/// A variant that cannot be served from stock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortfall {
    pub product_variant_id: Uuid,
    pub requested: i64,
    pub available: i64,
    pub missing: i64,
}

/// Sum requested quantities per variant.
///
/// An order may list the same variant on several lines; availability is
/// judged against the total, never line by line.
pub fn aggregate_requirements<I>(lines: I) -> BTreeMap<Uuid, i64>
where
    I: IntoIterator<Item = (Uuid, i32)>,
{
    let mut required = BTreeMap::new();
    for (variant_id, quantity) in lines {
        *required.entry(variant_id).or_insert(0i64) += i64::from(quantity);
    }
    required
}

/// Every variant whose available quantity is below the requirement.
///
/// Variants missing from `available` count as zero stock. The result is
/// ordered by variant id.
pub fn find_shortfalls(
    required: &BTreeMap<Uuid, i64>,
    available: &HashMap<Uuid, i32>,
) -> Vec<Shortfall> {
    required
        .iter()
        .filter_map(|(variant_id, &requested)| {
            let have = i64::from(available.get(variant_id).copied().unwrap_or(0));
            (have < requested).then(|| Shortfall {
                product_variant_id: *variant_id,
                requested,
                available: have,
                missing: requested - have,
            })
        })
        .collect()
}

/// Compute the post-reservation level of every required variant, or fail
/// with all shortfalls at once.
pub fn plan_reservation(
    required: &BTreeMap<Uuid, i64>,
    available: &HashMap<Uuid, i32>,
) -> WorkflowResult<BTreeMap<Uuid, i32>> {
    let shortfalls = find_shortfalls(required, available);
    if !shortfalls.is_empty() {
        return Err(WorkflowError::InsufficientStock { shortfalls });
    }

    required
        .iter()
        .map(|(variant_id, &requested)| {
            let have = i64::from(available.get(variant_id).copied().unwrap_or(0));
            // have >= requested here, so the difference fits in i32
            let left = i32::try_from(have - requested).map_err(|_| {
                WorkflowError::validation("quantity", "Stock quantity out of range")
            })?;
            Ok((*variant_id, left))
        })
        .collect()
}

/// Apply a signed delta to a stock level.
pub fn apply_delta(variant_id: Uuid, current: i32, delta: i32) -> WorkflowResult<i32> {
    let next = i64::from(current) + i64::from(delta);
    if next < 0 {
        return Err(WorkflowError::InsufficientStock {
            shortfalls: vec![Shortfall {
                product_variant_id: variant_id,
                requested: -i64::from(delta),
                available: i64::from(current),
                missing: -next,
            }],
        });
    }
    i32::try_from(next)
        .map_err(|_| WorkflowError::validation("amount", "Stock quantity out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[test]
    fn test_split_lines_are_summed() {
        let required = aggregate_requirements(vec![
            (variant(1), 2),
            (variant(2), 1),
            (variant(1), 3),
        ]);
        assert_eq!(required.get(&variant(1)), Some(&5));
        assert_eq!(required.get(&variant(2)), Some(&1));
    }

    #[test]
    fn test_split_lines_exceeding_stock_are_short() {
        // Each line alone fits into 4 units, the sum does not
        let required = aggregate_requirements(vec![(variant(1), 3), (variant(1), 3)]);
        let available = HashMap::from([(variant(1), 4)]);

        let shortfalls = find_shortfalls(&required, &available);
        assert_eq!(
            shortfalls,
            vec![Shortfall {
                product_variant_id: variant(1),
                requested: 6,
                available: 4,
                missing: 2,
            }]
        );
    }

    #[test]
    fn test_unknown_variant_counts_as_empty() {
        let required = aggregate_requirements(vec![(variant(9), 1)]);
        let shortfalls = find_shortfalls(&required, &HashMap::new());
        assert_eq!(shortfalls[0].available, 0);
        assert_eq!(shortfalls[0].missing, 1);
    }

    #[test]
    fn test_plan_reservation_reports_every_short_variant() {
        let required = aggregate_requirements(vec![(variant(1), 5), (variant(2), 2), (variant(3), 1)]);
        let available = HashMap::from([(variant(1), 3), (variant(2), 2)]);

        match plan_reservation(&required, &available) {
            Err(WorkflowError::InsufficientStock { shortfalls }) => {
                let ids: Vec<Uuid> = shortfalls.iter().map(|s| s.product_variant_id).collect();
                assert_eq!(ids, vec![variant(1), variant(3)]);
                assert_eq!(shortfalls[0].missing, 2);
            }
            other => panic!("expected shortfall, got {:?}", other),
        }
    }

    #[test]
    fn test_plan_reservation_levels() {
        let required = aggregate_requirements(vec![(variant(1), 2), (variant(1), 1)]);
        let available = HashMap::from([(variant(1), 10)]);
        let plan = plan_reservation(&required, &available).unwrap();
        assert_eq!(plan.get(&variant(1)), Some(&7));
    }

    #[test]
    fn test_apply_delta() {
        assert_eq!(apply_delta(variant(1), 3, 2).unwrap(), 5);
        assert_eq!(apply_delta(variant(1), 3, -3).unwrap(), 0);

        match apply_delta(variant(1), 3, -5) {
            Err(WorkflowError::InsufficientStock { shortfalls }) => {
                assert_eq!(shortfalls[0].missing, 2);
                assert_eq!(shortfalls[0].requested, 5);
            }
            other => panic!("expected shortfall, got {:?}", other),
        }

        assert!(matches!(
            apply_delta(variant(1), i32::MAX, 1),
            Err(WorkflowError::Validation { .. })
        ));
    }
}
