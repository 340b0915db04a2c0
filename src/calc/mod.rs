//! Pure tournament arithmetic: performer thresholds, qualification capacity,
//! and pool-size distribution. No side effects; everything else in the
//! engine builds on these.

use crate::constants::ELIMINATION_RATE;
use crate::model::{EngineError, EngineResult};

/// Qualification capacity for a category's Preselection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PoolCapacity {
    pub qualifying: usize,
    pub eliminated: usize,
}

/// Minimum performers a category needs before Preselection may start:
/// `groups_ideal * 2 + 1`. Guarantees Preselection eliminates at least one
/// performer and every pool ends with at least two.
pub fn minimum_performers(groups_ideal: usize) -> EngineResult<usize> {
    if groups_ideal < 1 {
        return Err(EngineError::InvalidArgument(format!(
            "groups_ideal must be at least 1, got {groups_ideal}"
        )));
    }
    Ok(groups_ideal * 2 + 1)
}

/// Split registered performers into qualifying and eliminated counts.
///
/// The elimination target is a quarter of the field, rounded, but at least
/// one performer; the qualifying count is then clamped so every pool can be
/// filled with at least two performers.
pub fn pool_capacity(registered: usize, groups_ideal: usize) -> EngineResult<PoolCapacity> {
    let needed = minimum_performers(groups_ideal)?;
    if registered < needed {
        return Err(EngineError::InsufficientPerformers { needed, registered });
    }

    let target = (registered as f64 * ELIMINATION_RATE).round() as usize;
    let mut eliminated = target.max(1);
    let mut qualifying = registered - eliminated;

    let floor = groups_ideal * 2;
    if qualifying < floor {
        qualifying = floor;
        eliminated = registered - qualifying;
    }

    Ok(PoolCapacity {
        qualifying,
        eliminated,
    })
}

/// Distribute `qualifying` performers over `groups_ideal` pools as evenly as
/// possible, largest pools first. Sizes differ by at most one.
pub fn distribute_pool_sizes(qualifying: usize, groups_ideal: usize) -> EngineResult<Vec<usize>> {
    if groups_ideal < 1 {
        return Err(EngineError::InvalidArgument(format!(
            "groups_ideal must be at least 1, got {groups_ideal}"
        )));
    }
    let floor = groups_ideal * 2;
    if qualifying < floor {
        return Err(EngineError::InsufficientPerformers {
            needed: floor,
            registered: qualifying,
        });
    }

    let base = qualifying / groups_ideal;
    let extra = qualifying % groups_ideal;
    let sizes = (0..groups_ideal)
        .map(|i| if i < extra { base + 1 } else { base })
        .collect();
    Ok(sizes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimum_performers() {
        assert_eq!(minimum_performers(1).unwrap(), 3);
        assert_eq!(minimum_performers(2).unwrap(), 5);
        assert_eq!(minimum_performers(4).unwrap(), 9);
        assert!(matches!(
            minimum_performers(0),
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_pool_capacity_quarter_elimination() {
        // 9 performers: round(2.25) = 2 eliminated, 7 qualify.
        let cap = pool_capacity(9, 2).unwrap();
        assert_eq!(cap.qualifying, 7);
        assert_eq!(cap.eliminated, 2);

        // 12 performers: round(3.0) = 3 eliminated.
        let cap = pool_capacity(12, 2).unwrap();
        assert_eq!(cap.qualifying, 9);
        assert_eq!(cap.eliminated, 3);
    }

    #[test]
    fn test_pool_capacity_always_eliminates_someone() {
        // Quarter of 3 rounds to 1 only because of the max(1, ..) floor.
        let cap = pool_capacity(3, 1).unwrap();
        assert_eq!(cap.eliminated, 1);
        assert_eq!(cap.qualifying, 2);
    }

    #[test]
    fn test_pool_capacity_clamps_to_pool_floor() {
        // 5 performers, 2 pools: round(1.25) = 1 eliminated, 4 qualify,
        // exactly the 2-per-pool floor.
        let cap = pool_capacity(5, 2).unwrap();
        assert_eq!(cap.qualifying, 4);
        assert_eq!(cap.eliminated, 1);

        // 9 performers, 4 pools: quarter elimination would leave 7 < 8, so
        // the floor clamps qualification up and elimination down.
        let cap = pool_capacity(9, 4).unwrap();
        assert_eq!(cap.qualifying, 8);
        assert_eq!(cap.eliminated, 1);
    }

    #[test]
    fn test_pool_capacity_rejects_small_fields() {
        assert!(matches!(
            pool_capacity(4, 2),
            Err(EngineError::InsufficientPerformers {
                needed: 5,
                registered: 4
            })
        ));
    }

    #[test]
    fn test_distribute_pool_sizes_even_split() {
        assert_eq!(distribute_pool_sizes(8, 2).unwrap(), vec![4, 4]);
        assert_eq!(distribute_pool_sizes(7, 2).unwrap(), vec![4, 3]);
        assert_eq!(distribute_pool_sizes(10, 3).unwrap(), vec![4, 3, 3]);
        assert_eq!(distribute_pool_sizes(11, 3).unwrap(), vec![4, 4, 3]);
    }

    #[test]
    fn test_distribute_pool_sizes_rejects_underfull_pools() {
        assert!(matches!(
            distribute_pool_sizes(3, 2),
            Err(EngineError::InsufficientPerformers { .. })
        ));
        assert!(matches!(
            distribute_pool_sizes(5, 0),
            Err(EngineError::InvalidArgument(_))
        ));
    }
}
