//! Judge-vote processing for tiebreak battles.
//!
//! A tiebreak resolves over one or more voting rounds. With two performers
//! left the round keeps the plurality holder (keep mode, always terminal);
//! with more it eliminates the plurality holder (eliminate mode) until the
//! remaining count matches the winners needed.
//!
//! Plurality ties are broken by roster order: among performers sharing the
//! top vote count, the one attached to the battle earliest holds the
//! plurality. This replaces the incidental insertion-order behavior of
//! earlier systems with an explicit rule.

use std::collections::HashMap;

use crate::model::{EngineError, EngineResult, PerformerId};

/// Result of one voting round.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VoteOutcome {
    /// Whether the tiebreak is resolved.
    pub complete: bool,
    /// Winners, populated only when complete.
    pub winners: Vec<PerformerId>,
    /// The performer eliminated this round, if any.
    pub eliminated: Option<PerformerId>,
    /// Performers still in contention after this round.
    pub remaining: Vec<PerformerId>,
    /// Round number for the next round (unchanged when complete).
    pub next_round: u32,
}

/// Process one round of judge votes over the remaining tied performers.
///
/// Every vote must name a remaining performer, and at least one vote must be
/// cast.
pub fn process_votes(
    remaining: &[PerformerId],
    votes: &[PerformerId],
    winners_needed: usize,
    round: u32,
) -> EngineResult<VoteOutcome> {
    if remaining.len() < 2 {
        return Err(EngineError::InvalidArgument(format!(
            "tiebreak round needs at least 2 performers, got {}",
            remaining.len()
        )));
    }
    if votes.is_empty() {
        return Err(EngineError::invalid("no votes cast"));
    }

    let mut counts: HashMap<PerformerId, usize> = HashMap::new();
    for vote in votes {
        if !remaining.contains(vote) {
            return Err(EngineError::invalid(format!(
                "vote references performer {vote} outside the tiebreak"
            )));
        }
        *counts.entry(*vote).or_insert(0) += 1;
    }

    // Roster order breaks count ties: strict greater-than keeps the earliest.
    let mut plurality = remaining[0];
    let mut best = counts.get(&plurality).copied().unwrap_or(0);
    for id in &remaining[1..] {
        let count = counts.get(id).copied().unwrap_or(0);
        if count > best {
            plurality = *id;
            best = count;
        }
    }

    if remaining.len() == 2 {
        // Keep mode: the plurality holder is the sole winner.
        let eliminated = remaining.iter().copied().find(|id| *id != plurality);
        return Ok(VoteOutcome {
            complete: true,
            winners: vec![plurality],
            eliminated,
            remaining: vec![plurality],
            next_round: round,
        });
    }

    // Eliminate mode: the plurality holder is out.
    let survivors: Vec<PerformerId> = remaining
        .iter()
        .copied()
        .filter(|id| *id != plurality)
        .collect();
    if survivors.len() == winners_needed {
        Ok(VoteOutcome {
            complete: true,
            winners: survivors.clone(),
            eliminated: Some(plurality),
            remaining: survivors,
            next_round: round,
        })
    } else {
        Ok(VoteOutcome {
            complete: false,
            winners: Vec::new(),
            eliminated: Some(plurality),
            remaining: survivors,
            next_round: round + 1,
        })
    }
}
