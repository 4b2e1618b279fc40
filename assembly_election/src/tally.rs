//! Tally and majority evaluation.
//!
//! Evaluation is a pure function of the stored ballots and the frozen quorum of an office. No
//! outcome is reported before every present member has voted in the round, so the result of a
//! round is never revealed while it is still running.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::{Add, AddAssign};

use log::debug;

use crate::attendance;
use crate::config::*;
use crate::store::Tables;

#[derive(Eq, PartialEq, Debug, Clone, Copy, PartialOrd, Ord, Hash)]
pub(crate) struct VoteCount(pub u64);

impl VoteCount {
    pub const EMPTY: VoteCount = VoteCount(0);
}

impl std::iter::Sum for VoteCount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        VoteCount(iter.map(|vc| vc.0).sum())
    }
}

impl AddAssign for VoteCount {
    fn add_assign(&mut self, rhs: VoteCount) {
        self.0 += rhs.0;
    }
}

impl Add for VoteCount {
    type Output = VoteCount;
    fn add(self: VoteCount, rhs: VoteCount) -> VoteCount {
        VoteCount(self.0 + rhs.0)
    }
}

/// What the ballots of a round decide.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Outcome {
    /// Some present members have not voted yet in this round.
    AwaitingTurnout,
    /// The candidate won the office in this round.
    Elected {
        candidate: CandidateId,
        decision: Decision,
    },
    /// Everybody voted in a majority round and nobody reached the threshold.
    NeedsNextScrutiny,
    /// Everybody voted in the final round and these candidates share the lead. Only an
    /// administrator can resolve it.
    Tied { candidates: Vec<CandidateId> },
}

impl Outcome {
    /// The round is over without a winner.
    pub fn is_undecided(&self) -> bool {
        matches!(self, Outcome::NeedsNextScrutiny | Outcome::Tied { .. })
    }
}

/// The counts of one round of one office, and what they decide.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Tally {
    pub round: Round,
    pub quorum: u64,
    /// Distinct voters in this round.
    pub votes_in: u64,
    pub threshold: u64,
    /// Every candidate of the office, by descending votes then by candidacy order.
    pub counts: Vec<(CandidateId, u64)>,
    pub outcome: Outcome,
}

impl Tally {
    pub fn votes_for(&self, candidate: CandidateId) -> u64 {
        self.counts
            .iter()
            .find(|(cid, _)| *cid == candidate)
            .map(|(_, c)| *c)
            .unwrap_or(0)
    }
}

/// The number of votes needed to win a round outright.
///
/// Majority rounds need an absolute majority of the present members, `floor(quorum / 2) + 1`.
/// The final round is decided by plurality.
pub fn majority_threshold(rules: &ElectionRules, round: Round, quorum: u64) -> u64 {
    if rules.is_final_round(round) {
        1
    } else {
        (quorum / 2) + 1
    }
}

/// Decides a round from its counts.
///
/// `counts` holds every candidate of the office, including those without votes.
pub(crate) fn evaluate(
    rules: &ElectionRules,
    round: Round,
    quorum: u64,
    votes_in: u64,
    counts: &BTreeMap<CandidateId, VoteCount>,
) -> Tally {
    let threshold = majority_threshold(rules, round, quorum);

    let mut sorted: Vec<(CandidateId, VoteCount)> =
        counts.iter().map(|(cid, vc)| (*cid, *vc)).collect();
    // Candidacy ids grow with creation time: ties keep the order candidates were added in.
    sorted.sort_by(|(c1, v1), (c2, v2)| v2.cmp(v1).then(c1.cmp(c2)));
    debug!(
        "evaluate: round {} quorum {} votes_in {} threshold {} sorted {:?}",
        round, quorum, votes_in, threshold, sorted
    );

    let outcome = if votes_in < quorum || sorted.is_empty() {
        Outcome::AwaitingTurnout
    } else if rules.is_final_round(round) {
        let (leader, lead) = sorted[0];
        let tied: Vec<CandidateId> = sorted
            .iter()
            .filter(|(_, vc)| *vc == lead)
            .map(|(cid, _)| *cid)
            .collect();
        if tied.len() > 1 {
            Outcome::Tied { candidates: tied }
        } else if lead.0 >= threshold {
            Outcome::Elected {
                candidate: leader,
                decision: Decision::Plurality,
            }
        } else {
            Outcome::AwaitingTurnout
        }
    } else {
        let (leader, lead) = sorted[0];
        if lead.0 >= threshold {
            Outcome::Elected {
                candidate: leader,
                decision: Decision::Majority,
            }
        } else {
            Outcome::NeedsNextScrutiny
        }
    };

    Tally {
        round,
        quorum,
        votes_in,
        threshold,
        counts: sorted.iter().map(|(cid, vc)| (*cid, vc.0)).collect(),
        outcome,
    }
}

pub(crate) fn compute_tally(
    t: &Tables,
    election: ElectionId,
    office: OfficeId,
    round: Round,
) -> (BTreeMap<CandidateId, VoteCount>, u64) {
    // Initialize with the candidates to capture those without a single vote.
    let mut tally: BTreeMap<CandidateId, VoteCount> = t
        .candidacies_for(election, office)
        .map(|c| (c.id, VoteCount::EMPTY))
        .collect();
    let mut voters: BTreeSet<MemberId> = BTreeSet::new();
    for b in t.ballots_for(election, office, round) {
        voters.insert(b.voter);
        if let Some(vc) = tally.get_mut(&b.candidate) {
            *vc += VoteCount(1);
        }
    }
    (tally, voters.len() as u64)
}

/// Tallies a round of an office against its frozen quorum.
pub(crate) fn tally_round(
    t: &Tables,
    rules: &ElectionRules,
    election: ElectionId,
    office: OfficeId,
    round: Round,
) -> Tally {
    let quorum = attendance::present_count(t, AttendanceScope::Office(election, office));
    let (counts, votes_in) = compute_tally(t, election, office, round);
    evaluate(rules, round, quorum, votes_in, &counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(votes: &[u64]) -> BTreeMap<CandidateId, VoteCount> {
        votes
            .iter()
            .enumerate()
            .map(|(idx, v)| (CandidateId(idx as u64 + 1), VoteCount(*v)))
            .collect()
    }

    fn run(round: Round, quorum: u64, votes: &[u64]) -> Tally {
        let c = counts(votes);
        let votes_in = c.values().cloned().sum::<VoteCount>().0;
        evaluate(&ElectionRules::DEFAULT_RULES, round, quorum, votes_in, &c)
    }

    #[test]
    fn thresholds() {
        let rules = ElectionRules::DEFAULT_RULES;
        assert_eq!(majority_threshold(&rules, 1, 10), 6);
        assert_eq!(majority_threshold(&rules, 2, 9), 5);
        assert_eq!(majority_threshold(&rules, 1, 1), 1);
        assert_eq!(majority_threshold(&rules, 3, 9), 1);
    }

    #[test]
    fn majority_reached_at_full_turnout() {
        let t = run(1, 10, &[6, 4]);
        assert_eq!(
            t.outcome,
            Outcome::Elected {
                candidate: CandidateId(1),
                decision: Decision::Majority
            }
        );
        assert_eq!(t.threshold, 6);
    }

    #[test]
    fn no_outcome_before_full_turnout() {
        // Six out of ten already guarantees the win, but the round is still running.
        let t = run(1, 10, &[6, 3]);
        assert_eq!(t.outcome, Outcome::AwaitingTurnout);
    }

    #[test]
    fn split_vote_needs_next_scrutiny() {
        let t = run(1, 10, &[5, 5]);
        assert_eq!(t.outcome, Outcome::NeedsNextScrutiny);
        assert!(t.outcome.is_undecided());
    }

    #[test]
    fn final_round_plurality() {
        let t = run(3, 9, &[4, 3, 2]);
        assert_eq!(
            t.outcome,
            Outcome::Elected {
                candidate: CandidateId(1),
                decision: Decision::Plurality
            }
        );
    }

    #[test]
    fn final_round_tie_is_not_resolved() {
        let t = run(3, 9, &[4, 4, 1]);
        assert_eq!(
            t.outcome,
            Outcome::Tied {
                candidates: vec![CandidateId(1), CandidateId(2)]
            }
        );
    }

    #[test]
    fn presentation_order_is_by_votes_then_candidacy() {
        let t = run(1, 9, &[2, 5, 2]);
        let order: Vec<CandidateId> = t.counts.iter().map(|(cid, _)| *cid).collect();
        assert_eq!(order, vec![CandidateId(2), CandidateId(1), CandidateId(3)]);
        assert_eq!(t.votes_for(CandidateId(3)), 2);
        assert_eq!(t.votes_for(CandidateId(9)), 0);
    }
}
