//! The per-office state machine.
//!
//! Every office of an election goes `pending -> active -> completed`, never backwards, and at
//! most one office of an election is active at any time. All the transitions of this module are
//! applied inside a single store transaction by the engine.

use std::collections::BTreeSet;

use log::{debug, info, warn};
use snafu::{ensure, OptionExt};

use crate::attendance;
use crate::config::*;
use crate::error::*;
use crate::store::Tables;
use crate::tally::{self, Outcome, Tally};

impl ElectionOffice {
    fn rejected(&self, action: Transition) -> ElectionError {
        InvalidTransitionSnafu {
            election: self.election,
            office: self.office,
            status: self.status,
            round: self.round,
            action,
        }
        .build()
    }

    fn begin(&mut self, now: Timestamp) -> ElectionResult<()> {
        if self.status != OfficeStatus::Pending {
            return Err(self.rejected(Transition::Open));
        }
        self.status = OfficeStatus::Active;
        self.round = 1;
        self.opened_at = Some(now);
        Ok(())
    }

    fn next_round(&mut self, rules: &ElectionRules) -> ElectionResult<Round> {
        if self.status != OfficeStatus::Active || rules.is_final_round(self.round) {
            return Err(self.rejected(Transition::AdvanceRound));
        }
        self.round += 1;
        Ok(self.round)
    }

    fn finish(&mut self, now: Timestamp) -> ElectionResult<()> {
        if self.status != OfficeStatus::Active {
            return Err(self.rejected(Transition::Complete));
        }
        self.status = OfficeStatus::Completed;
        self.closed_at = Some(now);
        Ok(())
    }
}

fn election_office(
    t: &Tables,
    election: ElectionId,
    office: OfficeId,
) -> ElectionResult<&ElectionOffice> {
    t.election_offices
        .get(&(election, office))
        .context(NotFoundSnafu {
            entity: Entity::Office,
            id: office.0,
        })
}

fn election_office_mut(
    t: &mut Tables,
    election: ElectionId,
    office: OfficeId,
) -> ElectionResult<&mut ElectionOffice> {
    t.election_offices
        .get_mut(&(election, office))
        .context(NotFoundSnafu {
            entity: Entity::Office,
            id: office.0,
        })
}

/// The office of the election currently being voted on.
pub(crate) fn active_office(t: &Tables, election: ElectionId) -> Option<OfficeId> {
    let mut active = t
        .election_offices_of(election)
        .filter(|eo| eo.status == OfficeStatus::Active);
    let res = active.next().map(|eo| eo.office);
    debug_assert!(
        active.next().is_none(),
        "more than one active office in election {}",
        election
    );
    res
}

/// The first pending office in voting order.
pub(crate) fn next_pending(t: &Tables, election: ElectionId) -> ElectionResult<OfficeId> {
    t.election_offices_of(election)
        .filter(|eo| eo.status == OfficeStatus::Pending)
        .min_by_key(|eo| eo.order_index)
        .map(|eo| eo.office)
        .context(NoPendingOfficeSnafu { election })
}

/// Opens a pending office: clears any stale ballots, freezes the attendance roll and starts
/// round 1.
pub(crate) fn open(
    t: &mut Tables,
    rules: &ElectionRules,
    election: ElectionId,
    office: OfficeId,
    now: Timestamp,
) -> ElectionResult<ElectionOffice> {
    let eo = election_office(t, election, office)?;
    if let Some(active) = active_office(t, election) {
        ensure!(
            active == office,
            OfficeAlreadyOpenElsewhereSnafu {
                election,
                requested: office,
                active
            }
        );
    }
    if eo.status != OfficeStatus::Pending {
        return Err(eo.rejected(Transition::Open));
    }
    let frozen = t.office_attendance.contains_key(&(election, office));
    ensure!(
        frozen || attendance::present_count(t, AttendanceScope::Election(election)) > 0,
        EmptyQuorumSnafu { election, office }
    );

    let stale = t.delete_ballots(|b| b.election == election && b.office == office);
    if stale > 0 {
        warn!(
            "open: election {} office {}: cleared {} stale ballot(s)",
            election, office, stale
        );
    }
    attendance::snapshot_for_office(t, election, office, now);
    let eo = election_office_mut(t, election, office)?;
    eo.begin(now)?;
    let opened = eo.clone();
    info!(
        "open: election {} office {} is open for round {} (quorum {}, threshold {})",
        election,
        office,
        opened.round,
        attendance::present_count(t, AttendanceScope::Office(election, office)),
        tally::majority_threshold(
            rules,
            opened.round,
            attendance::present_count(t, AttendanceScope::Office(election, office))
        )
    );
    Ok(opened)
}

/// Moves an active office to its next round.
///
/// Entering the final round prunes the candidates down to the `runoff_size` best of the round
/// that just ended, and deletes every ballot that referenced a pruned candidate.
pub(crate) fn advance_round(
    t: &mut Tables,
    rules: &ElectionRules,
    election: ElectionId,
    office: OfficeId,
    now: Timestamp,
) -> ElectionResult<Round> {
    let eo = election_office_mut(t, election, office)?;
    let previous = eo.round;
    let round = eo.next_round(rules)?;

    if rules.is_final_round(round) {
        let last = tally::tally_round(t, rules, election, office, previous);
        let survivors: BTreeSet<CandidateId> = last
            .counts
            .iter()
            .take(rules.runoff_size)
            .map(|(cid, _)| *cid)
            .collect();
        let pruned: Vec<CandidateId> = last
            .counts
            .iter()
            .map(|(cid, _)| *cid)
            .filter(|cid| !survivors.contains(cid))
            .collect();
        let deleted_ballots = t.delete_ballots(|b| {
            b.election == election && b.office == office && !survivors.contains(&b.candidate)
        });
        t.delete_candidacies(|c| {
            c.election == election && c.office == office && !survivors.contains(&c.id)
        });
        debug!(
            "advance_round: survivors {:?} pruned {:?} ({} ballot(s) deleted)",
            survivors, pruned, deleted_ballots
        );
        if !pruned.is_empty() {
            t.audit(
                now,
                election,
                Some(office),
                format!(
                    "entering round {}: pruned candidate(s) {:?} and {} ballot(s)",
                    round, pruned, deleted_ballots
                ),
            );
        }
    }
    info!(
        "advance_round: election {} office {} is now in round {}",
        election, office, round
    );
    Ok(round)
}

/// Captures the counts of the deciding round of an office.
fn archive(
    t: &mut Tables,
    rules: &ElectionRules,
    election: ElectionId,
    office: OfficeId,
    round: Round,
) {
    let tally = tally::tally_round(t, rules, election, office, round);
    let rows: Vec<ArchivedTally> = tally
        .counts
        .iter()
        .filter_map(|(cid, votes)| {
            t.candidacies.get(cid).map(|c| ArchivedTally {
                candidate: c.id,
                member: c.member,
                full_name: c.full_name.clone(),
                avatar_key: avatar_key(&c.email),
                round,
                votes: *votes,
            })
        })
        .collect();
    t.archived_tallies.insert((election, office), rows);
}

/// Records the winner of an office, at its current round, and completes it.
#[allow(clippy::too_many_arguments)]
pub(crate) fn set_winner(
    t: &mut Tables,
    rules: &ElectionRules,
    election: ElectionId,
    office: OfficeId,
    candidate: CandidateId,
    round: Round,
    decision: Decision,
    now: Timestamp,
) -> ElectionResult<WinnerRecord> {
    let eo = election_office(t, election, office)?;
    if eo.status != OfficeStatus::Active
        || t.winners.contains_key(&(election, office))
        || round != eo.round
    {
        return Err(eo.rejected(Transition::SetWinner));
    }
    let member = t
        .candidacies
        .get(&candidate)
        .filter(|c| c.election == election && c.office == office)
        .map(|c| c.member)
        .context(NotFoundSnafu {
            entity: Entity::Candidate,
            id: candidate.0,
        })?;

    archive(t, rules, election, office, round);
    let record = WinnerRecord {
        election,
        office,
        candidate,
        member,
        round,
        decision,
    };
    t.winners.insert((election, office), record.clone());
    election_office_mut(t, election, office)?.finish(now)?;
    if decision == Decision::Adjudicated {
        t.audit(
            now,
            election,
            Some(office),
            format!("winner set by an administrator: candidate {} at round {}", candidate, round),
        );
    }
    info!(
        "set_winner: election {} office {}: candidate {} (member {}) won at round {} by {}",
        election, office, candidate, member, round, decision
    );
    Ok(record)
}

/// Evaluates the current round of an office and records the winner it decides, if any.
pub(crate) fn check_winner(
    t: &mut Tables,
    rules: &ElectionRules,
    election: ElectionId,
    office: OfficeId,
    now: Timestamp,
) -> ElectionResult<Tally> {
    let round = election_office(t, election, office)?.round;
    let tally = tally::tally_round(t, rules, election, office, round);
    debug!(
        "check_winner: election {} office {} round {}: {:?}",
        election, office, round, tally.outcome
    );
    match tally.outcome {
        Outcome::Elected {
            candidate,
            decision,
        } => {
            set_winner(t, rules, election, office, candidate, round, decision, now)?;
        }
        Outcome::NeedsNextScrutiny => {
            info!(
                "check_winner: election {} office {}: no majority in round {}, next scrutiny needed",
                election, office, round
            );
        }
        Outcome::Tied { ref candidates } => {
            warn!(
                "check_winner: election {} office {}: tie between {:?} in round {}, awaiting an administrator",
                election, office, candidates, round
            );
        }
        Outcome::AwaitingTurnout => {}
    }
    Ok(tally)
}

/// Completes an active office without a winner.
pub(crate) fn force_complete(
    t: &mut Tables,
    rules: &ElectionRules,
    election: ElectionId,
    office: OfficeId,
    reason: &str,
    now: Timestamp,
) -> ElectionResult<()> {
    let eo = election_office_mut(t, election, office)?;
    eo.finish(now)?;
    let round = eo.round;
    archive(t, rules, election, office, round);
    warn!(
        "force_complete: election {} office {} completed without a winner at round {}: {}",
        election, office, round, reason
    );
    t.audit(
        now,
        election,
        Some(office),
        format!("force-completed at round {}: {}", round, reason),
    );
    Ok(())
}

/// Opens the next pending office, completing the active one first.
///
/// Returns `None`, and changes nothing, when no pending office remains.
pub(crate) fn open_next(
    t: &mut Tables,
    rules: &ElectionRules,
    election: ElectionId,
    now: Timestamp,
) -> ElectionResult<Option<ElectionOffice>> {
    let next = match next_pending(t, election) {
        Ok(office) => office,
        Err(ElectionError::NoPendingOffice { .. }) => {
            info!("open_next: election {}: every office is resolved", election);
            return Ok(None);
        }
        Err(e) => return Err(e),
    };
    if let Some(active) = active_office(t, election) {
        force_complete(t, rules, election, active, "superseded by the next office", now)?;
    }
    open(t, rules, election, next, now).map(Some)
}

/// Completes every unresolved office of an election being closed, pending ones included.
pub(crate) fn close_all(
    t: &mut Tables,
    rules: &ElectionRules,
    election: ElectionId,
    now: Timestamp,
) -> ElectionResult<usize> {
    if let Some(active) = active_office(t, election) {
        force_complete(t, rules, election, active, "election closed", now)?;
    }
    let pending: Vec<OfficeId> = t
        .election_offices_of(election)
        .filter(|eo| eo.status == OfficeStatus::Pending)
        .map(|eo| eo.office)
        .collect();
    for office in pending.iter() {
        let eo = election_office_mut(t, election, *office)?;
        eo.status = OfficeStatus::Completed;
        eo.closed_at = Some(now);
        t.audit(
            now,
            election,
            Some(*office),
            "closed before it was voted on".to_string(),
        );
    }
    Ok(pending.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidacy;
    use crate::lifecycle;

    const RULES: ElectionRules = ElectionRules::DEFAULT_RULES;

    struct Fixture {
        t: Tables,
        election: ElectionId,
        offices: Vec<OfficeId>,
        members: Vec<MemberId>,
    }

    fn fixture(present: usize) -> Fixture {
        let names: Vec<String> = DEFAULT_OFFICES.iter().map(|s| s.to_string()).collect();
        let mut t = Tables::new(&names);
        let mut members = Vec::new();
        for i in 0..present {
            let id = MemberId(t.next_id());
            t.members.insert(
                id,
                Member {
                    id,
                    full_name: format!("Member {}", i),
                    email: format!("m{}@example.org", i),
                    role: Role::Member,
                },
            );
            members.push(id);
        }
        let election = lifecycle::create(&mut t, "Assembly", Timestamp::EPOCH).id;
        for m in members.iter() {
            attendance::mark_present(&mut t, election, *m, true, Timestamp::EPOCH).unwrap();
        }
        let offices = t.offices.iter().map(|o| o.id).collect();
        Fixture {
            t,
            election,
            offices,
            members,
        }
    }

    fn vote(f: &mut Fixture, voters: &[MemberId], candidate: CandidateId) {
        let office = active_office(&f.t, f.election).unwrap();
        let round = election_office(&f.t, f.election, office).unwrap().round;
        for v in voters {
            f.t.insert_ballot(Ballot {
                voter: *v,
                candidate,
                office,
                election: f.election,
                round,
                cast_at: Timestamp::EPOCH,
            })
            .unwrap();
        }
    }

    fn status(f: &Fixture, office: OfficeId) -> OfficeStatus {
        election_office(&f.t, f.election, office).unwrap().status
    }

    #[test]
    fn only_one_office_open_at_a_time() {
        let mut f = fixture(3);
        open(&mut f.t, &RULES, f.election, f.offices[0], Timestamp::EPOCH).unwrap();
        let r = open(&mut f.t, &RULES, f.election, f.offices[1], Timestamp::EPOCH);
        assert_eq!(
            r.err(),
            Some(ElectionError::OfficeAlreadyOpenElsewhere {
                election: f.election,
                requested: f.offices[1],
                active: f.offices[0],
            })
        );
        let r = open(&mut f.t, &RULES, f.election, f.offices[0], Timestamp::EPOCH);
        assert_eq!(r.err().map(|e| e.kind()), Some(ErrorKind::InvalidTransition));
    }

    #[test]
    fn opening_needs_someone_present() {
        let mut f = fixture(0);
        let r = open(&mut f.t, &RULES, f.election, f.offices[0], Timestamp::EPOCH);
        assert_eq!(r.err().map(|e| e.kind()), Some(ErrorKind::EmptyQuorum));
        assert_eq!(status(&f, f.offices[0]), OfficeStatus::Pending);
    }

    #[test]
    fn rounds_stop_at_the_final_one() {
        let mut f = fixture(2);
        let o = f.offices[0];
        open(&mut f.t, &RULES, f.election, o, Timestamp::EPOCH).unwrap();
        assert_eq!(advance_round(&mut f.t, &RULES, f.election, o, Timestamp::EPOCH), Ok(2));
        assert_eq!(advance_round(&mut f.t, &RULES, f.election, o, Timestamp::EPOCH), Ok(3));
        let r = advance_round(&mut f.t, &RULES, f.election, o, Timestamp::EPOCH);
        assert_eq!(r.err().map(|e| e.kind()), Some(ErrorKind::InvalidTransition));
    }

    #[test]
    fn pending_office_cannot_advance() {
        let mut f = fixture(2);
        let r = advance_round(&mut f.t, &RULES, f.election, f.offices[1], Timestamp::EPOCH);
        assert_eq!(r.err().map(|e| e.kind()), Some(ErrorKind::InvalidTransition));
    }

    #[test]
    fn final_round_keeps_the_two_best() {
        let mut f = fixture(6);
        let o = f.offices[0];
        open(&mut f.t, &RULES, f.election, o, Timestamp::EPOCH).unwrap();
        let ms = f.members.clone();
        let cs: Vec<CandidateId> = ms[..3]
            .iter()
            .map(|m| candidacy::add_candidate(&mut f.t, f.election, o, *m).unwrap().id)
            .collect();
        advance_round(&mut f.t, &RULES, f.election, o, Timestamp::EPOCH).unwrap();
        vote(&mut f, &ms[0..1], cs[0]);
        vote(&mut f, &ms[1..3], cs[1]);
        vote(&mut f, &ms[3..6], cs[2]);
        advance_round(&mut f.t, &RULES, f.election, o, Timestamp::EPOCH).unwrap();

        let left: Vec<CandidateId> = f.t.candidacies_for(f.election, o).map(|c| c.id).collect();
        assert_eq!(left, vec![cs[1], cs[2]]);
        assert!(f.t.ballots.values().all(|b| b.candidate != cs[0]));
        assert_eq!(f.t.ballots.len(), 5);
        assert_eq!(f.t.audit.len(), 1);
    }

    #[test]
    fn open_next_walks_the_offices_in_order() {
        let mut f = fixture(1);
        for expected in f.offices.clone() {
            let opened = open_next(&mut f.t, &RULES, f.election, Timestamp::EPOCH).unwrap();
            assert_eq!(opened.map(|eo| eo.office), Some(expected));
        }
        let last = *f.offices.last().unwrap();
        assert_eq!(open_next(&mut f.t, &RULES, f.election, Timestamp::EPOCH), Ok(None));
        // Nothing left to open: the active office stays open.
        assert_eq!(status(&f, last), OfficeStatus::Active);
        assert_eq!(status(&f, f.offices[0]), OfficeStatus::Completed);
        assert!(f.t.winners.is_empty());
    }

    #[test]
    fn winner_completes_office() {
        let mut f = fixture(3);
        let o = f.offices[0];
        open(&mut f.t, &RULES, f.election, o, Timestamp::EPOCH).unwrap();
        let ms = f.members.clone();
        let c = candidacy::add_candidate(&mut f.t, f.election, o, ms[0]).unwrap().id;
        vote(&mut f, &ms[..2], c);
        let t = check_winner(&mut f.t, &RULES, f.election, o, Timestamp::EPOCH).unwrap();
        assert_eq!(t.outcome, Outcome::AwaitingTurnout);
        vote(&mut f, &ms[2..], c);
        let t = check_winner(&mut f.t, &RULES, f.election, o, Timestamp::EPOCH).unwrap();
        assert!(matches!(t.outcome, Outcome::Elected { .. }));
        assert_eq!(status(&f, o), OfficeStatus::Completed);
        assert_eq!(f.t.winners.get(&(f.election, o)).map(|w| w.round), Some(1));
        assert_eq!(
            f.t.archived_tallies.get(&(f.election, o)).map(|a| a[0].votes),
            Some(3)
        );
    }

    #[test]
    fn force_complete_only_active_office() {
        let mut f = fixture(1);
        let o = f.offices[0];
        let r = force_complete(&mut f.t, &RULES, f.election, o, "no quorum", Timestamp::EPOCH);
        assert_eq!(r.err().map(|e| e.kind()), Some(ErrorKind::InvalidTransition));
        open(&mut f.t, &RULES, f.election, o, Timestamp::EPOCH).unwrap();
        force_complete(&mut f.t, &RULES, f.election, o, "no quorum", Timestamp::EPOCH).unwrap();
        assert_eq!(status(&f, o), OfficeStatus::Completed);
        assert!(f.t.audit.iter().any(|a| a.message.contains("no quorum")));
    }

    #[test]
    fn adjudication_is_for_the_current_round() {
        let mut f = fixture(2);
        let o = f.offices[0];
        open(&mut f.t, &RULES, f.election, o, Timestamp::EPOCH).unwrap();
        let c = candidacy::add_candidate(&mut f.t, f.election, o, f.members[0])
            .unwrap()
            .id;
        advance_round(&mut f.t, &RULES, f.election, o, Timestamp::EPOCH).unwrap();
        for round in [0, 1, 3] {
            let r = set_winner(
                &mut f.t,
                &RULES,
                f.election,
                o,
                c,
                round,
                Decision::Adjudicated,
                Timestamp::EPOCH,
            );
            assert_eq!(r.err().map(|e| e.kind()), Some(ErrorKind::InvalidTransition));
        }
        assert_eq!(status(&f, o), OfficeStatus::Active);
        let w = set_winner(
            &mut f.t,
            &RULES,
            f.election,
            o,
            c,
            2,
            Decision::Adjudicated,
            Timestamp::EPOCH,
        )
        .unwrap();
        assert_eq!(w.round, 2);
        assert_eq!(status(&f, o), OfficeStatus::Completed);
    }
}
