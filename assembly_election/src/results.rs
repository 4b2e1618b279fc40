//! Read-only views for the presentation boundary.
//!
//! Active offices are reported from the live ballots of their current round. Completed offices
//! are reported from the tally captured when they completed, which is what remains once an
//! election is finalized.

use crate::attendance;
use crate::config::*;
use crate::error::*;
use crate::lifecycle;
use crate::position;
use crate::store::Tables;
use crate::tally;

fn office_name(t: &Tables, office: OfficeId) -> String {
    t.office(office).map(|o| o.name.clone()).unwrap_or_default()
}

fn office_result(t: &Tables, rules: &ElectionRules, eo: &ElectionOffice) -> OfficeResult {
    let quorum = attendance::present_count(t, AttendanceScope::Office(eo.election, eo.office));
    let winner = t.winners.get(&(eo.election, eo.office));
    let mut res = OfficeResult {
        office: eo.office,
        office_name: office_name(t, eo.office),
        status: eo.status,
        round: eo.round,
        quorum,
        threshold: tally::majority_threshold(rules, eo.round, quorum),
        undecided: false,
        needs_next_scrutiny: false,
        winner: winner.map(|w| w.candidate),
        won_at_round: winner.map(|w| w.round),
        candidates: Vec::new(),
    };

    match eo.status {
        OfficeStatus::Pending => {}
        OfficeStatus::Active => {
            let live = tally::tally_round(t, rules, eo.election, eo.office, eo.round);
            res.undecided = live.outcome.is_undecided();
            res.needs_next_scrutiny = live.outcome == tally::Outcome::NeedsNextScrutiny;
            for (cid, votes) in live.counts.iter() {
                if let Some(c) = t.candidacies.get(cid) {
                    res.candidates.push(CandidateResult {
                        candidate: c.id,
                        member: c.member,
                        name: c.full_name.clone(),
                        avatar_key: avatar_key(&c.email),
                        votes: *votes,
                        elected: false,
                    });
                }
            }
        }
        OfficeStatus::Completed => {
            if let Some(rows) = t.archived_tallies.get(&(eo.election, eo.office)) {
                for row in rows.iter() {
                    res.candidates.push(CandidateResult {
                        candidate: row.candidate,
                        member: row.member,
                        name: row.full_name.clone(),
                        avatar_key: row.avatar_key.clone(),
                        votes: row.votes,
                        elected: res.winner == Some(row.candidate),
                    });
                }
            }
        }
    }
    res
}

pub(crate) fn election_results(
    t: &Tables,
    rules: &ElectionRules,
    election: ElectionId,
) -> ElectionResult<ElectionResults> {
    let e = lifecycle::election(t, election)?;
    let mut eos: Vec<&ElectionOffice> = t.election_offices_of(election).collect();
    eos.sort_by_key(|eo| eo.order_index);
    let current_round = position::active_office(t, election)
        .and_then(|office| t.election_offices.get(&(election, office)))
        .map(|eo| eo.round);
    Ok(ElectionResults {
        election,
        election_name: e.name.clone(),
        is_active: e.is_active,
        finalized: e.finalized,
        current_round,
        offices: eos
            .into_iter()
            .map(|eo| office_result(t, rules, eo))
            .collect(),
    })
}

/// The most recently created election.
pub(crate) fn latest_election(t: &Tables) -> Option<ElectionId> {
    t.elections
        .values()
        .max_by_key(|e| (e.created_at, e.id))
        .map(|e| e.id)
}

pub(crate) fn winners(t: &Tables, election: ElectionId) -> ElectionResult<Vec<WinnerSummary>> {
    lifecycle::election(t, election)?;
    let mut res: Vec<(usize, WinnerSummary)> = Vec::new();
    for w in t.winners.values().filter(|w| w.election == election) {
        let archived = t
            .archived_tallies
            .get(&(election, w.office))
            .and_then(|rows| rows.iter().find(|r| r.candidate == w.candidate));
        let order = t
            .election_offices
            .get(&(election, w.office))
            .map(|eo| eo.order_index)
            .unwrap_or(usize::MAX);
        let (name, avatar, votes) = match archived {
            Some(r) => (r.full_name.clone(), r.avatar_key.clone(), r.votes),
            None => match t.members.get(&w.member) {
                Some(m) => (m.full_name.clone(), avatar_key(&m.email), 0),
                None => (String::new(), String::new(), 0),
            },
        };
        res.push((
            order,
            WinnerSummary {
                office: w.office,
                office_name: office_name(t, w.office),
                candidate: w.candidate,
                member: w.member,
                name,
                avatar_key: avatar,
                votes,
                round: w.round,
                decision: w.decision,
            },
        ));
    }
    res.sort_by_key(|(order, _)| *order);
    Ok(res.into_iter().map(|(_, w)| w).collect())
}

/// Every election, newest first, with its winners.
pub(crate) fn history(t: &Tables) -> Vec<ElectionSummary> {
    let mut elections: Vec<&Election> = t.elections.values().collect();
    elections.sort_by_key(|e| std::cmp::Reverse((e.created_at, e.id)));
    elections
        .into_iter()
        .map(|e| ElectionSummary {
            election: e.clone(),
            winners: winners(t, e.id).unwrap_or_default(),
        })
        .collect()
}
