//! The ballot box.

use log::{debug, info, warn};
use snafu::ensure;

use crate::attendance;
use crate::config::*;
use crate::error::*;
use crate::position;
use crate::store::{BallotKey, StoreError, Tables};
use crate::tally::Tally;

/// A ballot accepted by the box, and the evaluation of its round right after it.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CastReceipt {
    pub ballot: Ballot,
    pub tally: Tally,
}

/// Casts one ballot for the active office.
///
/// The round is always the current round of the office, read inside the same transaction as
/// the insert. The round is evaluated before this returns: if the ballot completes the turnout
/// and decides a winner, the office is completed by the time the caller sees the receipt.
pub(crate) fn cast(
    t: &mut Tables,
    rules: &ElectionRules,
    voter: MemberId,
    candidate: CandidateId,
    office: OfficeId,
    election: ElectionId,
    now: Timestamp,
) -> ElectionResult<CastReceipt> {
    ensure!(
        position::active_office(t, election) == Some(office),
        OfficeNotOpenSnafu { election, office }
    );
    let round = t
        .election_offices
        .get(&(election, office))
        .map(|eo| eo.round)
        .unwrap_or(1);
    ensure!(
        attendance::present_for_office(t, election, office, voter),
        NotPresentSnafu {
            election,
            office,
            member: voter
        }
    );
    let standing = t
        .candidacies
        .get(&candidate)
        .map(|c| c.election == election && c.office == office)
        .unwrap_or(false);
    ensure!(
        standing,
        NotFoundSnafu {
            entity: Entity::Candidate,
            id: candidate.0
        }
    );
    let key = BallotKey {
        election,
        office,
        round,
        voter,
    };
    ensure!(
        !t.has_ballot(&key),
        DuplicateVoteSnafu {
            election,
            office,
            voter,
            round
        }
    );

    let ballot = Ballot {
        voter,
        candidate,
        office,
        election,
        round,
        cast_at: now,
    };
    t.insert_ballot(ballot.clone()).map_err(|e| match e {
        StoreError::UniqueViolation { constraint } => {
            warn!("cast: storage rejected the ballot: {}", constraint);
            DuplicateVoteSnafu {
                election,
                office,
                voter,
                round,
            }
            .build()
        }
    })?;
    debug!(
        "cast: election {} office {} round {}: ballot from {}",
        election, office, round, voter
    );

    let tally = position::check_winner(t, rules, election, office, now)?;
    info!(
        "cast: election {} office {} round {}: {}/{} voted",
        election, office, round, tally.votes_in, tally.quorum
    );
    Ok(CastReceipt { ballot, tally })
}
