//! Creation, closing and archival of elections.

use log::info;
use snafu::{ensure, OptionExt};

use crate::config::*;
use crate::error::*;
use crate::position;
use crate::store::Tables;

pub(crate) fn election(t: &Tables, election: ElectionId) -> ElectionResult<&Election> {
    t.elections.get(&election).context(NotFoundSnafu {
        entity: Entity::Election,
        id: election.0,
    })
}

/// Checks that the election exists and still accepts changes.
pub(crate) fn ensure_open(t: &Tables, election: ElectionId) -> ElectionResult<()> {
    let e = self::election(t, election)?;
    ensure!(!e.finalized, ElectionArchivedSnafu { election });
    ensure!(e.is_active, ElectionClosedSnafu { election });
    Ok(())
}

/// Starts a new election. Any other active election is deactivated, and every office is
/// seeded as pending in canonical order.
pub(crate) fn create(t: &mut Tables, name: &str, now: Timestamp) -> Election {
    for e in t.elections.values_mut().filter(|e| e.is_active) {
        info!("create: deactivating election {} ({})", e.id, e.name);
        e.is_active = false;
    }
    let id = ElectionId(t.next_id());
    let election = Election {
        id,
        name: name.to_string(),
        is_active: true,
        created_at: now,
        closed_at: None,
        finalized: false,
    };
    t.elections.insert(id, election.clone());
    let seeded: Vec<ElectionOffice> = t
        .offices
        .iter()
        .enumerate()
        .map(|(order_index, o)| ElectionOffice {
            election: id,
            office: o.id,
            order_index,
            status: OfficeStatus::Pending,
            round: 1,
            opened_at: None,
            closed_at: None,
        })
        .collect();
    for eo in seeded {
        t.election_offices.insert((id, eo.office), eo);
    }
    info!(
        "create: election {} ({}) with {} office(s)",
        id,
        name,
        t.offices.len()
    );
    election
}

/// Deactivates an election and completes every office that is not completed yet.
///
/// An election a newer one already deactivated can still be closed this way, which is the
/// only way to resolve an office it left active.
pub(crate) fn close(
    t: &mut Tables,
    rules: &ElectionRules,
    election: ElectionId,
    now: Timestamp,
) -> ElectionResult<()> {
    let e = self::election(t, election)?;
    ensure!(!e.finalized, ElectionArchivedSnafu { election });
    let unresolved = position::close_all(t, rules, election, now)?;
    if let Some(e) = t.elections.get_mut(&election) {
        e.is_active = false;
        e.closed_at = Some(now);
    }
    info!(
        "close: election {} closed ({} office(s) never voted on)",
        election, unresolved
    );
    Ok(())
}

/// Archives a fully decided election.
///
/// Candidacies and ballots of the election are deleted. Winner records and the tallies
/// captured when each office completed are kept, and results are served from them from then
/// on.
pub(crate) fn finalize(t: &mut Tables, election: ElectionId, now: Timestamp) -> ElectionResult<()> {
    let e = self::election(t, election)?;
    ensure!(!e.finalized, ElectionArchivedSnafu { election });
    let unresolved = t
        .election_offices_of(election)
        .filter(|eo| eo.status != OfficeStatus::Completed)
        .count();
    ensure!(
        unresolved == 0,
        IncompleteElectionSnafu {
            election,
            unresolved
        }
    );

    let ballots = t.delete_ballots(|b| b.election == election);
    let candidacies = t.delete_candidacies(|c| c.election == election);
    if let Some(e) = t.elections.get_mut(&election) {
        e.is_active = false;
        e.finalized = true;
        e.closed_at = Some(now);
    }
    info!(
        "finalize: election {} archived ({} ballot(s), {} candidacy(ies) purged)",
        election, ballots, candidacies
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables() -> Tables {
        let names: Vec<String> = DEFAULT_OFFICES.iter().map(|s| s.to_string()).collect();
        Tables::new(&names)
    }

    #[test]
    fn only_the_newest_election_is_active() {
        let mut t = tables();
        let first = create(&mut t, "2025", Timestamp::new(1)).id;
        let second = create(&mut t, "2026", Timestamp::new(2)).id;
        assert!(!t.elections[&first].is_active);
        assert!(t.elections[&second].is_active);
        assert_eq!(t.election_offices_of(second).count(), DEFAULT_OFFICES.len());
        assert!(t
            .election_offices_of(second)
            .all(|eo| eo.status == OfficeStatus::Pending));
    }

    #[test]
    fn finalize_requires_every_office_completed() {
        let mut t = tables();
        let e = create(&mut t, "2026", Timestamp::EPOCH).id;
        let before = t.clone();
        let r = finalize(&mut t, e, Timestamp::EPOCH);
        assert_eq!(
            r,
            Err(ElectionError::IncompleteElection {
                election: e,
                unresolved: DEFAULT_OFFICES.len()
            })
        );
        assert_eq!(t, before);
    }

    #[test]
    fn close_then_finalize() {
        let mut t = tables();
        let e = create(&mut t, "2026", Timestamp::EPOCH).id;
        close(&mut t, &ElectionRules::DEFAULT_RULES, e, Timestamp::new(9)).unwrap();
        assert_eq!(
            ensure_open(&t, e),
            Err(ElectionError::ElectionClosed { election: e })
        );
        finalize(&mut t, e, Timestamp::new(10)).unwrap();
        assert!(t.elections[&e].finalized);
        assert_eq!(t.elections[&e].closed_at, Some(Timestamp::new(10)));
        assert_eq!(
            finalize(&mut t, e, Timestamp::new(11)),
            Err(ElectionError::ElectionArchived { election: e })
        );
        assert_eq!(
            close(&mut t, &ElectionRules::DEFAULT_RULES, e, Timestamp::new(12)),
            Err(ElectionError::ElectionArchived { election: e })
        );
    }
}
