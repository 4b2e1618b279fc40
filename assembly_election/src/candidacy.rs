//! The candidacy registry.

use log::{info, warn};
use snafu::{ensure, OptionExt};

use crate::attendance;
use crate::config::*;
use crate::error::*;
use crate::position;
use crate::store::{StoreError, Tables};

/// Binds a member to the office currently being voted on.
///
/// Preconditions are checked in this order, the first failure wins: the office is the active
/// office of the election, the member is not an administrator, the member is in the frozen
/// roll of the office, the member has not already won an office of this election, and the
/// member is not already a candidate for this office.
pub(crate) fn add_candidate(
    t: &mut Tables,
    election: ElectionId,
    office: OfficeId,
    member: MemberId,
) -> ElectionResult<Candidacy> {
    ensure!(
        t.office(office).is_some(),
        NotFoundSnafu {
            entity: Entity::Office,
            id: office.0
        }
    );
    let m = t.members.get(&member).cloned().context(NotFoundSnafu {
        entity: Entity::Member,
        id: member.0,
    })?;

    ensure!(
        position::active_office(t, election) == Some(office),
        OfficeNotOpenSnafu { election, office }
    );
    ensure!(m.role == Role::Member, IneligibleRoleSnafu { member });
    ensure!(
        attendance::present_for_office(t, election, office, member),
        NotPresentSnafu {
            election,
            office,
            member
        }
    );
    let already_elected = t
        .winners
        .values()
        .any(|w| w.election == election && w.member == member);
    ensure!(!already_elected, AlreadyElectedSnafu { election, member });
    let duplicate = t
        .candidacies_for(election, office)
        .any(|c| c.member == member);
    ensure!(
        !duplicate,
        DuplicateCandidacySnafu {
            election,
            office,
            member
        }
    );

    let candidacy = Candidacy {
        id: CandidateId(t.next_id()),
        member,
        office,
        election,
        full_name: m.full_name,
        email: m.email,
    };
    t.insert_candidacy(candidacy.clone())
        .map_err(|e| match e {
            StoreError::UniqueViolation { constraint } => {
                warn!("add_candidate: storage rejected the candidacy: {}", constraint);
                DuplicateCandidacySnafu {
                    election,
                    office,
                    member,
                }
                .build()
            }
        })?;
    info!(
        "add_candidate: election {} office {}: member {} is candidate {}",
        election, office, member, candidacy.id
    );
    Ok(candidacy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle;

    struct Fixture {
        t: Tables,
        election: ElectionId,
        offices: Vec<OfficeId>,
        members: Vec<MemberId>,
    }

    fn fixture() -> Fixture {
        let mut t = Tables::new(&["President".to_string(), "Treasurer".to_string()]);
        let mut members = Vec::new();
        for (name, role) in [
            ("Ana", Role::Member),
            ("Bruno", Role::Member),
            ("Carla", Role::Administrator),
            ("Davi", Role::Member),
        ] {
            let id = MemberId(t.next_id());
            t.members.insert(
                id,
                Member {
                    id,
                    full_name: name.to_string(),
                    email: format!("{}@example.org", name.to_lowercase()),
                    role,
                },
            );
            members.push(id);
        }
        let election = lifecycle::create(&mut t, "Assembly", Timestamp::EPOCH).id;
        for m in members.iter().take(3) {
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

    fn open_first(f: &mut Fixture) {
        position::open(
            &mut f.t,
            &ElectionRules::DEFAULT_RULES,
            f.election,
            f.offices[0],
            Timestamp::EPOCH,
        )
        .unwrap();
    }

    fn kind(r: ElectionResult<Candidacy>) -> Option<ErrorKind> {
        r.err().map(|e| e.kind())
    }

    #[test]
    fn office_must_be_open() {
        let mut f = fixture();
        let r = add_candidate(&mut f.t, f.election, f.offices[0], f.members[0]);
        assert_eq!(kind(r), Some(ErrorKind::OfficeNotOpen));
        open_first(&mut f);
        let r = add_candidate(&mut f.t, f.election, f.offices[1], f.members[0]);
        assert_eq!(kind(r), Some(ErrorKind::OfficeNotOpen));
    }

    #[test]
    fn administrators_cannot_stand() {
        let mut f = fixture();
        open_first(&mut f);
        let r = add_candidate(&mut f.t, f.election, f.offices[0], f.members[2]);
        assert_eq!(kind(r), Some(ErrorKind::IneligibleRole));
    }

    #[test]
    fn absent_member_cannot_stand_even_if_marked_later() {
        let mut f = fixture();
        open_first(&mut f);
        let davi = f.members[3];
        attendance::mark_present(&mut f.t, f.election, davi, true, Timestamp::EPOCH).unwrap();
        let r = add_candidate(&mut f.t, f.election, f.offices[0], davi);
        assert_eq!(kind(r), Some(ErrorKind::NotPresent));
    }

    #[test]
    fn duplicate_candidacy() {
        let mut f = fixture();
        open_first(&mut f);
        let c = add_candidate(&mut f.t, f.election, f.offices[0], f.members[0]).unwrap();
        assert_eq!(c.full_name, "Ana");
        let r = add_candidate(&mut f.t, f.election, f.offices[0], f.members[0]);
        assert_eq!(kind(r), Some(ErrorKind::DuplicateCandidacy));
    }

    #[test]
    fn winner_cannot_stand_again() {
        let mut f = fixture();
        open_first(&mut f);
        let c = add_candidate(&mut f.t, f.election, f.offices[0], f.members[0]).unwrap();
        position::set_winner(
            &mut f.t,
            &ElectionRules::DEFAULT_RULES,
            f.election,
            f.offices[0],
            c.id,
            1,
            Decision::Adjudicated,
            Timestamp::EPOCH,
        )
        .unwrap();
        position::open(
            &mut f.t,
            &ElectionRules::DEFAULT_RULES,
            f.election,
            f.offices[1],
            Timestamp::EPOCH,
        )
        .unwrap();
        let r = add_candidate(&mut f.t, f.election, f.offices[1], f.members[0]);
        assert_eq!(kind(r), Some(ErrorKind::AlreadyElected));
        assert!(add_candidate(&mut f.t, f.election, f.offices[1], f.members[1]).is_ok());
    }
}
