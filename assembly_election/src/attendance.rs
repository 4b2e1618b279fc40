//! The attendance ledger.
//!
//! Attendance is recorded once per election in a live roll. When an office opens, the members
//! present at that moment are copied into a frozen roll for that office: its size is the quorum
//! of every round of the office, whatever happens to the live roll afterwards.

use log::{debug, info};
use snafu::ensure;

use crate::config::*;
use crate::error::*;
use crate::store::{FrozenAttendance, Tables};

/// Marks a member present or absent in the live roll of an election. Idempotent.
pub(crate) fn mark_present(
    t: &mut Tables,
    election: ElectionId,
    member: MemberId,
    present: bool,
    now: Timestamp,
) -> ElectionResult<()> {
    ensure!(
        t.members.contains_key(&member),
        NotFoundSnafu {
            entity: Entity::Member,
            id: member.0
        }
    );
    debug!(
        "mark_present: election {} member {} present {}",
        election, member, present
    );
    let rec = t
        .attendance
        .entry((election, member))
        .or_insert(AttendanceRecord {
            election,
            member,
            present,
            marked_at: now,
        });
    if rec.present != present {
        rec.present = present;
        rec.marked_at = now;
    }
    Ok(())
}

/// Seeds an absent record for every ordinary member without one. Returns how many were added.
pub(crate) fn initialize(t: &mut Tables, election: ElectionId, now: Timestamp) -> usize {
    let missing: Vec<MemberId> = t
        .members
        .values()
        .filter(|m| m.role == Role::Member)
        .filter(|m| !t.attendance.contains_key(&(election, m.id)))
        .map(|m| m.id)
        .collect();
    for member in missing.iter() {
        t.attendance.insert(
            (election, *member),
            AttendanceRecord {
                election,
                member: *member,
                present: false,
                marked_at: now,
            },
        );
    }
    info!(
        "initialize attendance: election {}: {} new record(s)",
        election,
        missing.len()
    );
    missing.len()
}

/// Freezes the live roll for an office.
///
/// A snapshot is taken at most once per office: calling this again leaves the first snapshot
/// untouched and returns false.
pub(crate) fn snapshot_for_office(
    t: &mut Tables,
    election: ElectionId,
    office: OfficeId,
    now: Timestamp,
) -> bool {
    if t.office_attendance.contains_key(&(election, office)) {
        debug!(
            "snapshot_for_office: election {} office {} already frozen",
            election, office
        );
        return false;
    }
    let members = t
        .attendance
        .values()
        .filter(|r| r.election == election && r.present)
        .map(|r| r.member)
        .collect();
    let frozen = FrozenAttendance {
        taken_at: now,
        members,
    };
    info!(
        "snapshot_for_office: election {} office {}: quorum {}",
        election,
        office,
        frozen.members.len()
    );
    t.office_attendance.insert((election, office), frozen);
    true
}

pub(crate) fn present_count(t: &Tables, scope: AttendanceScope) -> u64 {
    match scope {
        AttendanceScope::Election(election) => t
            .attendance
            .values()
            .filter(|r| r.election == election && r.present)
            .count() as u64,
        AttendanceScope::Office(election, office) => t
            .office_attendance
            .get(&(election, office))
            .map(|f| f.members.len() as u64)
            .unwrap_or(0),
    }
}

/// Whether the member is in the frozen roll of the office.
pub(crate) fn present_for_office(
    t: &Tables,
    election: ElectionId,
    office: OfficeId,
    member: MemberId,
) -> bool {
    t.office_attendance
        .get(&(election, office))
        .map(|f| f.members.contains(&member))
        .unwrap_or(false)
}

/// The live roll, joined with the roster.
pub(crate) fn entries(t: &Tables, election: ElectionId) -> Vec<AttendanceEntry> {
    t.attendance
        .range((election, MemberId(0))..=(election, MemberId(u64::MAX)))
        .filter_map(|(_, r)| {
            t.members.get(&r.member).map(|m| AttendanceEntry {
                member: m.id,
                full_name: m.full_name.clone(),
                email: m.email.clone(),
                present: r.present,
                marked_at: r.marked_at,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables_with_members(n: u64) -> Tables {
        let mut t = Tables::new(&["President".to_string()]);
        for i in 1..=n {
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
        }
        t
    }

    #[test]
    fn snapshot_is_taken_once() {
        let mut t = tables_with_members(3);
        let e = ElectionId(100);
        let o = t.offices[0].id;
        let ids: Vec<MemberId> = t.members.keys().cloned().collect();
        mark_present(&mut t, e, ids[0], true, Timestamp::new(1)).unwrap();
        mark_present(&mut t, e, ids[1], true, Timestamp::new(1)).unwrap();

        assert!(snapshot_for_office(&mut t, e, o, Timestamp::new(2)));
        let first = t.office_attendance.get(&(e, o)).cloned();

        mark_present(&mut t, e, ids[2], true, Timestamp::new(3)).unwrap();
        assert!(!snapshot_for_office(&mut t, e, o, Timestamp::new(4)));
        assert_eq!(t.office_attendance.get(&(e, o)).cloned(), first);

        assert_eq!(present_count(&t, AttendanceScope::Office(e, o)), 2);
        assert_eq!(present_count(&t, AttendanceScope::Election(e)), 3);
        assert!(!present_for_office(&t, e, o, ids[2]));
    }

    #[test]
    fn marking_is_idempotent() {
        let mut t = tables_with_members(1);
        let e = ElectionId(100);
        let m = *t.members.keys().next().unwrap();
        mark_present(&mut t, e, m, true, Timestamp::new(1)).unwrap();
        mark_present(&mut t, e, m, true, Timestamp::new(5)).unwrap();
        let rec = t.attendance.get(&(e, m)).unwrap();
        assert!(rec.present);
        assert_eq!(rec.marked_at, Timestamp::new(1));
        assert_eq!(present_count(&t, AttendanceScope::Election(e)), 1);
    }

    #[test]
    fn unknown_member_is_rejected() {
        let mut t = tables_with_members(0);
        let res = mark_present(&mut t, ElectionId(1), MemberId(42), true, Timestamp::EPOCH);
        assert_eq!(res.map_err(|e| e.kind()), Err(ErrorKind::NotFound));
    }

    #[test]
    fn initialize_seeds_absent_members() {
        let mut t = tables_with_members(3);
        let e = ElectionId(100);
        let first = *t.members.keys().next().unwrap();
        mark_present(&mut t, e, first, true, Timestamp::EPOCH).unwrap();
        assert_eq!(initialize(&mut t, e, Timestamp::EPOCH), 2);
        assert_eq!(initialize(&mut t, e, Timestamp::EPOCH), 0);
        let roll = entries(&t, e);
        assert_eq!(roll.len(), 3);
        assert_eq!(roll.iter().filter(|r| r.present).count(), 1);
    }
}
