//! The transactional store behind the engine.
//!
//! [`Tables`] is the complete relational state of every election. The engine never touches it
//! directly: it goes through an [`ElectionStore`], whose `write` runs a closure against a working
//! copy and commits the copy only when the closure succeeds. A rejected operation therefore
//! leaves no trace, and every state-changing operation of the engine is one atomic unit.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::debug;
use snafu::Snafu;

use crate::config::*;

#[derive(Debug, Snafu, PartialEq, Eq, Clone)]
pub enum StoreError {
    #[snafu(display("unique constraint {constraint} violated"))]
    UniqueViolation { constraint: &'static str },
}

pub(crate) const BALLOT_UNIQUE: &str = "ballots(voter, office, election, round)";
pub(crate) const CANDIDACY_UNIQUE: &str = "candidacies(member, office, election)";

/// Unique key of a ballot.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub(crate) struct BallotKey {
    pub election: ElectionId,
    pub office: OfficeId,
    pub round: Round,
    pub voter: MemberId,
}

impl BallotKey {
    fn of(b: &Ballot) -> BallotKey {
        BallotKey {
            election: b.election,
            office: b.office,
            round: b.round,
            voter: b.voter,
        }
    }
}

/// Members present when an office opened. Never modified after it is taken.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub(crate) struct FrozenAttendance {
    pub taken_at: Timestamp,
    pub members: BTreeSet<MemberId>,
}

#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct Tables {
    pub(crate) members: BTreeMap<MemberId, Member>,
    // In canonical voting order.
    pub(crate) offices: Vec<Office>,
    pub(crate) elections: BTreeMap<ElectionId, Election>,
    pub(crate) election_offices: BTreeMap<(ElectionId, OfficeId), ElectionOffice>,
    pub(crate) attendance: BTreeMap<(ElectionId, MemberId), AttendanceRecord>,
    pub(crate) office_attendance: BTreeMap<(ElectionId, OfficeId), FrozenAttendance>,
    pub(crate) candidacies: BTreeMap<CandidateId, Candidacy>,
    pub(crate) ballots: BTreeMap<BallotKey, Ballot>,
    pub(crate) winners: BTreeMap<(ElectionId, OfficeId), WinnerRecord>,
    pub(crate) archived_tallies: BTreeMap<(ElectionId, OfficeId), Vec<ArchivedTally>>,
    pub(crate) audit: Vec<AuditEntry>,
    last_id: u64,
}

impl Tables {
    pub fn new(offices: &[String]) -> Tables {
        let mut t = Tables::default();
        for name in offices {
            let id = OfficeId(t.next_id());
            t.offices.push(Office {
                id,
                name: name.clone(),
            });
        }
        t
    }

    pub(crate) fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }

    pub(crate) fn insert_member(&mut self, full_name: &str, email: &str, role: Role) -> Member {
        let member = Member {
            id: MemberId(self.next_id()),
            full_name: full_name.to_string(),
            email: email.to_string(),
            role,
        };
        self.members.insert(member.id, member.clone());
        member
    }

    pub(crate) fn office(&self, id: OfficeId) -> Option<&Office> {
        self.offices.iter().find(|o| o.id == id)
    }

    pub(crate) fn election_offices_of(
        &self,
        election: ElectionId,
    ) -> impl Iterator<Item = &ElectionOffice> {
        self.election_offices
            .range((election, OfficeId(0))..=(election, OfficeId(u64::MAX)))
            .map(|(_, eo)| eo)
    }

    pub(crate) fn candidacies_for(
        &self,
        election: ElectionId,
        office: OfficeId,
    ) -> impl Iterator<Item = &Candidacy> {
        self.candidacies
            .values()
            .filter(move |c| c.election == election && c.office == office)
    }

    pub(crate) fn ballots_for(
        &self,
        election: ElectionId,
        office: OfficeId,
        round: Round,
    ) -> impl Iterator<Item = &Ballot> {
        let start = BallotKey {
            election,
            office,
            round,
            voter: MemberId(0),
        };
        let end = BallotKey {
            voter: MemberId(u64::MAX),
            ..start
        };
        self.ballots.range(start..=end).map(|(_, b)| b)
    }

    pub(crate) fn has_ballot(&self, key: &BallotKey) -> bool {
        self.ballots.contains_key(key)
    }

    /// Inserts a ballot under the (voter, office, election, round) unique constraint.
    pub(crate) fn insert_ballot(&mut self, ballot: Ballot) -> Result<(), StoreError> {
        let key = BallotKey::of(&ballot);
        if self.ballots.contains_key(&key) {
            return UniqueViolationSnafu {
                constraint: BALLOT_UNIQUE,
            }
            .fail();
        }
        self.ballots.insert(key, ballot);
        Ok(())
    }

    /// Inserts a candidacy under the (member, office, election) unique constraint.
    pub(crate) fn insert_candidacy(&mut self, candidacy: Candidacy) -> Result<(), StoreError> {
        let taken = self.candidacies.values().any(|c| {
            c.member == candidacy.member
                && c.office == candidacy.office
                && c.election == candidacy.election
        });
        if taken {
            return UniqueViolationSnafu {
                constraint: CANDIDACY_UNIQUE,
            }
            .fail();
        }
        self.candidacies.insert(candidacy.id, candidacy);
        Ok(())
    }

    /// Deletes the ballots matching the predicate. Returns how many were deleted.
    pub(crate) fn delete_ballots(&mut self, pred: impl Fn(&Ballot) -> bool) -> usize {
        let before = self.ballots.len();
        self.ballots.retain(|_, b| !pred(b));
        before - self.ballots.len()
    }

    /// Deletes the candidacies matching the predicate. Returns how many were deleted.
    pub(crate) fn delete_candidacies(&mut self, pred: impl Fn(&Candidacy) -> bool) -> usize {
        let before = self.candidacies.len();
        self.candidacies.retain(|_, c| !pred(c));
        before - self.candidacies.len()
    }

    pub(crate) fn audit(
        &mut self,
        at: Timestamp,
        election: ElectionId,
        office: Option<OfficeId>,
        message: String,
    ) {
        debug!("audit: election {} office {:?}: {}", election, office, message);
        self.audit.push(AuditEntry {
            at,
            election,
            office,
            message,
        });
    }
}

/// Abstract transactional store.
pub trait ElectionStore {
    /// Runs a pure read against the committed state.
    fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> R;

    /// Runs a transactional unit. The changes made by `f` are committed if and only if it
    /// returns `Ok`.
    fn write<R, E>(&self, f: impl FnOnce(&mut Tables) -> Result<R, E>) -> Result<R, E>;
}

/// In-memory store. Writes are serialized by a mutex.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new(tables: Tables) -> MemoryStore {
        MemoryStore {
            tables: Mutex::new(tables),
        }
    }

    // The committed state is only ever replaced wholesale, so a poisoned lock still guards a
    // consistent value.
    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ElectionStore for MemoryStore {
    fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> R {
        let guard = self.lock();
        f(&guard)
    }

    fn write<R, E>(&self, f: impl FnOnce(&mut Tables) -> Result<R, E>) -> Result<R, E> {
        let mut guard = self.lock();
        let mut working = guard.clone();
        let res = f(&mut working)?;
        *guard = working;
        Ok(res)
    }
}
