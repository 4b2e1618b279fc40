/*!

Election resolution engine for assemblies.

An election runs a fixed list of offices one after the other. Each office is voted on in up to
three scrutinies by the members present when the office opened:

- in the first two rounds a candidate needs an absolute majority of the present members,
- the third round keeps only the two best candidates of the second one and is decided by
  plurality; a tie at the top is left to an administrator.

No round is decided before every present member has voted in it.

```
use assembly_election::builder::EngineBuilder;
use assembly_election::*;

let mut builder = EngineBuilder::new(&ElectionRules::DEFAULT_RULES)?
    .offices(&["Treasurer".to_string()])?;
let ana = builder.add_member("Ana", "ana@example.org")?;
let bruno = builder.add_member("Bruno", "bruno@example.org")?;
let engine = builder.build();

let election = engine.create_election("Annual assembly")?;
engine.mark_present(election.id, ana, true)?;
engine.mark_present(election.id, bruno, true)?;
let treasurer = engine.open_next(election.id)?.unwrap().office;
let candidate = engine.add_candidate(election.id, treasurer, ana)?;

engine.cast(ana, candidate.id, treasurer, election.id)?;
let receipt = engine.cast(bruno, candidate.id, treasurer, election.id)?;
assert!(matches!(receipt.tally.outcome, Outcome::Elected { .. }));

# Ok::<(), ElectionError>(())
```
*/

mod attendance;
mod ballot;
pub mod builder;
mod candidacy;
mod config;
mod error;
mod lifecycle;
pub mod manual;
mod position;
mod results;
pub mod store;
mod tally;

use log::info;

pub use crate::ballot::CastReceipt;
pub use crate::config::*;
pub use crate::error::*;
pub use crate::store::{ElectionStore, MemoryStore, Tables};
pub use crate::tally::{majority_threshold, Outcome, Tally};

/// The engine: every administrative and voter-facing entry point.
///
/// Each state-changing call is a single transaction of the underlying store, so a rejected call
/// changes nothing. The caller is trusted to have authenticated the member ids it passes.
pub struct Engine<S: ElectionStore = MemoryStore> {
    store: S,
    rules: ElectionRules,
}

impl Engine<MemoryStore> {
    /// An engine over an empty in-memory store with the given offices, in voting order.
    pub fn new(rules: &ElectionRules, offices: &[String]) -> Engine<MemoryStore> {
        Engine::with_store(MemoryStore::new(Tables::new(offices)), rules)
    }
}

impl<S: ElectionStore> Engine<S> {
    pub fn with_store(store: S, rules: &ElectionRules) -> Engine<S> {
        Engine {
            store,
            rules: rules.clone(),
        }
    }

    pub fn rules(&self) -> &ElectionRules {
        &self.rules
    }

    // **** Roster ****

    pub fn register_member(
        &self,
        full_name: &str,
        email: &str,
        role: Role,
    ) -> ElectionResult<Member> {
        self.store
            .write(|t| Ok(t.insert_member(full_name, email, role)))
    }

    pub fn members(&self) -> Vec<Member> {
        self.store.read(|t| t.members.values().cloned().collect())
    }

    /// The offices, in voting order.
    pub fn offices(&self) -> Vec<Office> {
        self.store.read(|t| t.offices.clone())
    }

    pub fn office_by_name(&self, name: &str) -> Option<Office> {
        self.store
            .read(|t| t.offices.iter().find(|o| o.name == name).cloned())
    }

    // **** Election lifecycle ****

    /// Creates a new election and makes it the only active one.
    pub fn create_election(&self, name: &str) -> ElectionResult<Election> {
        let now = Timestamp::now();
        self.store.write(|t| Ok(lifecycle::create(t, name, now)))
    }

    /// Deactivates the election and completes every office that is not completed yet.
    ///
    /// Accepted on any election that is not finalized, including one a newer election has
    /// already deactivated.
    pub fn close_election(&self, election: ElectionId) -> ElectionResult<()> {
        let now = Timestamp::now();
        self.store
            .write(|t| lifecycle::close(t, &self.rules, election, now))
    }

    /// Archives a fully decided election. Fails without any change unless every office is
    /// completed.
    pub fn finalize_election(&self, election: ElectionId) -> ElectionResult<()> {
        let now = Timestamp::now();
        self.store.write(|t| lifecycle::finalize(t, election, now))
    }

    // **** Attendance ****

    pub fn mark_present(
        &self,
        election: ElectionId,
        member: MemberId,
        present: bool,
    ) -> ElectionResult<()> {
        let now = Timestamp::now();
        self.store.write(|t| {
            lifecycle::ensure_open(t, election)?;
            attendance::mark_present(t, election, member, present, now)
        })
    }

    /// Seeds an absent record for every ordinary member who has none yet.
    pub fn initialize_attendance(&self, election: ElectionId) -> ElectionResult<usize> {
        let now = Timestamp::now();
        self.store.write(|t| {
            lifecycle::ensure_open(t, election)?;
            Ok(attendance::initialize(t, election, now))
        })
    }

    pub fn present_count(&self, scope: AttendanceScope) -> u64 {
        self.store.read(|t| attendance::present_count(t, scope))
    }

    pub fn attendance(&self, election: ElectionId) -> ElectionResult<Vec<AttendanceEntry>> {
        self.store.read(|t| {
            lifecycle::election(t, election)?;
            Ok(attendance::entries(t, election))
        })
    }

    // **** Offices ****

    /// Opens a pending office, freezing the attendance roll that makes its quorum.
    pub fn open_office(
        &self,
        election: ElectionId,
        office: OfficeId,
    ) -> ElectionResult<ElectionOffice> {
        let now = Timestamp::now();
        self.store.write(|t| {
            lifecycle::ensure_open(t, election)?;
            position::open(t, &self.rules, election, office, now)
        })
    }

    /// Starts the next round of the active office. Entering the final round prunes the
    /// candidates; this cannot be undone.
    pub fn advance_round(&self, election: ElectionId, office: OfficeId) -> ElectionResult<Round> {
        let now = Timestamp::now();
        self.store.write(|t| {
            lifecycle::ensure_open(t, election)?;
            position::advance_round(t, &self.rules, election, office, now)
        })
    }

    /// Completes the active office, if any, and opens the next pending one.
    ///
    /// Returns `None` when every office has already been opened. Nothing changes then: an
    /// active office stays open.
    pub fn open_next(&self, election: ElectionId) -> ElectionResult<Option<ElectionOffice>> {
        let now = Timestamp::now();
        self.store.write(|t| {
            lifecycle::ensure_open(t, election)?;
            position::open_next(t, &self.rules, election, now)
        })
    }

    /// Completes an active office without a winner. The reason is kept in the audit log.
    pub fn force_complete(
        &self,
        election: ElectionId,
        office: OfficeId,
        reason: &str,
    ) -> ElectionResult<()> {
        let now = Timestamp::now();
        self.store.write(|t| {
            lifecycle::ensure_open(t, election)?;
            position::force_complete(t, &self.rules, election, office, reason, now)
        })
    }

    /// Declares the winner of an active office on behalf of an administrator, typically to
    /// break a tie of the final round. `round` must be the current round of the office.
    pub fn set_winner(
        &self,
        election: ElectionId,
        office: OfficeId,
        candidate: CandidateId,
        round: Round,
    ) -> ElectionResult<WinnerRecord> {
        let now = Timestamp::now();
        self.store.write(|t| {
            lifecycle::ensure_open(t, election)?;
            position::set_winner(
                t,
                &self.rules,
                election,
                office,
                candidate,
                round,
                Decision::Adjudicated,
                now,
            )
        })
    }

    // **** Candidacies and ballots ****

    pub fn add_candidate(
        &self,
        election: ElectionId,
        office: OfficeId,
        member: MemberId,
    ) -> ElectionResult<Candidacy> {
        self.store.write(|t| {
            lifecycle::ensure_open(t, election)?;
            candidacy::add_candidate(t, election, office, member)
        })
    }

    /// Casts a ballot in the current round of the office.
    ///
    /// The round is decided here, never by the caller. The round is evaluated before this
    /// returns, and a winner it decides is already recorded in the receipt.
    pub fn cast(
        &self,
        voter: MemberId,
        candidate: CandidateId,
        office: OfficeId,
        election: ElectionId,
    ) -> ElectionResult<CastReceipt> {
        let now = Timestamp::now();
        self.store.write(|t| {
            lifecycle::ensure_open(t, election)?;
            ballot::cast(t, &self.rules, voter, candidate, office, election, now)
        })
    }

    // **** Queries ****

    pub fn election(&self, election: ElectionId) -> ElectionResult<Election> {
        self.store
            .read(|t| lifecycle::election(t, election).map(|e| e.clone()))
    }

    pub fn active_election(&self) -> Option<Election> {
        self.store.read(|t| {
            t.elections
                .values()
                .filter(|e| e.is_active)
                .max_by_key(|e| (e.created_at, e.id))
                .cloned()
        })
    }

    /// The offices of an election, in voting order.
    pub fn election_offices(&self, election: ElectionId) -> ElectionResult<Vec<ElectionOffice>> {
        self.store.read(|t| {
            lifecycle::election(t, election)?;
            let mut eos: Vec<ElectionOffice> = t.election_offices_of(election).cloned().collect();
            eos.sort_by_key(|eo| eo.order_index);
            Ok(eos)
        })
    }

    pub fn active_office(&self, election: ElectionId) -> ElectionResult<Option<ElectionOffice>> {
        self.store.read(|t| {
            lifecycle::election(t, election)?;
            Ok(position::active_office(t, election)
                .and_then(|office| t.election_offices.get(&(election, office)).cloned()))
        })
    }

    /// The office `open_next` would open.
    pub fn next_pending_office(&self, election: ElectionId) -> ElectionResult<OfficeId> {
        self.store.read(|t| {
            lifecycle::election(t, election)?;
            position::next_pending(t, election)
        })
    }

    pub fn candidates(&self, election: ElectionId, office: OfficeId) -> Vec<Candidacy> {
        self.store
            .read(|t| t.candidacies_for(election, office).cloned().collect())
    }

    /// The live tally of the current round of an office.
    pub fn tally(&self, election: ElectionId, office: OfficeId) -> ElectionResult<Tally> {
        self.store.read(|t| {
            let round = current_round(t, election, office)?;
            Ok(tally::tally_round(t, &self.rules, election, office, round))
        })
    }

    /// The tally of any round of an office, up to the current one, from the ballots that
    /// remain.
    pub fn round_tally(
        &self,
        election: ElectionId,
        office: OfficeId,
        round: Round,
    ) -> ElectionResult<Tally> {
        self.store.read(|t| {
            let current = current_round(t, election, office)?;
            if round == 0 || round > current {
                return Err(ElectionError::NotFound {
                    entity: Entity::Round,
                    id: round as u64,
                });
            }
            Ok(tally::tally_round(t, &self.rules, election, office, round))
        })
    }

    pub fn winners(&self, election: ElectionId) -> ElectionResult<Vec<WinnerSummary>> {
        self.store.read(|t| results::winners(t, election))
    }

    /// Every election, newest first, with its winners.
    pub fn history(&self) -> Vec<ElectionSummary> {
        self.store.read(results::history)
    }

    /// The results view of an election. A pure read, available at any time.
    pub fn results(&self, election: ElectionId) -> ElectionResult<ElectionResults> {
        self.store
            .read(|t| results::election_results(t, &self.rules, election))
    }

    /// The results of the most recently created election, if there is one.
    pub fn latest_results(&self) -> ElectionResult<Option<ElectionResults>> {
        self.store.read(|t| match results::latest_election(t) {
            Some(election) => {
                info!("latest_results: election {}", election);
                results::election_results(t, &self.rules, election).map(Some)
            }
            None => Ok(None),
        })
    }

    pub fn audit_log(&self, election: ElectionId) -> Vec<AuditEntry> {
        self.store.read(|t| {
            t.audit
                .iter()
                .filter(|a| a.election == election)
                .cloned()
                .collect()
        })
    }
}

fn current_round(t: &Tables, election: ElectionId, office: OfficeId) -> ElectionResult<Round> {
    t.election_offices
        .get(&(election, office))
        .map(|eo| eo.round)
        .ok_or(ElectionError::NotFound {
            entity: Entity::Office,
            id: office.0,
        })
}
