// ********* Identifiers ***********

use std::fmt::Display;
use std::time::{SystemTime, UNIX_EPOCH};

/// A scrutiny number. The first scrutiny of an office is round 1.
pub type Round = u32;

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct ElectionId(pub u64);

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct OfficeId(pub u64);

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct MemberId(pub u64);

/// Identifies one candidacy row: a member standing for one office in one election.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct CandidateId(pub u64);

impl Display for ElectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for OfficeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for MemberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for CandidateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Seconds since the Unix epoch.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const EPOCH: Timestamp = Timestamp(0);

    pub fn new(secs: u64) -> Timestamp {
        Timestamp(secs)
    }

    /// The current system time. A clock set before the epoch reads as the epoch.
    pub fn now() -> Timestamp {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Timestamp(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }
}

// ********* Stored records ***********

/// The role supplied by the identity boundary with every call.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Role {
    Member,
    /// Runs the assembly. Administrators may never stand as candidates.
    Administrator,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Member {
    pub id: MemberId,
    pub full_name: String,
    pub email: String,
    pub role: Role,
}

/// One of the fixed roles being elected.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Office {
    pub id: OfficeId,
    pub name: String,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Election {
    pub id: ElectionId,
    pub name: String,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub closed_at: Option<Timestamp>,
    /// Finalized elections are read-only history.
    pub finalized: bool,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum OfficeStatus {
    Pending,
    Active,
    Completed,
}

impl Display for OfficeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OfficeStatus::Pending => "pending",
            OfficeStatus::Active => "active",
            OfficeStatus::Completed => "completed",
        };
        write!(f, "{}", s)
    }
}

/// The per-election instance of an office's voting process.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ElectionOffice {
    pub election: ElectionId,
    pub office: OfficeId,
    pub order_index: usize,
    pub status: OfficeStatus,
    pub round: Round,
    pub opened_at: Option<Timestamp>,
    pub closed_at: Option<Timestamp>,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct AttendanceRecord {
    pub election: ElectionId,
    pub member: MemberId,
    pub present: bool,
    pub marked_at: Timestamp,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Candidacy {
    pub id: CandidateId,
    pub member: MemberId,
    pub office: OfficeId,
    pub election: ElectionId,
    // Denormalized for result rendering.
    pub full_name: String,
    pub email: String,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Ballot {
    pub voter: MemberId,
    pub candidate: CandidateId,
    pub office: OfficeId,
    pub election: ElectionId,
    pub round: Round,
    pub cast_at: Timestamp,
}

/// How a winner was decided.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Decision {
    /// Absolute majority of the present members, in a majority round.
    Majority,
    /// Strictly more votes than anyone else, in the final round.
    Plurality,
    /// Set by an administrator, typically to break a final-round tie.
    Adjudicated,
}

impl Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Decision::Majority => "majority",
            Decision::Plurality => "plurality",
            Decision::Adjudicated => "adjudicated",
        };
        write!(f, "{}", s)
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct WinnerRecord {
    pub election: ElectionId,
    pub office: OfficeId,
    pub candidate: CandidateId,
    pub member: MemberId,
    pub round: Round,
    pub decision: Decision,
}

/// Vote count of one candidate, captured when its office completed.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ArchivedTally {
    pub candidate: CandidateId,
    pub member: MemberId,
    pub full_name: String,
    pub avatar_key: String,
    pub round: Round,
    pub votes: u64,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct AuditEntry {
    pub at: Timestamp,
    pub election: ElectionId,
    pub office: Option<OfficeId>,
    pub message: String,
}

/// Which attendance roll to count.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum AttendanceScope {
    /// The live roll of the election, mutable until an office opens.
    Election(ElectionId),
    /// The roll frozen when the office opened.
    Office(ElectionId, OfficeId),
}

// ******** Output data structures *********

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct AttendanceEntry {
    pub member: MemberId,
    pub full_name: String,
    pub email: String,
    pub present: bool,
    pub marked_at: Timestamp,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CandidateResult {
    pub candidate: CandidateId,
    pub member: MemberId,
    pub name: String,
    pub avatar_key: String,
    pub votes: u64,
    pub elected: bool,
}

/// Statistics for one office
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct OfficeResult {
    pub office: OfficeId,
    pub office_name: String,
    pub status: OfficeStatus,
    pub round: Round,
    pub quorum: u64,
    pub threshold: u64,
    /// Every present member voted in the current round and nobody won.
    pub undecided: bool,
    /// Undecided in a majority round: an administrator must advance the round.
    pub needs_next_scrutiny: bool,
    pub winner: Option<CandidateId>,
    pub won_at_round: Option<Round>,
    /// Sorted by descending votes. Sort order alone never implies victory.
    pub candidates: Vec<CandidateResult>,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ElectionResults {
    pub election: ElectionId,
    pub election_name: String,
    pub is_active: bool,
    pub finalized: bool,
    /// The round of the office currently being voted on, if any.
    pub current_round: Option<Round>,
    pub offices: Vec<OfficeResult>,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct WinnerSummary {
    pub office: OfficeId,
    pub office_name: String,
    pub candidate: CandidateId,
    pub member: MemberId,
    pub name: String,
    pub avatar_key: String,
    pub votes: u64,
    pub round: Round,
    pub decision: Decision,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ElectionSummary {
    pub election: Election,
    pub winners: Vec<WinnerSummary>,
}

// ********* Configuration **********

/// The fixed offices of the assembly, in the order they are voted on.
pub const DEFAULT_OFFICES: [&str; 5] = [
    "President",
    "Vice-President",
    "First Secretary",
    "Second Secretary",
    "Treasurer",
];

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ElectionRules {
    /// The last scrutiny of an office. It is decided by plurality; every
    /// earlier round requires an absolute majority of the present members.
    pub final_round: Round,
    /// How many candidates survive into the final round.
    pub runoff_size: usize,
}

impl ElectionRules {
    pub const DEFAULT_RULES: ElectionRules = ElectionRules {
        final_round: 3,
        runoff_size: 2,
    };

    pub fn is_final_round(&self, round: Round) -> bool {
        round >= self.final_round
    }
}

impl Default for ElectionRules {
    fn default() -> Self {
        ElectionRules::DEFAULT_RULES
    }
}

/// The contact-derived key used to fetch a candidate's avatar.
///
/// This is the SHA-256 digest of the trimmed, lower-cased email address, which is what
/// Gravatar expects.
pub fn avatar_key(email: &str) -> String {
    sha256::digest(email.trim().to_lowercase())
}
