use std::fmt::Display;
use std::str::FromStr;

use snafu::Snafu;

use crate::config::*;

/// The kind of record a lookup failed to find.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Entity {
    Election,
    Office,
    Member,
    Candidate,
    Round,
}

impl Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Entity::Election => "election",
            Entity::Office => "office",
            Entity::Member => "member",
            Entity::Candidate => "candidate",
            Entity::Round => "round",
        };
        write!(f, "{}", s)
    }
}

/// A state change requested on an election office.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Transition {
    Open,
    AdvanceRound,
    Complete,
    SetWinner,
}

impl Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Transition::Open => "open",
            Transition::AdvanceRound => "advance the round of",
            Transition::Complete => "complete",
            Transition::SetWinner => "set the winner of",
        };
        write!(f, "{}", s)
    }
}

/// Typed rejections returned by the engine.
///
/// Every variant carries enough context (election, office, round) for a user interface to
/// explain why an action is blocked. Storage-level uniqueness violations never surface as
/// such: they are reported as [`ElectionError::DuplicateVote`] or
/// [`ElectionError::DuplicateCandidacy`].
#[derive(Debug, Snafu, PartialEq, Eq, Clone)]
#[snafu(visibility(pub(crate)))]
pub enum ElectionError {
    #[snafu(display("the vote for office {office} is not currently open in election {election}"))]
    OfficeNotOpen {
        election: ElectionId,
        office: OfficeId,
    },

    #[snafu(display("member {member} holds a role that cannot stand as a candidate"))]
    IneligibleRole { member: MemberId },

    #[snafu(display(
        "member {member} was not present when office {office} opened in election {election}"
    ))]
    NotPresent {
        election: ElectionId,
        office: OfficeId,
        member: MemberId,
    },

    #[snafu(display("member {member} has already been elected in election {election}"))]
    AlreadyElected {
        election: ElectionId,
        member: MemberId,
    },

    #[snafu(display(
        "member {member} is already a candidate for office {office} in election {election}"
    ))]
    DuplicateCandidacy {
        election: ElectionId,
        office: OfficeId,
        member: MemberId,
    },

    #[snafu(display(
        "member {voter} already voted for office {office} in round {round} of election {election}"
    ))]
    DuplicateVote {
        election: ElectionId,
        office: OfficeId,
        voter: MemberId,
        round: Round,
    },

    #[snafu(display(
        "cannot open office {requested}: office {active} is still open in election {election}"
    ))]
    OfficeAlreadyOpenElsewhere {
        election: ElectionId,
        requested: OfficeId,
        active: OfficeId,
    },

    #[snafu(display("no pending office remains in election {election}"))]
    NoPendingOffice { election: ElectionId },

    #[snafu(display("election {election} still has {unresolved} unresolved office(s)"))]
    IncompleteElection {
        election: ElectionId,
        unresolved: usize,
    },

    #[snafu(display("{entity} {id} not found"))]
    NotFound { entity: Entity, id: u64 },

    #[snafu(display(
        "cannot {action} office {office} of election {election}: it is {status} in round {round}"
    ))]
    InvalidTransition {
        election: ElectionId,
        office: OfficeId,
        status: OfficeStatus,
        round: Round,
        action: Transition,
    },

    #[snafu(display(
        "cannot open office {office} of election {election}: nobody is marked present"
    ))]
    EmptyQuorum {
        election: ElectionId,
        office: OfficeId,
    },

    #[snafu(display("election {election} is closed"))]
    ElectionClosed { election: ElectionId },

    #[snafu(display("election {election} is finalized and read-only"))]
    ElectionArchived { election: ElectionId },

    #[snafu(display(
        "invalid rules: final round {final_round} and {runoff_size} finalist(s), both must be at least 1"
    ))]
    InvalidRules {
        final_round: Round,
        runoff_size: usize,
    },
}

pub type ElectionResult<T> = Result<T, ElectionError>;

/// The kind of an [`ElectionError`], without its context.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum ErrorKind {
    OfficeNotOpen,
    IneligibleRole,
    NotPresent,
    AlreadyElected,
    DuplicateCandidacy,
    DuplicateVote,
    OfficeAlreadyOpenElsewhere,
    NoPendingOffice,
    IncompleteElection,
    NotFound,
    InvalidTransition,
    EmptyQuorum,
    ElectionClosed,
    ElectionArchived,
    InvalidRules,
}

impl ElectionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ElectionError::OfficeNotOpen { .. } => ErrorKind::OfficeNotOpen,
            ElectionError::IneligibleRole { .. } => ErrorKind::IneligibleRole,
            ElectionError::NotPresent { .. } => ErrorKind::NotPresent,
            ElectionError::AlreadyElected { .. } => ErrorKind::AlreadyElected,
            ElectionError::DuplicateCandidacy { .. } => ErrorKind::DuplicateCandidacy,
            ElectionError::DuplicateVote { .. } => ErrorKind::DuplicateVote,
            ElectionError::OfficeAlreadyOpenElsewhere { .. } => {
                ErrorKind::OfficeAlreadyOpenElsewhere
            }
            ElectionError::NoPendingOffice { .. } => ErrorKind::NoPendingOffice,
            ElectionError::IncompleteElection { .. } => ErrorKind::IncompleteElection,
            ElectionError::NotFound { .. } => ErrorKind::NotFound,
            ElectionError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            ElectionError::EmptyQuorum { .. } => ErrorKind::EmptyQuorum,
            ElectionError::ElectionClosed { .. } => ErrorKind::ElectionClosed,
            ElectionError::ElectionArchived { .. } => ErrorKind::ElectionArchived,
            ElectionError::InvalidRules { .. } => ErrorKind::InvalidRules,
        }
    }
}

const KIND_NAMES: [(ErrorKind, &str); 15] = [
    (ErrorKind::OfficeNotOpen, "OfficeNotOpen"),
    (ErrorKind::IneligibleRole, "IneligibleRole"),
    (ErrorKind::NotPresent, "NotPresent"),
    (ErrorKind::AlreadyElected, "AlreadyElected"),
    (ErrorKind::DuplicateCandidacy, "DuplicateCandidacy"),
    (ErrorKind::DuplicateVote, "DuplicateVote"),
    (
        ErrorKind::OfficeAlreadyOpenElsewhere,
        "OfficeAlreadyOpenElsewhere",
    ),
    (ErrorKind::NoPendingOffice, "NoPendingOffice"),
    (ErrorKind::IncompleteElection, "IncompleteElection"),
    (ErrorKind::NotFound, "NotFound"),
    (ErrorKind::InvalidTransition, "InvalidTransition"),
    (ErrorKind::EmptyQuorum, "EmptyQuorum"),
    (ErrorKind::ElectionClosed, "ElectionClosed"),
    (ErrorKind::ElectionArchived, "ElectionArchived"),
    (ErrorKind::InvalidRules, "InvalidRules"),
];

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = KIND_NAMES
            .iter()
            .find(|(k, _)| k == self)
            .map(|(_, n)| *n)
            .unwrap_or("Unknown");
        write!(f, "{}", name)
    }
}

/// The name of an error kind was not recognized.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct UnknownErrorKind(pub String);

impl Display for UnknownErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown error kind {:?}", self.0)
    }
}

impl std::error::Error for UnknownErrorKind {}

impl FromStr for ErrorKind {
    type Err = UnknownErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KIND_NAMES
            .iter()
            .find(|(_, n)| *n == s)
            .map(|(k, _)| *k)
            .ok_or_else(|| UnknownErrorKind(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_round_trip() {
        for (kind, name) in KIND_NAMES.iter() {
            assert_eq!(kind.to_string(), *name);
            assert_eq!(name.parse::<ErrorKind>(), Ok(*kind));
        }
        assert!("LostVote".parse::<ErrorKind>().is_err());
    }

    #[test]
    fn rejection_names_office_and_round() {
        let e = ElectionError::DuplicateVote {
            election: ElectionId(1),
            office: OfficeId(2),
            voter: MemberId(7),
            round: 3,
        };
        assert_eq!(
            e.to_string(),
            "member 7 already voted for office 2 in round 3 of election 1"
        );
        assert_eq!(e.kind(), ErrorKind::DuplicateVote);
    }
}
