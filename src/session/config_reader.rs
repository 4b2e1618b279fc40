use crate::session::*;

use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(rename = "electionName")]
    pub election_name: String,
    /// The offices in voting order. Defaults to the standard offices of the assembly.
    pub offices: Option<Vec<String>>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ScriptMember {
    #[serde(rename = "fullName")]
    pub full_name: String,
    pub email: String,
    pub admin: Option<bool>,
}

/// One recorded action of the session. Members are referred to by their 1-based position in
/// the roster, offices by name and candidates by the member standing.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Action {
    CreateElection {
        name: Option<String>,
    },
    InitializeAttendance,
    MarkPresent {
        members: Vec<usize>,
        present: Option<bool>,
    },
    OpenOffice {
        office: String,
    },
    OpenNext,
    AddCandidate {
        office: String,
        member: usize,
    },
    Cast {
        office: String,
        candidate: usize,
        voters: Vec<usize>,
    },
    AdvanceRound {
        office: String,
    },
    SetWinner {
        office: String,
        candidate: usize,
        round: u32,
    },
    ForceComplete {
        office: String,
        reason: Option<String>,
    },
    Close,
    Finalize,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::CreateElection { .. } => "createElection",
            Action::InitializeAttendance => "initializeAttendance",
            Action::MarkPresent { .. } => "markPresent",
            Action::OpenOffice { .. } => "openOffice",
            Action::OpenNext => "openNext",
            Action::AddCandidate { .. } => "addCandidate",
            Action::Cast { .. } => "cast",
            Action::AdvanceRound { .. } => "advanceRound",
            Action::SetWinner { .. } => "setWinner",
            Action::ForceComplete { .. } => "forceComplete",
            Action::Close => "close",
            Action::Finalize => "finalize",
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub action: Action,
    /// The name of the error this step must be rejected with.
    pub expect: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SessionScript {
    #[serde(rename = "sessionSettings")]
    pub session_settings: SessionSettings,
    pub members: Vec<ScriptMember>,
    pub steps: Vec<Step>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub election: String,
    pub status: String,
    pub offices: Vec<String>,
    pub members: usize,
    #[serde(rename = "finalRound")]
    pub final_round: u32,
    #[serde(rename = "runoffSize")]
    pub runoff_size: usize,
}

pub fn read_script(path: &str) -> SessionResult<SessionScript> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let script: SessionScript =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    debug!("read_script: {:?}", script);
    Ok(script)
}

pub fn read_summary(path: &str) -> SessionResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    Ok(js)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_are_tagged_by_action() {
        let js = r#"[
            {"action": "openNext"},
            {"action": "markPresent", "members": [1, 2]},
            {"action": "cast", "office": "President", "candidate": 1, "voters": [3], "expect": "DuplicateVote"}
        ]"#;
        let steps: Vec<Step> = serde_json::from_str(js).unwrap();
        assert_eq!(steps[0].action, Action::OpenNext);
        assert_eq!(steps[0].expect, None);
        assert_eq!(
            steps[1].action,
            Action::MarkPresent {
                members: vec![1, 2],
                present: None
            }
        );
        assert_eq!(steps[2].action.name(), "cast");
        assert_eq!(steps[2].expect, Some("DuplicateVote".to_string()));
    }

    #[test]
    fn unknown_action_is_rejected() {
        let js = r#"{"action": "recount"}"#;
        assert!(serde_json::from_str::<Step>(js).is_err());
    }
}
