use log::{debug, info, warn};

use assembly_election::builder::EngineBuilder;
use assembly_election::*;
use snafu::{prelude::*, Snafu};

use std::fs;

use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::session::config_reader::*;

pub mod config_reader;

#[derive(Debug, Snafu)]
pub enum SessionError {
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Error serializing the summary to JSON"))]
    SerializingJson { source: serde_json::Error },
    #[snafu(display("Error writing the summary to {path}"))]
    WritingSummary {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("step {step}: unknown member #{position} (the roster has {roster} members)"))]
    UnknownMember {
        step: usize,
        position: usize,
        roster: usize,
    },
    #[snafu(display("step {step}: unknown office {name:?}"))]
    UnknownOffice { step: usize, name: String },
    #[snafu(display("step {step}: member #{position} is not a candidate for {office:?}"))]
    UnknownCandidate {
        step: usize,
        position: usize,
        office: String,
    },
    #[snafu(display("step {step}: no election was created yet"))]
    NoElection { step: usize },
    #[snafu(display("step {step}: {source}"))]
    UnknownExpectation {
        step: usize,
        source: UnknownErrorKind,
    },
    #[snafu(display("step {step} ({action}) was rejected: {source}"))]
    Rejected {
        step: usize,
        action: String,
        source: ElectionError,
    },
    #[snafu(display("step {step} ({action}) succeeded but {expected} was expected"))]
    MissingRejection {
        step: usize,
        action: String,
        expected: ErrorKind,
    },
    #[snafu(display("step {step} ({action}) was rejected with {found} but {expected} was expected"))]
    WrongRejection {
        step: usize,
        action: String,
        expected: ErrorKind,
        found: ErrorKind,
    },
    #[snafu(display("Difference detected between calculated summary and reference summary"))]
    ReferenceMismatch {},
}

pub type SessionResult<T> = Result<T, SessionError>;

/// The engine being driven by a script, and what the script refers to.
struct Replay {
    engine: Engine,
    roster: Vec<MemberId>,
    election: Option<ElectionId>,
}

impl Replay {
    fn new(script: &SessionScript) -> SessionResult<Replay> {
        let rules = ElectionRules::DEFAULT_RULES;
        let mut builder = EngineBuilder::new(&rules).context(RejectedSnafu {
            step: 0usize,
            action: "setup",
        })?;
        if let Some(offices) = script.session_settings.offices.as_ref() {
            builder = builder.offices(offices).context(RejectedSnafu {
                step: 0usize,
                action: "setup",
            })?;
        }
        let mut roster: Vec<MemberId> = Vec::new();
        for m in script.members.iter() {
            let id = if m.admin.unwrap_or(false) {
                builder.add_administrator(&m.full_name, &m.email)
            } else {
                builder.add_member(&m.full_name, &m.email)
            }
            .context(RejectedSnafu {
                step: 0usize,
                action: "setup",
            })?;
            roster.push(id);
        }
        Ok(Replay {
            engine: builder.build(),
            roster,
            election: None,
        })
    }

    fn member(&self, step: usize, position: usize) -> SessionResult<MemberId> {
        match position.checked_sub(1).and_then(|idx| self.roster.get(idx)) {
            Some(id) => Ok(*id),
            None => UnknownMemberSnafu {
                step,
                position,
                roster: self.roster.len(),
            }
            .fail(),
        }
    }

    fn office(&self, step: usize, name: &str) -> SessionResult<OfficeId> {
        self.engine
            .office_by_name(name)
            .map(|o| o.id)
            .context(UnknownOfficeSnafu { step, name })
    }

    fn election(&self, step: usize) -> SessionResult<ElectionId> {
        self.election.context(NoElectionSnafu { step })
    }

    fn candidate(&self, step: usize, office_name: &str, position: usize) -> SessionResult<CandidateId> {
        let election = self.election(step)?;
        let office = self.office(step, office_name)?;
        let member = self.member(step, position)?;
        self.engine
            .candidates(election, office)
            .iter()
            .find(|c| c.member == member)
            .map(|c| c.id)
            .context(UnknownCandidateSnafu {
                step,
                position,
                office: office_name,
            })
    }

    /// Applies one step. Script errors abort the replay, the outcome of every engine call of
    /// the step is returned for checking.
    fn apply(&mut self, step: usize, action: &Action) -> SessionResult<Vec<ElectionResult<()>>> {
        let res = match action {
            Action::CreateElection { name } => {
                let res = self.engine.create_election(match name {
                    Some(n) => n.as_str(),
                    None => "",
                });
                if let Ok(e) = res.as_ref() {
                    self.election = Some(e.id);
                }
                vec![res.map(|_| ())]
            }
            Action::InitializeAttendance => {
                let election = self.election(step)?;
                vec![self.engine.initialize_attendance(election).map(|count| {
                    debug!("step {}: {} attendance record(s) seeded", step, count);
                })]
            }
            Action::MarkPresent { members, present } => {
                let election = self.election(step)?;
                let mut res = Vec::new();
                for position in members.iter() {
                    let member = self.member(step, *position)?;
                    res.push(
                        self.engine
                            .mark_present(election, member, present.unwrap_or(true)),
                    );
                }
                res
            }
            Action::OpenOffice { office } => {
                let election = self.election(step)?;
                let office = self.office(step, office)?;
                vec![self.engine.open_office(election, office).map(|_| ())]
            }
            Action::OpenNext => {
                let election = self.election(step)?;
                vec![self.engine.open_next(election).map(|opened| match opened {
                    Some(eo) => info!("step {}: office {} is open", step, eo.office),
                    None => info!("step {}: no office left to open", step),
                })]
            }
            Action::AddCandidate { office, member } => {
                let election = self.election(step)?;
                let office = self.office(step, office)?;
                let member = self.member(step, *member)?;
                vec![self
                    .engine
                    .add_candidate(election, office, member)
                    .map(|_| ())]
            }
            Action::Cast {
                office: office_name,
                candidate,
                voters,
            } => {
                let election = self.election(step)?;
                let office = self.office(step, office_name)?;
                let candidate = self.candidate(step, office_name, *candidate)?;
                let mut res = Vec::new();
                for position in voters.iter() {
                    let voter = self.member(step, *position)?;
                    res.push(
                        self.engine
                            .cast(voter, candidate, office, election)
                            .map(|receipt| {
                                debug!("step {}: {:?}", step, receipt.tally.outcome);
                            }),
                    );
                }
                res
            }
            Action::AdvanceRound { office } => {
                let election = self.election(step)?;
                let office = self.office(step, office)?;
                vec![self.engine.advance_round(election, office).map(|_| ())]
            }
            Action::SetWinner {
                office: office_name,
                candidate,
                round,
            } => {
                let election = self.election(step)?;
                let office = self.office(step, office_name)?;
                let candidate = self.candidate(step, office_name, *candidate)?;
                vec![self
                    .engine
                    .set_winner(election, office, candidate, *round)
                    .map(|_| ())]
            }
            Action::ForceComplete { office, reason } => {
                let election = self.election(step)?;
                let office = self.office(step, office)?;
                let reason = reason.as_deref().unwrap_or("no reason given");
                vec![self.engine.force_complete(election, office, reason)]
            }
            Action::Close => {
                let election = self.election(step)?;
                vec![self.engine.close_election(election)]
            }
            Action::Finalize => {
                let election = self.election(step)?;
                vec![self.engine.finalize_election(election)]
            }
        };
        Ok(res)
    }
}

fn check_outcome(
    step: usize,
    action: &str,
    expected: Option<ErrorKind>,
    res: ElectionResult<()>,
) -> SessionResult<()> {
    match (expected, res) {
        (None, Ok(())) => Ok(()),
        (None, Err(e)) => Err(e).context(RejectedSnafu { step, action }),
        (Some(expected), Ok(())) => MissingRejectionSnafu {
            step,
            action,
            expected,
        }
        .fail(),
        (Some(expected), Err(e)) if e.kind() == expected => {
            info!("step {} ({}): rejected as expected: {}", step, action, e);
            Ok(())
        }
        (Some(expected), Err(e)) => WrongRejectionSnafu {
            step,
            action,
            expected,
            found: e.kind(),
        }
        .fail(),
    }
}

fn replay(script: &SessionScript) -> SessionResult<Replay> {
    let mut replay = Replay::new(script)?;
    for (idx, s) in script.steps.iter().enumerate() {
        let step = idx + 1;
        let expected = match s.expect.as_ref() {
            Some(name) => Some(
                name.parse::<ErrorKind>()
                    .context(UnknownExpectationSnafu { step })?,
            ),
            None => None,
        };
        // The election name defaults to the one of the session.
        let action = match &s.action {
            Action::CreateElection { name: None } => Action::CreateElection {
                name: Some(script.session_settings.election_name.clone()),
            },
            a => a.clone(),
        };
        debug!("step {}: {:?}", step, action);
        for res in replay.apply(step, &action)? {
            check_outcome(step, action.name(), expected, res)?;
        }
    }
    Ok(replay)
}

fn office_to_json(o: &OfficeResult) -> JSValue {
    let winner: Option<String> = o.winner.and_then(|w| {
        o.candidates
            .iter()
            .find(|c| c.candidate == w)
            .map(|c| c.name.clone())
    });
    let candidates: Vec<JSValue> = o
        .candidates
        .iter()
        .map(|c| {
            json!({
                "name": c.name,
                "avatarKey": c.avatar_key,
                "votes": c.votes,
                "elected": c.elected,
            })
        })
        .collect();
    json!({
        "office": o.office_name,
        "status": o.status.to_string(),
        "round": o.round,
        "quorum": o.quorum,
        "threshold": o.threshold,
        "undecided": o.undecided,
        "winner": winner,
        "wonAtRound": o.won_at_round,
        "candidates": candidates,
    })
}

fn build_summary_js(script: &SessionScript, engine: &Engine) -> SessionResult<JSValue> {
    let latest = engine
        .latest_results()
        .context(RejectedSnafu {
            step: script.steps.len(),
            action: "results",
        })?;
    let status = match latest.as_ref() {
        Some(r) if r.finalized => "finalized",
        Some(r) if r.is_active => "active",
        Some(_) => "closed",
        None => "not created",
    };
    let c = OutputConfig {
        election: latest
            .as_ref()
            .map(|r| r.election_name.clone())
            .unwrap_or_else(|| script.session_settings.election_name.clone()),
        status: status.to_string(),
        offices: engine.offices().into_iter().map(|o| o.name).collect(),
        members: engine.members().len(),
        final_round: engine.rules().final_round,
        runoff_size: engine.rules().runoff_size,
    };
    let results: Vec<JSValue> = latest
        .map(|r| r.offices.iter().map(office_to_json).collect())
        .unwrap_or_default();
    Ok(json!({
        "config": c,
        "results": results }))
}

/// Replays a session script and prints or writes its summary.
///
/// When a reference summary is given, the summary must match it exactly.
pub fn run_session(
    script_path: &str,
    check_summary_path: Option<&str>,
    out_path: Option<&str>,
) -> SessionResult<()> {
    let script = read_script(script_path)?;
    info!(
        "run_session: {} member(s), {} step(s)",
        script.members.len(),
        script.steps.len()
    );
    let replay = replay(&script)?;

    // Assemble the final json
    let result_js = build_summary_js(&script, &replay.engine)?;
    let pretty_js_stats =
        serde_json::to_string_pretty(&result_js).context(SerializingJsonSnafu {})?;

    match out_path {
        None | Some("stdout") => {
            println!("{}", pretty_js_stats);
        }
        Some(path) => {
            info!("run_session: writing summary to {}", path);
            fs::write(path, pretty_js_stats.as_bytes()).context(WritingSummarySnafu { path })?;
        }
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = check_summary_path {
        let summary_ref = read_summary(summary_p)?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(SerializingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference summary");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            return ReferenceMismatchSnafu {}.fail();
        }
        info!("run_session: summary matches {}", summary_p);
    }

    Ok(())
}

#[cfg(test)]
fn run_session_test(test_name: &str, script_lpath: &str, summary_lpath: &str) {
    use snafu::ErrorCompat;

    let test_dir = concat!(env!("CARGO_MANIFEST_DIR"), "/session_data");
    info!("Running test {}", test_name);
    let res = run_session(
        format!("{}/{}/{}", test_dir, test_name, script_lpath).as_str(),
        Some(format!("{}/{}/{}", test_dir, test_name, summary_lpath).as_str()),
        None,
    );
    if let Err(e) = res {
        warn!("Error occured {:?}", e);
        eprintln!("An error occured {}", e);
        if let Some(bt) = ErrorCompat::backtrace(&e) {
            eprintln!("trace: {}", bt);
        } else {
            eprintln!("No trace found");
        }
        panic!("session {} failed: {}", test_name, e);
    }
}

#[cfg(test)]
pub fn test_wrapper(test_name: &str) {
    run_session_test(
        test_name,
        format!("{}_script.json", test_name).as_str(),
        format!("{}_expected_summary.json", test_name).as_str(),
    )
}
