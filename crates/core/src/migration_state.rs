//! Migration state machine and transition guards.
//!
//! The session orchestrator owns the current [`MigrationState`]; this module
//! only answers "where can it go next, and is it allowed to". No I/O.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    Uploading,
    Mapping,
    Configuring,
    Previewing,
    Committing,
    Completed,
    Failed,
}

impl MigrationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploading => "uploading",
            Self::Mapping => "mapping",
            Self::Configuring => "configuring",
            Self::Previewing => "previewing",
            Self::Committing => "committing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// `Completed` and `Failed` end the flow; only a restart leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for MigrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which stage sequence a migration follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationFlow {
    /// Foreign-source import with column mapping and configuration steps.
    Full,
    /// Native-template import: upload, preview, commit.
    Simple,
}

const FULL_STAGES: &[MigrationState] = &[
    MigrationState::Uploading,
    MigrationState::Mapping,
    MigrationState::Configuring,
    MigrationState::Previewing,
    MigrationState::Committing,
];

const SIMPLE_STAGES: &[MigrationState] = &[
    MigrationState::Uploading,
    MigrationState::Previewing,
    MigrationState::Committing,
];

impl MigrationFlow {
    /// Non-terminal stages in forward order.
    pub fn stages(&self) -> &'static [MigrationState] {
        match self {
            Self::Full => FULL_STAGES,
            Self::Simple => SIMPLE_STAGES,
        }
    }

    pub fn next(&self, state: MigrationState) -> Option<MigrationState> {
        let stages = self.stages();
        let pos = stages.iter().position(|s| *s == state)?;
        stages.get(pos + 1).copied()
    }

    pub fn previous(&self, state: MigrationState) -> Option<MigrationState> {
        let stages = self.stages();
        let pos = stages.iter().position(|s| *s == state)?;
        pos.checked_sub(1).map(|p| stages[p])
    }

    pub fn includes(&self, state: MigrationState) -> bool {
        state.is_terminal() || self.stages().contains(&state)
    }
}

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

/// Snapshot of session facts the guards look at.
#[derive(Debug, Clone, Default)]
pub struct GuardContext {
    pub validated_records: usize,
    pub unmapped_required: Vec<String>,
    pub outstanding_errors: usize,
}

/// Check whether `from` may advance one stage forward and return the target.
///
/// `Committing` is not advanced through this function: its outcome is decided
/// by [`terminal_state`] once the executor has finished.
pub fn check_advance(
    flow: MigrationFlow,
    from: MigrationState,
    ctx: &GuardContext,
) -> Result<MigrationState, CoreError> {
    if from.is_terminal() {
        return Err(invalid(
            from,
            MigrationState::Uploading,
            "the migration has finished; restart it from the upload step",
        ));
    }
    if from == MigrationState::Committing {
        return Err(invalid(
            from,
            MigrationState::Completed,
            "the commit outcome decides the final state",
        ));
    }

    let to = flow.next(from).ok_or_else(|| {
        invalid(from, from, "this stage is not part of the migration flow")
    })?;

    match from {
        MigrationState::Uploading if ctx.validated_records == 0 => Err(invalid(
            from,
            to,
            "the file has no valid records",
        )),
        MigrationState::Mapping if !ctx.unmapped_required.is_empty() => {
            Err(CoreError::MappingIncomplete {
                fields: ctx.unmapped_required.clone(),
            })
        }
        MigrationState::Previewing if ctx.outstanding_errors > 0 => Err(invalid(
            from,
            to,
            &format!(
                "{} validation error(s) must be fixed or excluded first",
                ctx.outstanding_errors
            ),
        )),
        _ => Ok(to),
    }
}

/// Check whether `from` may step back one stage and return the target.
pub fn check_back(flow: MigrationFlow, from: MigrationState) -> Result<MigrationState, CoreError> {
    match from {
        s if s.is_terminal() => Err(invalid(
            from,
            MigrationState::Uploading,
            "the migration has finished; restart it from the upload step",
        )),
        MigrationState::Committing => Err(invalid(
            from,
            MigrationState::Previewing,
            "a commit in progress cannot be undone",
        )),
        _ => flow
            .previous(from)
            .ok_or_else(|| invalid(from, from, "already at the first stage")),
    }
}

/// Final state after a commit: `Failed` only when at least one batch was
/// submitted and none succeeded.
pub fn terminal_state(batches_submitted: usize, batches_succeeded: usize) -> MigrationState {
    if batches_submitted > 0 && batches_succeeded == 0 {
        MigrationState::Failed
    } else {
        MigrationState::Completed
    }
}

fn invalid(from: MigrationState, to: MigrationState, reason: &str) -> CoreError {
    CoreError::InvalidTransition {
        from,
        to,
        reason: reason.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn ready() -> GuardContext {
        GuardContext {
            validated_records: 3,
            unmapped_required: vec![],
            outstanding_errors: 0,
        }
    }

    #[test]
    fn full_flow_walks_every_stage() {
        let flow = MigrationFlow::Full;
        let mut state = MigrationState::Uploading;
        let mut visited = vec![state];
        while state != MigrationState::Committing {
            state = check_advance(flow, state, &ready()).unwrap();
            visited.push(state);
        }
        assert_eq!(visited, FULL_STAGES);
    }

    #[test]
    fn simple_flow_skips_mapping_and_configuring() {
        let flow = MigrationFlow::Simple;
        assert_eq!(
            check_advance(flow, MigrationState::Uploading, &ready()).unwrap(),
            MigrationState::Previewing
        );
        assert!(!flow.includes(MigrationState::Mapping));
        assert!(flow.includes(MigrationState::Completed));
    }

    #[test]
    fn upload_requires_a_valid_record() {
        let ctx = GuardContext {
            validated_records: 0,
            ..ready()
        };
        assert_matches!(
            check_advance(MigrationFlow::Simple, MigrationState::Uploading, &ctx),
            Err(CoreError::InvalidTransition { from: MigrationState::Uploading, .. })
        );
    }

    #[test]
    fn mapping_requires_required_fields() {
        let ctx = GuardContext {
            unmapped_required: vec!["email".into()],
            ..ready()
        };
        let err = check_advance(MigrationFlow::Full, MigrationState::Mapping, &ctx).unwrap_err();
        assert_matches!(&err, CoreError::MappingIncomplete { fields } if fields == &["email"]);
        assert!(err.to_string().contains("email"));
    }

    #[test]
    fn preview_requires_zero_outstanding_errors() {
        let ctx = GuardContext {
            outstanding_errors: 2,
            ..ready()
        };
        let err = check_advance(MigrationFlow::Full, MigrationState::Previewing, &ctx).unwrap_err();
        assert!(err.to_string().contains("2 validation error(s)"));
    }

    #[test]
    fn committing_and_terminal_states_do_not_advance() {
        for state in [
            MigrationState::Committing,
            MigrationState::Completed,
            MigrationState::Failed,
        ] {
            assert!(check_advance(MigrationFlow::Full, state, &ready()).is_err());
        }
    }

    #[test]
    fn back_is_allowed_until_commit() {
        let flow = MigrationFlow::Full;
        assert_eq!(
            check_back(flow, MigrationState::Previewing).unwrap(),
            MigrationState::Configuring
        );
        assert_eq!(
            check_back(MigrationFlow::Simple, MigrationState::Previewing).unwrap(),
            MigrationState::Uploading
        );
        assert!(check_back(flow, MigrationState::Uploading).is_err());
        assert!(check_back(flow, MigrationState::Committing).is_err());
        assert!(check_back(flow, MigrationState::Completed).is_err());
    }

    #[test]
    fn terminal_state_fails_only_when_nothing_succeeded() {
        assert_eq!(terminal_state(3, 0), MigrationState::Failed);
        assert_eq!(terminal_state(3, 1), MigrationState::Completed);
        assert_eq!(terminal_state(0, 0), MigrationState::Completed);
    }

    #[test]
    fn state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&MigrationState::Previewing).unwrap(),
            "\"previewing\""
        );
        assert_eq!(MigrationState::Failed.to_string(), "failed");
    }
}
