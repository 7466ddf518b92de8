//! The full auto-mode arbitration table (§4.6 "send"), as one pure
//! function. DESIGN NOTES forbids adding heuristics beyond this table, so
//! every call site (CLI, tests) goes through `decide_send_mode` rather than
//! re-deriving the logic.

use crate::domain::errors::LieutenantError;
use crate::domain::models::rpc_message::RpcCommand;
use crate::domain::models::worker::WorkerStatus;

/// Caller-requested delivery mode for `LieutenantManager::send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    Prompt,
    Steer,
    FollowUp,
}

impl Default for SendMode {
    fn default() -> Self {
        Self::Prompt
    }
}

/// The resolved outcome of arbitrating a `send` request against the
/// worker's current status.
#[derive(Debug, Clone)]
pub struct EffectiveSend {
    pub command: RpcCommand,
    /// Whether the caller's `prompt` was silently downgraded to `followUp`
    /// because the worker was already `working` (§4.6 table row 2).
    pub auto_downgraded: bool,
    /// Whether this send should increment `taskCount` (only a genuinely
    /// delivered `idle`-status `prompt`).
    pub increment_task_count: bool,
    /// Whether this send should clear `lastOutput` before dispatch (only a
    /// genuinely delivered `idle`-status `prompt`).
    pub clear_last_output: bool,
}

/// Implements the full table in spec §4.6:
///
/// | current × requested | effective | effect |
/// |---|---|---|
/// | idle × prompt | prompt | increment taskCount, clear lastOutput |
/// | working × prompt | **followUp** (downgraded) | no increment |
/// | working × steer | steer | |
/// | working × followUp | followUp | |
/// | paused × * | — | `LieutenantError::Paused` |
/// | idle × steer / idle × followUp | delivered as-is | worker-dependent |
pub fn decide_send_mode(
    current: WorkerStatus,
    requested: SendMode,
    message: String,
) -> Result<EffectiveSend, LieutenantError> {
    match current {
        WorkerStatus::Paused => Err(LieutenantError::Paused(String::new())),
        WorkerStatus::Starting | WorkerStatus::Done | WorkerStatus::Error => {
            Err(LieutenantError::NotReady(String::new(), current.as_str()))
        }
        WorkerStatus::Idle => match requested {
            SendMode::Prompt => Ok(EffectiveSend {
                command: RpcCommand::Prompt { message },
                auto_downgraded: false,
                increment_task_count: true,
                clear_last_output: true,
            }),
            SendMode::Steer => Ok(EffectiveSend {
                command: RpcCommand::Steer { message },
                auto_downgraded: false,
                increment_task_count: false,
                clear_last_output: false,
            }),
            SendMode::FollowUp => Ok(EffectiveSend {
                command: RpcCommand::FollowUp { message },
                auto_downgraded: false,
                increment_task_count: false,
                clear_last_output: false,
            }),
        },
        WorkerStatus::Working => match requested {
            SendMode::Prompt => Ok(EffectiveSend {
                command: RpcCommand::FollowUp { message },
                auto_downgraded: true,
                increment_task_count: false,
                clear_last_output: false,
            }),
            SendMode::Steer => Ok(EffectiveSend {
                command: RpcCommand::Steer { message },
                auto_downgraded: false,
                increment_task_count: false,
                clear_last_output: false,
            }),
            SendMode::FollowUp => Ok(EffectiveSend {
                command: RpcCommand::FollowUp { message },
                auto_downgraded: false,
                increment_task_count: false,
                clear_last_output: false,
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_prompt_increments_and_clears() {
        let result = decide_send_mode(WorkerStatus::Idle, SendMode::Prompt, "go".into()).unwrap();
        assert!(result.increment_task_count);
        assert!(result.clear_last_output);
        assert!(!result.auto_downgraded);
        assert!(matches!(result.command, RpcCommand::Prompt { .. }));
    }

    #[test]
    fn working_prompt_downgrades_to_follow_up_without_incrementing() {
        let result = decide_send_mode(WorkerStatus::Working, SendMode::Prompt, "task 2".into()).unwrap();
        assert!(!result.increment_task_count);
        assert!(result.auto_downgraded);
        match result.command {
            RpcCommand::FollowUp { message } => assert_eq!(message, "task 2"),
            other => panic!("expected follow_up, got {other:?}"),
        }
    }

    #[test]
    fn working_steer_is_not_downgraded() {
        let result = decide_send_mode(WorkerStatus::Working, SendMode::Steer, "stop".into()).unwrap();
        assert!(!result.auto_downgraded);
        assert!(matches!(result.command, RpcCommand::Steer { .. }));
    }

    #[test]
    fn working_follow_up_passes_through() {
        let result = decide_send_mode(WorkerStatus::Working, SendMode::FollowUp, "also this".into()).unwrap();
        assert!(!result.auto_downgraded);
        assert!(matches!(result.command, RpcCommand::FollowUp { .. }));
    }

    #[test]
    fn paused_rejects_every_mode() {
        for mode in [SendMode::Prompt, SendMode::Steer, SendMode::FollowUp] {
            let result = decide_send_mode(WorkerStatus::Paused, mode, "x".into());
            assert!(matches!(result, Err(LieutenantError::Paused(_))));
        }
    }

    #[test]
    fn idle_steer_and_follow_up_pass_through_without_task_count() {
        for mode in [SendMode::Steer, SendMode::FollowUp] {
            let result = decide_send_mode(WorkerStatus::Idle, mode, "x".into()).unwrap();
            assert!(!result.increment_task_count);
        }
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn taskcount_never_increments_on_a_downgrade(msg in ".*") {
                let result = decide_send_mode(WorkerStatus::Working, SendMode::Prompt, msg).unwrap();
                prop_assert!(result.auto_downgraded);
                prop_assert!(!result.increment_task_count);
                prop_assert!(matches!(result.command, RpcCommand::FollowUp { .. }));
            }
        }
    }
}
