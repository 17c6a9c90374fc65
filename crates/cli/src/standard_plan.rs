//! The built-in two-session interop scenario: publisher and subscriber
//! join the same channel, media flows both ways, windows are placed
//! side by side and a human confirms what they see.

use std::time::Duration;

use serde_json::{Map, Value};

use interop_core::{
    ExecutionPlan, ExpectedOutcome, FailureCategory, FallbackCondition, FallbackStrategy,
    SessionRole, SessionState, Step, StepAction, StepTarget,
};

const JOIN_TIMEOUT: Duration = Duration::from_secs(45);
const MEDIA_TIMEOUT: Duration = Duration::from_secs(60);
const WINDOW_WIDTH: u32 = 960;
const WINDOW_HEIGHT: u32 = 1080;

pub fn build(url: &str, channel: &str) -> ExecutionPlan {
    let mut steps = side(SessionRole::Publisher, url, channel);
    steps.extend(side(SessionRole::Subscriber, url, channel));
    steps.push(Step::new(
        "verify",
        StepTarget::Both,
        StepAction::AwaitVerification {
            instructions: format!(
                "Check both windows for channel '{channel}': the publisher preview \
                 and the subscriber playback must show the same moving video, and \
                 audio must be audible on the subscriber side."
            ),
        },
    ));
    ExecutionPlan::new(format!("interop: {channel}"), steps)
}

fn side(role: SessionRole, url: &str, channel: &str) -> Vec<Step> {
    let (prefix, target, x) = match role {
        SessionRole::Publisher => ("pub", StepTarget::Publisher, 0),
        SessionRole::Subscriber => ("sub", StepTarget::Subscriber, WINDOW_WIDTH as i32),
    };

    let stream_step = match role {
        SessionRole::Publisher => Step::new(
            format!("{prefix}-publish"),
            target,
            StepAction::StartPublishing,
        ),
        SessionRole::Subscriber => Step::new(
            format!("{prefix}-subscribe"),
            target,
            StepAction::StartSubscribing,
        ),
    }
    .with_expected(ExpectedOutcome::SessionStateIs {
        state: SessionState::StreamActive,
    });

    let media_description = match role {
        SessionRole::Publisher => "local camera preview shows moving video",
        SessionRole::Subscriber => "remote video tile is rendering frames",
    };

    vec![
        Step::new(format!("{prefix}-launch"), target, StepAction::Launch),
        Step::new(
            format!("{prefix}-navigate"),
            target,
            StepAction::Navigate {
                url: url.to_string(),
            },
        ),
        Step::new(
            format!("{prefix}-join"),
            target,
            StepAction::JoinChannel {
                channel_id: channel.to_string(),
            },
        )
        .with_timeout(JOIN_TIMEOUT)
        // Join dialogs are the flakiest part of every meeting UI; a
        // reload before the next join usually clears a stuck dialog.
        .with_fallback(
            FallbackStrategy::new(
                format!("{prefix}-join-after-reload"),
                FallbackCondition::AnyOf {
                    categories: vec![FailureCategory::ElementNotFound, FailureCategory::Timeout],
                },
                StepAction::JoinChannel {
                    channel_id: channel.to_string(),
                },
            )
            .with_params(reload_params())
            .with_max_attempts(1),
        ),
        stream_step,
        Step::new(
            format!("{prefix}-media"),
            target,
            StepAction::WaitForMedia {
                description: media_description.to_string(),
            },
        )
        .with_timeout(MEDIA_TIMEOUT),
        Step::new(
            format!("{prefix}-position"),
            target,
            StepAction::PositionWindow {
                x,
                y: 0,
                width: WINDOW_WIDTH,
                height: WINDOW_HEIGHT,
            },
        ),
    ]
}

fn reload_params() -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("reload_first".to_string(), Value::Bool(true));
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_plan_is_valid() {
        let plan = build("https://meet.example.com", "room-1");
        plan.validate().unwrap();
    }

    #[test]
    fn test_barrier_is_the_verification_step() {
        let plan = build("https://meet.example.com", "room-1");
        let barrier = plan.barrier_position().unwrap();
        assert_eq!(barrier, plan.steps.len() - 1);
        assert!(plan.steps[barrier].is_verification());
    }

    #[test]
    fn test_sides_are_symmetric() {
        let plan = build("https://meet.example.com", "room-1");
        let publisher = plan.steps_for(SessionRole::Publisher);
        let subscriber = plan.steps_for(SessionRole::Subscriber);
        assert_eq!(publisher.len(), 6);
        assert_eq!(subscriber.len(), 6);
    }

    #[test]
    fn test_join_step_has_reload_fallback() {
        let plan = build("https://meet.example.com", "room-1");
        let join = plan.steps.iter().find(|s| s.id == "pub-join").unwrap();
        assert_eq!(join.fallbacks.len(), 1);
        assert!(join
            .fallbacks[0]
            .condition
            .matches(FailureCategory::Timeout));
    }
}
