//! Fallback strategy selection.

use std::collections::HashSet;

use interop_core::{FailureCategory, FallbackStrategy, Step};

/// Picks the next fallback strategy for a step that exhausted the
/// retries of its current action.
///
/// Strategies are consulted in declared order; the first one whose
/// condition matches the failure category and that has not been tried
/// yet wins. `None` means the step fails permanently.
pub struct FallbackSelector;

impl FallbackSelector {
    pub fn next_strategy<'a>(
        step: &'a Step,
        tried: &HashSet<String>,
        category: FailureCategory,
    ) -> Option<&'a FallbackStrategy> {
        step.fallbacks
            .iter()
            .find(|f| !tried.contains(&f.id) && f.condition.matches(category))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interop_core::{FallbackCondition, StepAction, StepTarget};

    fn step_with_fallbacks() -> Step {
        Step::new("publish", StepTarget::Publisher, StepAction::StartPublishing)
            .with_fallback(FallbackStrategy::new(
                "publish-via-menu",
                FallbackCondition::Category {
                    category: FailureCategory::ElementNotFound,
                },
                StepAction::StartPublishing,
            ))
            .with_fallback(FallbackStrategy::new(
                "publish-after-reload",
                FallbackCondition::Any,
                StepAction::StartPublishing,
            ))
    }

    #[test]
    fn test_first_matching_untried_wins() {
        let step = step_with_fallbacks();
        let tried = HashSet::new();

        let chosen =
            FallbackSelector::next_strategy(&step, &tried, FailureCategory::ElementNotFound)
                .expect("should pick a strategy");
        assert_eq!(chosen.id, "publish-via-menu");
    }

    #[test]
    fn test_condition_mismatch_skips_strategy() {
        let step = step_with_fallbacks();
        let tried = HashSet::new();

        let chosen = FallbackSelector::next_strategy(&step, &tried, FailureCategory::Timeout)
            .expect("catch-all should match");
        assert_eq!(chosen.id, "publish-after-reload");
    }

    #[test]
    fn test_tried_strategies_are_not_reused() {
        let step = step_with_fallbacks();
        let mut tried = HashSet::new();
        tried.insert("publish-via-menu".to_string());

        let chosen =
            FallbackSelector::next_strategy(&step, &tried, FailureCategory::ElementNotFound)
                .expect("second strategy still available");
        assert_eq!(chosen.id, "publish-after-reload");

        tried.insert("publish-after-reload".to_string());
        assert!(
            FallbackSelector::next_strategy(&step, &tried, FailureCategory::ElementNotFound)
                .is_none()
        );
    }

    #[test]
    fn test_step_without_fallbacks_exhausts_immediately() {
        let step = Step::new("join", StepTarget::Subscriber, StepAction::Launch);
        assert!(
            FallbackSelector::next_strategy(&step, &HashSet::new(), FailureCategory::Timeout)
                .is_none()
        );
    }
}
