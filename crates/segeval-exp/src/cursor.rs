use segeval_core::errors::{ErrorInfo, EvalError};
use serde::{Deserialize, Serialize};

/// Navigation request issued by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Navigation {
    First,
    Previous,
    Next,
    Last,
}

impl Navigation {
    /// Whether leaving the current slot this way asks for confirmation first.
    pub fn needs_confirmation(self) -> bool {
        !matches!(self, Navigation::Previous)
    }

    pub fn label(self) -> &'static str {
        match self {
            Navigation::First => "first",
            Navigation::Previous => "previous",
            Navigation::Next => "next",
            Navigation::Last => "last",
        }
    }
}

/// Result of planning or applying a navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Step {
    Move { from: usize, to: usize },
    AlreadyFirst,
    AlreadyLast,
}

impl Step {
    pub fn moved(&self) -> bool {
        matches!(self, Step::Move { .. })
    }
}

/// Position within a presentation order of `total` slots.
///
/// The index is clamped to `0..total`; requests past either end are reported
/// as [`Step::AlreadyFirst`] or [`Step::AlreadyLast`] and leave it unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CursorState")]
pub struct EvaluationCursor {
    index: usize,
    total: usize,
}

#[derive(Deserialize)]
struct CursorState {
    index: usize,
    total: usize,
}

impl TryFrom<CursorState> for EvaluationCursor {
    type Error = EvalError;

    fn try_from(state: CursorState) -> Result<Self, Self::Error> {
        let mut cursor = Self::new(state.total)?;
        if state.index >= state.total {
            return Err(EvalError::Navigation(
                ErrorInfo::new("navigation.index", "cursor index outside the presentation order")
                    .with_context("index", state.index.to_string())
                    .with_context("total", state.total.to_string()),
            ));
        }
        cursor.index = state.index;
        Ok(cursor)
    }
}

impl EvaluationCursor {
    /// Creates a cursor at the first slot. An empty order has no valid position.
    pub fn new(total: usize) -> Result<Self, EvalError> {
        if total == 0 {
            return Err(EvalError::Navigation(ErrorInfo::new(
                "navigation.empty-order",
                "cannot navigate an empty presentation order",
            )));
        }
        Ok(Self { index: 0, total })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// One-based position shown to the evaluator.
    pub fn current_evaluation(&self) -> usize {
        self.index + 1
    }

    pub fn total_evaluations(&self) -> usize {
        self.total
    }

    pub fn is_first(&self) -> bool {
        self.index == 0
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 == self.total
    }

    pub fn progress_fraction(&self) -> f64 {
        self.current_evaluation() as f64 / self.total as f64
    }

    /// Computes where `navigation` would lead without moving.
    pub fn plan(&self, navigation: Navigation) -> Step {
        let last = self.total - 1;
        let target = match navigation {
            Navigation::First | Navigation::Previous if self.is_first() => {
                return Step::AlreadyFirst
            }
            Navigation::Next | Navigation::Last if self.is_last() => return Step::AlreadyLast,
            Navigation::First => 0,
            Navigation::Previous => self.index - 1,
            Navigation::Next => self.index + 1,
            Navigation::Last => last,
        };
        Step::Move {
            from: self.index,
            to: target.min(last),
        }
    }

    /// Applies a planned step. Non-moving steps are ignored.
    pub fn apply(&mut self, step: Step) {
        if let Step::Move { to, .. } = step {
            self.index = to.min(self.total - 1);
        }
    }

    pub fn first(&mut self) -> Step {
        self.navigate(Navigation::First)
    }

    pub fn previous(&mut self) -> Step {
        self.navigate(Navigation::Previous)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Step {
        self.navigate(Navigation::Next)
    }

    pub fn last(&mut self) -> Step {
        self.navigate(Navigation::Last)
    }

    fn navigate(&mut self, navigation: Navigation) -> Step {
        let step = self.plan(navigation);
        self.apply(step);
        step
    }
}
