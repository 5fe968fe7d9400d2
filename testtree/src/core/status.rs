//! Node statuses and the precedence-based aggregator.
//!
//! Aggregation is a pure function of a status multiset: the result never
//! depends on child order and recomputing without new input is a no-op.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::error::TreeError;

/// Closed set of node statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Empty,
    Idle,
    Queued,
    Running,
    Passed,
    Incomplete,
    Warning,
    Failed,
    Error,
}

impl Status {
    pub const ALL: [Status; 9] = [
        Status::Empty,
        Status::Idle,
        Status::Queued,
        Status::Running,
        Status::Passed,
        Status::Incomplete,
        Status::Warning,
        Status::Failed,
        Status::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Empty => "empty",
            Status::Idle => "idle",
            Status::Queued => "queued",
            Status::Running => "running",
            Status::Passed => "passed",
            Status::Incomplete => "incomplete",
            Status::Warning => "warning",
            Status::Failed => "failed",
            Status::Error => "error",
        }
    }

    /// True while a run is still expected to report for this node.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Status::Queued | Status::Running)
    }

    pub fn is_failing(self) -> bool {
        matches!(self, Status::Failed | Status::Error)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered status list used to pick a parent's status, highest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precedence {
    order: Vec<Status>,
    rank: [usize; Status::ALL.len()],
}

impl Default for Precedence {
    fn default() -> Self {
        Self::from_order(vec![
            Status::Error,
            Status::Failed,
            Status::Warning,
            Status::Incomplete,
            Status::Passed,
            Status::Running,
            Status::Queued,
            Status::Idle,
            Status::Empty,
        ])
    }
}

impl Precedence {
    /// Build a precedence from a highest-first order.
    ///
    /// The order must name every status exactly once.
    pub fn new(highest_first: Vec<Status>) -> Result<Self, TreeError> {
        if highest_first.len() != Status::ALL.len() {
            return Err(TreeError::InvalidPrecedence(format!(
                "expected {} statuses, got {}",
                Status::ALL.len(),
                highest_first.len()
            )));
        }
        for status in Status::ALL {
            if !highest_first.contains(&status) {
                return Err(TreeError::InvalidPrecedence(format!(
                    "status '{status}' is missing"
                )));
            }
        }
        Ok(Self::from_order(highest_first))
    }

    fn from_order(order: Vec<Status>) -> Self {
        let mut rank = [0; Status::ALL.len()];
        for (index, status) in order.iter().enumerate() {
            rank[*status as usize] = order.len() - index;
        }
        Self { order, rank }
    }

    /// Statuses from highest to lowest precedence.
    pub fn order(&self) -> &[Status] {
        &self.order
    }

    /// Higher number wins.
    pub fn rank(&self, status: Status) -> usize {
        self.rank[status as usize]
    }

    pub fn highest(&self, a: Status, b: Status) -> Status {
        if self.rank(b) > self.rank(a) { b } else { a }
    }

    /// Highest-precedence status of the multiset, or `None` when it is empty.
    pub fn aggregate<I>(&self, statuses: I) -> Option<Status>
    where
        I: IntoIterator<Item = Status>,
    {
        statuses.into_iter().reduce(|acc, status| self.highest(acc, status))
    }

    /// Status of a node given its own run state and its children's statuses.
    ///
    /// A loaded container with no children and no run state of its own is
    /// `empty`; any other childless node keeps its own status.
    pub fn resolve<I>(&self, own: Status, children: I, container: bool) -> Status
    where
        I: IntoIterator<Item = Status>,
    {
        match self.aggregate(children) {
            Some(child) => self.highest(own, child),
            None if container && own == Status::Idle => Status::Empty,
            None => own,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Precedence example: {passed, warning, idle} -> warning; adding error -> error.
    #[test]
    fn aggregate_picks_highest_precedence() {
        let precedence = Precedence::default();
        let mut statuses = vec![Status::Passed, Status::Warning, Status::Idle];
        assert_eq!(precedence.aggregate(statuses.clone()), Some(Status::Warning));

        statuses.push(Status::Error);
        assert_eq!(precedence.aggregate(statuses), Some(Status::Error));
    }

    #[test]
    fn aggregate_of_nothing_is_none() {
        assert_eq!(Precedence::default().aggregate(Vec::new()), None);
    }

    #[test]
    fn resolve_marks_childless_idle_container_empty() {
        let precedence = Precedence::default();
        assert_eq!(precedence.resolve(Status::Idle, [], true), Status::Empty);
        assert_eq!(precedence.resolve(Status::Idle, [], false), Status::Idle);
        assert_eq!(precedence.resolve(Status::Error, [], true), Status::Error);
    }

    /// A container's own run state competes with its children.
    #[test]
    fn resolve_combines_own_and_children() {
        let precedence = Precedence::default();
        assert_eq!(
            precedence.resolve(Status::Running, [Status::Queued, Status::Queued], true),
            Status::Running
        );
        assert_eq!(
            precedence.resolve(Status::Idle, [Status::Passed, Status::Failed], true),
            Status::Failed
        );
    }

    #[test]
    fn new_rejects_incomplete_order() {
        let err = Precedence::new(vec![Status::Error, Status::Failed]).expect_err("short");
        assert!(matches!(err, TreeError::InvalidPrecedence(_)));

        let mut order = Precedence::default().order().to_vec();
        order[0] = Status::Failed;
        let err = Precedence::new(order).expect_err("duplicate");
        assert_eq!(
            err,
            TreeError::InvalidPrecedence("status 'error' is missing".to_string())
        );
    }

    /// A custom order changes which status wins.
    #[test]
    fn custom_order_is_respected() {
        let mut order = Precedence::default().order().to_vec();
        order.swap(1, 2);
        let precedence = Precedence::new(order).expect("valid");
        assert_eq!(
            precedence.aggregate([Status::Failed, Status::Warning]),
            Some(Status::Warning)
        );
    }

    fn any_status() -> impl Strategy<Value = Status> {
        prop::sample::select(Status::ALL.to_vec())
    }

    proptest! {
        /// Aggregation does not depend on child order.
        #[test]
        fn aggregate_is_order_independent(
            statuses in prop::collection::vec(any_status(), 0..16)
                .prop_shuffle()
                .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle())),
        ) {
            let precedence = Precedence::default();
            let (left, right) = statuses;
            prop_assert_eq!(precedence.aggregate(left), precedence.aggregate(right));
        }

        /// Folding a status back into its own aggregate changes nothing.
        #[test]
        fn aggregate_is_idempotent(statuses in prop::collection::vec(any_status(), 1..16)) {
            let precedence = Precedence::default();
            let once = precedence.aggregate(statuses.clone()).expect("non-empty");
            let mut again = statuses;
            again.push(once);
            prop_assert_eq!(precedence.aggregate(again), Some(once));
        }
    }
}
