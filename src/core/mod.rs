//! Core statechart types and logic.
//!
//! This module contains the pure core of the runtime:
//! - State values and the node tree they designate
//! - The state algebra converting between the two
//! - Guard combinators evaluated against snapshots
//! - Immutable history tracking
//!
//! Nothing in this module performs side effects; the interpreter in
//! [`crate::effects`] is the imperative shell around it.

mod action;
mod algebra;
mod guard;
mod history;
mod merge;
mod node;
mod snapshot;
mod value;

pub use action::{
    Action, ActionItem, ActionOutput, ActionRef, Control, Debounce, Delay, DelayRef,
    PromiseRef, PromiseSource, Ref,
};
pub use algebra::{
    active_leaves, collect_tags, diff, entry_actions, exit_actions, flatten, initial_config,
    is_reachable, node_to_value, value_to_node, Diff, FlatMap, ROOT,
};
pub use guard::{Guard, GuardConfig, Predicate, PredicateRef, Resolution};
pub use history::{StateHistory, StateTransition};
pub use merge::{merge, nest, select};
pub use node::{NodeConfig, NodeType, PromiseConfig, Transition};
pub use snapshot::{Event, StateSnapshot, Status, INIT_EVENT};
pub use value::{depth, join_path, next_value, path_to_dotted, StateValue, DELIMITER, DOT};

pub(crate) use value::segments;
