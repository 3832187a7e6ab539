//! Builder API for ergonomic machine construction.
//!
//! Builders stand in for a declarative config compiler: they produce node
//! trees whose references are names (resolved against the machine's option
//! maps) or inline closures, and they reject malformed trees before a
//! [`Machine`](crate::Machine) is compiled.

pub mod error;
pub mod machine;
pub mod macros;
pub mod node;
pub mod transition;

pub use error::BuildError;
pub use machine::MachineBuilder;
pub use node::{NodeBuilder, PromiseBuilder};
pub use transition::TransitionBuilder;
