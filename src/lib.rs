//! Statecharts: a hierarchical and parallel statechart interpreter
//!
//! Statecharts follows a "pure core, imperative shell" layout. The core
//! (state values, the node tree, the algebra between them, guards and
//! history) is made of pure functions. The interpreter is the only place
//! where actions run, timers fire and promises settle, and it serializes
//! all of that through one scheduler.
//!
//! # Core Concepts
//!
//! - **Machine**: An immutable, compiled node tree plus the named callables it references
//! - **StateValue**: The current state, a leaf name or nested region map
//! - **Interpreter**: A running machine reacting to events
//! - **Diagnostics**: Warnings and errors collected instead of panicking
//!
//! # Example
//!
//! ```rust
//! use statecharts::builder::{MachineBuilder, NodeBuilder, TransitionBuilder};
//! use statecharts::core::ActionOutput;
//! use statecharts::{Interpreter, StateValue};
//! use serde_json::json;
//!
//! let machine = MachineBuilder::new(
//!     NodeBuilder::new()
//!         .initial("idle")
//!         .state("idle", NodeBuilder::new().on("NEXT", TransitionBuilder::new().to("done").action("inc")))
//!         .state("done", NodeBuilder::new().tag("finished")),
//! )
//! .context(json!({ "iterator": 0 }))
//! .action("inc", |s| {
//!     let n = s.context["iterator"].as_i64().unwrap_or(0);
//!     ActionOutput::new().assign(json!({ "iterator": n + 1 }))
//! })
//! .build()
//! .unwrap();
//!
//! let service = Interpreter::new(machine);
//! service.start().unwrap();
//! service.send("NEXT").unwrap();
//!
//! assert_eq!(service.value(), StateValue::leaf("done"));
//! assert_eq!(service.select("iterator"), Some(json!(1)));
//! assert!(service.state().has_tag("finished"));
//! ```

pub mod builder;
pub mod config;
pub mod core;
pub mod diagnostics;
pub mod effects;
pub mod machine;

// Re-export commonly used types
pub use builder::{BuildError, MachineBuilder, NodeBuilder, PromiseBuilder, TransitionBuilder};
pub use config::{InterpreterConfig, Mode};
pub use core::{ActionOutput, Event, StateHistory, StateSnapshot, StateValue, Status};
pub use diagnostics::Diagnostic;
pub use effects::{InterpreterError, Interpreter, SubscribeOptions, Subscriber, Subscription};
pub use machine::Machine;
