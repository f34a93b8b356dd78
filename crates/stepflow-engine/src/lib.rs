pub mod condition;
pub mod engine;
pub mod graph;
pub mod guard;
pub mod interpreter;
pub mod registry;
pub mod run;
pub mod sample;
pub mod state;

pub use condition::Condition;
pub use engine::{Engine, GraphInfo, RunInfo};
pub use graph::{CompactGraph, Edge, EdgeCondition, Graph, GraphDefinition, GraphPayload, Node, NodeKind};
pub use guard::LoopGuard;
pub use interpreter::Interpreter;
pub use registry::RunRegistry;
pub use run::{RunHandle, RunOptions, RunSnapshot};
pub use state::StateStore;
