pub mod engine;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, ReceptiveFlow};
pub use states::{FlowAction, FlowContext, FlowEvent, FlowStep, TransitionOutcome};
