//! Flow engine for encore marketing automation.
//!
//! This crate provides the flow model and everything needed to execute it:
//!
//! - **Definitions**: a trigger plus typed actions connected by simple or
//!   boolean edges, held in a petgraph `DiGraph`
//! - **Graph walker**: picks the next node under the edge model
//! - **Conditions**: boolean checks against a fan's completed orders
//! - **Dispatch**: executes actions against external collaborators
//! - **Run ledger**: durable record of runs and per-node attempts
//! - **Engine**: starts runs from trigger events and advances them, suspending
//!   durably at waits
//! - **Trigger intake**: NATS JetStream consumer of trigger events

pub mod condition;
pub mod contact;
pub mod definition;
pub mod dispatch;
pub mod edge;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod graph;
pub mod ledger;
pub mod nats;
pub mod node;
pub mod order;
pub mod provider;
pub mod render;
pub mod run;
pub mod store;
pub mod suspend;
pub mod template;
pub mod trigger;

#[cfg(test)]
pub(crate) mod testing;

pub use definition::Flow;
pub use dispatch::{ActionDispatcher, ActionOutcome, Collaborators, DispatchConfig};
pub use edge::{Edge, EdgeKind};
pub use engine::{Engine, EngineConfig, FireOutcome, RunProgress, SkipReason};
pub use error::{
    ActionError, ConditionError, DefinitionError, EngineError, LedgerError, ProviderError,
    StoreError, SuspendError,
};
pub use graph::{FlowGraph, Next};
pub use ledger::RunLedger;
pub use node::{Action, ActionKind, ActionType, BooleanCondition, NodeId, WaitUnit};
pub use run::{ActionStatus, FlowRun, FlowRunAction, RunStatus};
pub use store::GraphStore;
pub use suspend::{Clock, Suspender, SystemClock};
pub use trigger::{Recipient, RecipientKey, Trigger, TriggerConfig, TriggerEvent, TriggerKind};
