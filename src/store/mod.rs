//! Investigation state store (spec §6): the relational home of
//! `investigation_state`, the row the orchestrator's checkpoint/resume
//! cycle and the outer request layer both read and write.

pub mod investigation_store;
pub mod schema;

pub use investigation_store::InvestigationStore;
