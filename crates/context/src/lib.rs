//! TAi Context Engine
//!
//! Turns one student question into the message list for the answering model:
//! route, retrieve, then pack everything under the token budget.

pub mod pipeline;

pub use pipeline::{PreparedContext, RetrievalPipeline, NO_RELEVANT_MATERIAL};
