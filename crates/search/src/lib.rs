//! TAi Retrieval
//!
//! Query routing and the three graph retrieval strategies:
//! - `router`: ordered-precedence classification and entity extraction
//! - `retrieval`: local, global, and hybrid search behind a strategy factory

pub mod retrieval;
pub mod router;

pub use retrieval::{
    GlobalSearch, GlobalSearchResult, HybridSearch, LocalSearch, SearchEngines, SearchInstance,
    VectorIndex,
};
pub use router::{QueryRouter, RoutingResult, SearchStrategy};
