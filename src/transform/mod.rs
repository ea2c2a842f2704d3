//! Transform implementations for pipeline records
//!
//! This module provides the enrichment transformer that replaces one field of
//! each record with a value looked up in an auxiliary store.

mod enricher;
mod lookup;

pub use enricher::LookupEnricher;
pub use lookup::Lookup;
