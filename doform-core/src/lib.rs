//! doform core
//!
//! Provider-agnostic machinery for declarative infrastructure: typed attribute
//! trees and schemas, the diff engine, effects and their interpreter, waiting on
//! long-running upstream work, and list data sources with filter and sort.

pub mod codec;
pub mod datalist;
pub mod differ;
pub mod effect;
pub mod error;
pub mod import;
pub mod interpreter;
pub mod normalize;
pub mod plan;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod waiter;
