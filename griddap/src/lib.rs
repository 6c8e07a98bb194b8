//! Retrieve subsets of remote gridded datasets into a local, appendable store.
//!
//! A `Retrieval` maps physical coordinate ranges onto index windows, reads those windows from
//! one or many remote files (stitching many files into a single logical time axis), and appends
//! what it reads to an `OutputStore` without ever storing the same time step twice.
//!
pub mod aggregate;
pub mod config;
pub mod coords;
pub mod errors;
pub mod geom;
mod helpers;
pub mod locate;
pub mod memory;
pub mod retrieval;
pub mod retrieve;
pub mod retry;
pub mod source;
pub mod stitch;
pub mod store;
pub mod time;
pub mod window;

#[cfg(test)]
mod testing;

pub use aggregate::{LogicalTimeAxis, TimeIndexEntry};
pub use config::{Config, DatasetKind, VariableSpec};
pub use coords::CoordNames;
pub use errors::{Error, Result};
pub use geom::{IndexWindow, Window};
pub use memory::{MemoryOpener, MemorySource};
pub use retrieval::{Coordinate, Retrieval, Retrieved, Subset, Target};
pub use retrieve::ChunkRetriever;
pub use retry::RetryPolicy;
pub use source::{AttrValue, Attributes, DataType, Opener, Source, VariableInfo};
pub use stitch::MultiFileStitcher;
pub use store::{
    Dimension, MemoryStore, OutputStore, OutputStoreWriter, Placement, VariableDef, WriteReport,
};
pub use time::{TimeUnits, Timestamp};
pub use window::{Grid, Horizontal, Request};
