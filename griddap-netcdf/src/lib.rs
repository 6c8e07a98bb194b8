//! netCDF for griddap: open netCDF files and OPeNDAP URLs as sources, and store retrieved data
//! in netCDF-4 files that grow along an unlimited time dimension.
//!
mod convert;
pub mod source;
mod status;
pub mod store;

#[cfg(test)]
mod testing;

pub use source::{NetcdfOpener, NetcdfSource};
pub use store::{NetcdfStore, DEFAULT_COMPRESSION};
