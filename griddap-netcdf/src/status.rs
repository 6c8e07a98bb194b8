//! Sorting netCDF library failures into the errors retrieval knows how to handle.
//!
//! Only failures that might go away when tried again become `Error::Transport`. A location that
//! doesn't exist, isn't netCDF, or that the server refuses to serve is never worth retrying.
//!
use griddap::Error;

/// No such file
const ENOENT: i32 = 2;

const NC_ENOTNC: i32 = -51;
const NC_EDAP: i32 = -66;
const NC_ECURL: i32 = -67;
const NC_EIO: i32 = -68;
const NC_EDAPSVC: i32 = -70;
const NC_EDAS: i32 = -71;
const NC_EDDS: i32 = -72;
const NC_EDATADDS: i32 = -73;
const NC_EDAPURL: i32 = -74;
const NC_EACCESS: i32 = -77;
const NC_EAUTH: i32 = -78;
const NC_ENOTFOUND: i32 = -90;

fn code(err: &netcdf::Error) -> Option<i32> {
    match err {
        netcdf::Error::Netcdf(code) => Some(*code),
        _ => None,
    }
}

/// Error for a failure to open `location`
///
pub(crate) fn open_error(location: &str, err: netcdf::Error) -> Error {
    match code(&err) {
        Some(ENOENT | NC_ENOTNC | NC_EDAPURL | NC_ENOTFOUND | NC_EACCESS | NC_EAUTH) => {
            Error::UnrecognizedSource(format!("{location}: {err}"))
        }
        Some(NC_ECURL | NC_EIO | NC_EDAPSVC | NC_EDAP | NC_EDDS | NC_EDAS | NC_EDATADDS) => {
            Error::transport(location, err)
        }
        _ => Error::protocol(location, err),
    }
}

/// Error for a failed read from a source that opened fine
///
pub(crate) fn read_error(location: &str, err: netcdf::Error) -> Error {
    match code(&err) {
        Some(NC_ECURL | NC_EIO | NC_EDAPSVC | NC_EDAP | NC_EDATADDS) => {
            Error::transport(location, err)
        }
        _ => Error::protocol(location, err),
    }
}

/// Error for a failure of the output store
///
pub(crate) fn store_error(what: &str, err: netcdf::Error) -> Error {
    Error::Store(format!("{what}: {err}"))
}
