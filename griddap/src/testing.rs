use std::ops::Range;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use ndarray::{Array, ArrayD, IxDyn};
use parking_lot::Mutex;

use crate::{
    errors::{Error, Result},
    memory::{MemoryOpener, MemorySource},
    source::{DataType, Opener, Source, VariableInfo, FILL_VALUE},
    time::Timestamp,
};

pub(crate) const ROWS: usize = 6;
pub(crate) const COLS: usize = 8;
pub(crate) const LEVELS: usize = 3;

pub(crate) const TIME_UNITS: &str = "hours since 2020-01-01 00:00:00";

pub(crate) fn start() -> Timestamp {
    NaiveDate::from_ymd_opt(2020, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

pub(crate) fn hour(hour: usize) -> Timestamp {
    start() + Duration::hours(hour as i64)
}

/// `n` hourly timestamps starting at midnight, 2020-01-01
///
pub(crate) fn hourly(n: usize) -> Vec<Timestamp> {
    (0..n).map(hour).collect()
}

/// Value of a gridded test variable, encodes where it came from so tests can check placement
///
pub(crate) fn value(hour: usize, level: usize, row: usize, col: usize) -> f64 {
    (hour * 1000 + level * 100 + row * 10 + col) as f64
}

pub(crate) fn bathymetry(row: usize, col: usize) -> f64 {
    (row * 100 + col) as f64 + 0.5
}

/// An ocean model output file with consecutive hourly records
///
pub(crate) fn ocean_source(location: &str, first_hour: usize, n: usize) -> Result<MemorySource> {
    let hours: Vec<usize> = (first_hour..first_hour + n).collect();
    ocean_source_at(location, &hours)
}

/// An ocean model output file with records at the given hours.
///
/// Has coordinates `time`, `depth`, `lat` and `lon`, 4D variables `temp`, `salt`, `u` and `v`,
/// a 3D `ssh` and a 2D `h`.
///
pub(crate) fn ocean_source_at(location: &str, hours: &[usize]) -> Result<MemorySource> {
    let nt = hours.len();
    let time = VariableInfo::new("time", &["time"], DataType::F64)
        .with_attribute("units", TIME_UNITS)
        .with_attribute("long_name", "time");
    let times = Array::from_iter(hours.iter().map(|&h| h as f64)).into_dyn();

    let depth = VariableInfo::new("depth", &["depth"], DataType::F64)
        .with_attribute("units", "m")
        .with_attribute("positive", "down");
    let depths = Array::from_shape_fn(IxDyn(&[LEVELS]), |ix| ix[0] as f64 * 10.0);

    let lat = VariableInfo::new("lat", &["lat"], DataType::F64)
        .with_attribute("units", "degrees_north");
    let lats = Array::from_shape_fn(IxDyn(&[ROWS]), |ix| -35.0 + ix[0] as f64);

    let lon = VariableInfo::new("lon", &["lon"], DataType::F64)
        .with_attribute("units", "degrees_east");
    let lons = Array::from_shape_fn(IxDyn(&[COLS]), |ix| 110.0 + ix[0] as f64);

    let mut source = MemorySource::new(location)
        .with_variable(time, times)?
        .with_variable(depth, depths)?
        .with_variable(lat, lats)?
        .with_variable(lon, lons)?;

    let volume = Array::from_shape_fn(IxDyn(&[nt, LEVELS, ROWS, COLS]), |ix| {
        value(hours[ix[0]], ix[1], ix[2], ix[3])
    });
    for (name, units) in [("temp", "degC"), ("salt", "psu"), ("u", "m/s"), ("v", "m/s")] {
        let info = VariableInfo::new(name, &["time", "depth", "lat", "lon"], DataType::F32)
            .with_attribute("units", units)
            .with_attribute(FILL_VALUE, -999.0);
        source.add_variable(info, volume.clone())?;
    }

    let ssh = VariableInfo::new("ssh", &["time", "lat", "lon"], DataType::F32)
        .with_attribute("units", "m")
        .with_attribute(FILL_VALUE, -999.0);
    let surface = Array::from_shape_fn(IxDyn(&[nt, ROWS, COLS]), |ix| {
        value(hours[ix[0]], 0, ix[1], ix[2])
    });
    source.add_variable(ssh, surface)?;

    let h = VariableInfo::new("h", &["lat", "lon"], DataType::F64)
        .with_attribute("units", "m")
        .with_attribute("long_name", "bathymetry");
    let depths = Array::from_shape_fn(IxDyn(&[ROWS, COLS]), |ix| bathymetry(ix[0], ix[1]));
    source.add_variable(h, depths)?;

    Ok(source)
}

/// Ways a `FlakySource` can misbehave
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ReadFailure {
    Never,

    /// Reads of more than one record fail
    Bulk,

    /// The next n reads fail
    Next(usize),

    Always,
}

/// Wraps a source, failing some reads with transient errors
///
pub(crate) struct FlakySource {
    inner: Box<dyn Source>,
    failure: ReadFailure,
    failures_left: Mutex<usize>,
    reads: Mutex<usize>,
}

impl FlakySource {
    pub(crate) fn new<S: Source + 'static>(inner: S) -> Self {
        Self::wrap(Box::new(inner))
    }

    pub(crate) fn wrap(inner: Box<dyn Source>) -> Self {
        Self {
            inner,
            failure: ReadFailure::Never,
            failures_left: Mutex::new(0),
            reads: Mutex::new(0),
        }
    }

    pub(crate) fn with_failure(mut self, failure: ReadFailure) -> Self {
        self.failure = failure;
        if let ReadFailure::Next(n) = failure {
            self.failures_left = Mutex::new(n);
        }
        self
    }

    /// Number of reads attempted so far, including failed ones
    ///
    pub(crate) fn reads(&self) -> usize {
        *self.reads.lock()
    }

    fn should_fail(&self, ranges: &[Range<usize>]) -> bool {
        *self.reads.lock() += 1;
        match self.failure {
            ReadFailure::Never => false,
            ReadFailure::Bulk => ranges.len() >= 3 && ranges[0].len() > 1,
            ReadFailure::Next(_) => {
                let mut left = self.failures_left.lock();
                if *left > 0 {
                    *left -= 1;
                    true
                } else {
                    false
                }
            }
            ReadFailure::Always => true,
        }
    }
}

#[async_trait]
impl Source for FlakySource {
    fn location(&self) -> &str {
        self.inner.location()
    }

    fn dimension_len(&self, name: &str) -> Option<usize> {
        self.inner.dimension_len(name)
    }

    fn variable(&self, name: &str) -> Option<&VariableInfo> {
        self.inner.variable(name)
    }

    async fn read(&self, name: &str, ranges: &[Range<usize>]) -> Result<ArrayD<f64>> {
        if self.should_fail(ranges) {
            return Err(Error::transport(self.location(), "connection reset by peer"));
        }

        self.inner.read(name, ranges).await
    }
}

/// Wraps a `MemoryOpener`, failing some opens and wrapping opened sources in `FlakySource`
///
pub(crate) struct FlakyOpener {
    pub(crate) inner: MemoryOpener,
    failure: ReadFailure,
    open_failures: Mutex<usize>,
}

impl FlakyOpener {
    pub(crate) fn new(inner: MemoryOpener) -> Self {
        Self {
            inner,
            failure: ReadFailure::Never,
            open_failures: Mutex::new(0),
        }
    }

    /// Failure mode of every source opened
    ///
    pub(crate) fn with_read_failure(mut self, failure: ReadFailure) -> Self {
        self.failure = failure;
        self
    }

    /// Fail the next `n` opens
    ///
    pub(crate) fn with_open_failures(self, n: usize) -> Self {
        *self.open_failures.lock() = n;
        self
    }
}

#[async_trait]
impl Opener for FlakyOpener {
    async fn open(&self, location: &str) -> Result<Box<dyn Source>> {
        let fail = {
            let mut left = self.open_failures.lock();
            if *left > 0 {
                *left -= 1;
                true
            } else {
                false
            }
        };
        if fail {
            return Err(Error::transport(location, "503 Service Unavailable"));
        }

        let source = self.inner.open(location).await?;
        Ok(Box::new(FlakySource::wrap(source).with_failure(self.failure)))
    }
}

/// An opener for a run of files, each with `per_file` hourly records following on from the
/// previous one
///
pub(crate) fn ocean_files(files: usize, per_file: usize) -> Result<(MemoryOpener, Vec<String>)> {
    let mut opener = MemoryOpener::new();
    let mut locations = vec![];
    for i in 0..files {
        let location = format!("mem://ocean_{i}.nc");
        opener.insert(ocean_source(&location, i * per_file, per_file)?);
        locations.push(location);
    }

    Ok((opener, locations))
}
