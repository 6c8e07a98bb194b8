//! A single time axis assembled from many files.
//!
use std::collections::BTreeMap;

use log::{debug, info};

use crate::{
    errors::{Error, Result},
    retry::RetryPolicy,
    source::Opener,
    time::{key, Timestamp},
};

/// Where to find one timestamp: which file, and which record within it
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeIndexEntry {
    pub file: usize,
    pub record: usize,
}

/// The sorted, deduplicated union of the time axes of a list of files.
///
/// When more than one file has the same timestamp, the file that comes last in the list wins.
///
#[derive(Clone, Debug)]
pub struct LogicalTimeAxis {
    files: Vec<String>,
    times: Vec<Timestamp>,
    lookup: BTreeMap<Timestamp, TimeIndexEntry>,
}

impl LogicalTimeAxis {
    /// Open each file in turn and read its time variable.
    ///
    /// Opens and reads are retried according to `policy`. Any file that can't be read fails
    /// the whole axis.
    ///
    pub async fn build(
        opener: &dyn Opener,
        files: &[String],
        time_var: &str,
        policy: &RetryPolicy,
    ) -> Result<Self> {
        if files.is_empty() {
            return Err(Error::UnrecognizedSource("empty list of files".into()));
        }

        let mut file_times = Vec::with_capacity(files.len());
        for (i, file) in files.iter().enumerate() {
            info!("reading {time_var} from {file} ({} of {})", i + 1, files.len());
            let source = policy
                .run(&format!("open of {file}"), || opener.open(file))
                .await?;
            let times = policy
                .run(&format!("read of {time_var} from {file}"), || {
                    source.read_times(time_var)
                })
                .await?;
            debug!("{file} has {} records", times.len());

            file_times.push(times);
        }

        Ok(Self::from_file_times(files.to_vec(), file_times))
    }

    /// Build from time axes that have already been read, one per file
    ///
    pub fn from_file_times(files: Vec<String>, file_times: Vec<Vec<Timestamp>>) -> Self {
        let mut lookup = BTreeMap::new();
        for (file, times) in file_times.into_iter().enumerate() {
            for (record, timestamp) in times.into_iter().enumerate() {
                lookup.insert(key(timestamp), TimeIndexEntry { file, record });
            }
        }
        let times = lookup.keys().copied().collect();

        Self {
            files,
            times,
            lookup,
        }
    }

    pub fn times(&self) -> &[Timestamp] {
        &self.times
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn file(&self, index: usize) -> &str {
        &self.files[index]
    }

    /// Where to find `timestamp`, compared at whole second resolution
    ///
    pub fn lookup(&self, timestamp: Timestamp) -> Option<TimeIndexEntry> {
        self.lookup.get(&key(timestamp)).copied()
    }
}
