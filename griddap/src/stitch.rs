//! Reading a window of an aggregated time axis from the files it was built from.
//!
use std::ops::Range;

use log::info;
use ndarray::{ArrayD, Axis, IxDyn, Slice};

use crate::{
    aggregate::LogicalTimeAxis,
    errors::{Error, Result},
    geom::Window,
    retrieve::ChunkRetriever,
    source::Opener,
    time::Timestamp,
};

/// Consecutive output rows that come from consecutive records of one file
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Run {
    pub rows: Range<usize>,
    pub records: Range<usize>,
}

/// Everything to read from one file
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRead {
    pub file: usize,
    pub runs: Vec<Run>,
}

/// Work out which records of which files make up `times`.
///
/// Files are listed in the order they are first needed. Output row `i` holds `times[i]`.
///
pub fn plan(axis: &LogicalTimeAxis, times: &[Timestamp]) -> Result<Vec<FileRead>> {
    let mut reads: Vec<FileRead> = vec![];
    for (row, &timestamp) in times.iter().enumerate() {
        let entry = axis
            .lookup(timestamp)
            .ok_or(Error::MissingTimestamp(timestamp))?;

        let index = match reads.iter().position(|read| read.file == entry.file) {
            Some(index) => index,
            None => {
                reads.push(FileRead {
                    file: entry.file,
                    runs: vec![],
                });
                reads.len() - 1
            }
        };

        let runs = &mut reads[index].runs;
        match runs.last_mut() {
            Some(run) if run.rows.end == row && run.records.end == entry.record => {
                run.rows.end += 1;
                run.records.end += 1;
            }
            _ => runs.push(Run {
                rows: row..row + 1,
                records: entry.record..entry.record + 1,
            }),
        }
    }

    Ok(reads)
}

/// Reads windows of variables whose time dimension is spread over many files
///
pub struct MultiFileStitcher<'a> {
    opener: &'a dyn Opener,
    axis: &'a LogicalTimeAxis,
    retriever: &'a ChunkRetriever,
}

impl<'a> MultiFileStitcher<'a> {
    pub fn new(
        opener: &'a dyn Opener,
        axis: &'a LogicalTimeAxis,
        retriever: &'a ChunkRetriever,
    ) -> Self {
        Self {
            opener,
            axis,
            retriever,
        }
    }

    /// Read `window` of `name`, where the window's time indices are positions on the logical
    /// time axis.
    ///
    /// Each file is opened once and closed before the next one is opened.
    ///
    pub async fn fetch(&self, name: &str, window: &Window) -> Result<ArrayD<f64>> {
        let time = window
            .time
            .ok_or_else(|| Error::BadDimension(format!("{name} has no time dimension")))?;
        if time.end > self.axis.len() {
            return Err(Error::OutOfBounds {
                name: name.to_string(),
                ranges: vec![time.range()],
                shape: vec![self.axis.len()],
            });
        }

        let times = &self.axis.times()[time.range()];
        let reads = plan(self.axis, times)?;

        let mut data = ArrayD::zeros(IxDyn(&window.shape(times.len())));
        for read in reads {
            let location = self.axis.file(read.file);
            info!("reading {name} from {location}");
            let source = self
                .retriever
                .policy()
                .run(&format!("open of {location}"), || self.opener.open(location))
                .await?;

            for run in read.runs {
                let chunk = self
                    .retriever
                    .fetch(source.as_ref(), name, window, run.records)
                    .await?;
                data.slice_axis_mut(Axis(0), Slice::from(run.rows))
                    .assign(&chunk);
            }
        }

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::{
        geom::IndexWindow,
        memory::MemoryOpener,
        retry::RetryPolicy,
        testing::{self, FlakyOpener, ReadFailure},
    };

    fn retriever() -> ChunkRetriever {
        ChunkRetriever::new(RetryPolicy::fixed(3, Duration::from_millis(1)), true)
    }

    fn window(time: Range<usize>) -> Window {
        Window {
            time: Some(IndexWindow::new(time.start, time.end)),
            depth: Some(IndexWindow::new(0, 2)),
            y: IndexWindow::new(1, 3),
            x: IndexWindow::new(0, 4),
        }
    }

    async fn axis(opener: &dyn crate::source::Opener, files: &[String]) -> Result<LogicalTimeAxis> {
        LogicalTimeAxis::build(opener, files, "time", &RetryPolicy::once()).await
    }

    fn hours_of(data: &ArrayD<f64>) -> Vec<f64> {
        data.outer_iter()
            .map(|record| (record.iter().next().copied().unwrap_or(f64::NAN) / 1000.0).floor())
            .collect()
    }

    #[test]
    fn test_plan_runs() -> Result<()> {
        let files = vec!["a".to_string(), "b".to_string()];
        let axis = LogicalTimeAxis::from_file_times(
            files,
            vec![
                vec![
                    testing::hour(0),
                    testing::hour(2),
                    testing::hour(4),
                    testing::hour(5),
                ],
                vec![testing::hour(1), testing::hour(3), testing::hour(4)],
            ],
        );

        let reads = plan(&axis, &testing::hourly(6))?;
        assert_eq!(
            reads,
            vec![
                FileRead {
                    file: 0,
                    runs: vec![
                        Run { rows: 0..1, records: 0..1 },
                        Run { rows: 2..3, records: 1..2 },
                        Run { rows: 5..6, records: 3..4 },
                    ],
                },
                FileRead {
                    file: 1,
                    runs: vec![
                        Run { rows: 1..2, records: 0..1 },
                        Run { rows: 3..5, records: 1..3 },
                    ],
                },
            ]
        );

        Ok(())
    }

    #[test]
    fn test_plan_missing() {
        let axis = LogicalTimeAxis::from_file_times(
            vec!["a".to_string()],
            vec![vec![testing::hour(0)]],
        );
        let result = plan(&axis, &[testing::hour(0), testing::hour(1)]);
        assert!(matches!(result, Err(Error::MissingTimestamp(_))));
    }

    #[tokio::test]
    async fn test_across_files() -> Result<()> {
        let opener = MemoryOpener::new()
            .with_source(testing::ocean_source("mem://a", 0, 6)?)
            .with_source(testing::ocean_source("mem://b", 6, 4)?);
        let files = vec!["mem://a".to_string(), "mem://b".to_string()];
        let axis = axis(&opener, &files).await?;
        let retriever = retriever();
        let stitcher = MultiFileStitcher::new(&opener, &axis, &retriever);

        // A3, A4, A5, B0, B1
        let data = stitcher.fetch("temp", &window(3..8)).await?;
        assert_eq!(data.shape(), &[5, 2, 2, 4]);
        assert_eq!(hours_of(&data), vec![3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(data[[3, 1, 0, 2]], testing::value(6, 1, 1, 2));
        assert_eq!(
            opener.opened(),
            vec!["mem://a", "mem://b", "mem://a", "mem://b"]
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_overlapping_files() -> Result<()> {
        let opener = MemoryOpener::new()
            .with_source(testing::ocean_source("mem://a", 0, 6)?)
            .with_source(testing::ocean_source("mem://b", 4, 6)?);
        let files = vec!["mem://a".to_string(), "mem://b".to_string()];
        let axis = axis(&opener, &files).await?;
        let retriever = retriever();
        let stitcher = MultiFileStitcher::new(&opener, &axis, &retriever);

        let data = stitcher.fetch("ssh", &window(2..8)).await?;
        assert_eq!(hours_of(&data), vec![2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);

        Ok(())
    }

    #[tokio::test]
    async fn test_interleaved_files() -> Result<()> {
        let opener = MemoryOpener::new()
            .with_source(testing::ocean_source_at("mem://even", &[0, 2, 4, 6])?)
            .with_source(testing::ocean_source_at("mem://odd", &[1, 3, 5, 7])?);
        // Later file listed first, visited second
        let files = vec!["mem://odd".to_string(), "mem://even".to_string()];
        let axis = axis(&opener, &files).await?;
        let retriever = retriever();
        let stitcher = MultiFileStitcher::new(&opener, &axis, &retriever);

        let data = stitcher.fetch("temp", &window(0..8)).await?;
        assert_eq!(
            hours_of(&data),
            vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]
        );
        assert_eq!(
            opener.opened()[2..],
            ["mem://even".to_string(), "mem://odd".to_string()]
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_fallback_across_files() -> Result<()> {
        let (memory, files) = testing::ocean_files(3, 4)?;
        let axis = axis(&memory, &files).await?;
        let retriever = retriever();

        let expected = MultiFileStitcher::new(&memory, &axis, &retriever)
            .fetch("temp", &window(2..11))
            .await?;

        let flaky = FlakyOpener::new(memory).with_read_failure(ReadFailure::Bulk);
        let data = MultiFileStitcher::new(&flaky, &axis, &retriever)
            .fetch("temp", &window(2..11))
            .await?;

        assert_eq!(data, expected);

        Ok(())
    }

    #[tokio::test]
    async fn test_out_of_bounds() -> Result<()> {
        let (opener, files) = testing::ocean_files(1, 4)?;
        let axis = axis(&opener, &files).await?;
        let retriever = retriever();
        let stitcher = MultiFileStitcher::new(&opener, &axis, &retriever);

        let result = stitcher.fetch("temp", &window(2..6)).await;
        assert!(matches!(result, Err(Error::OutOfBounds { .. })));

        Ok(())
    }
}
