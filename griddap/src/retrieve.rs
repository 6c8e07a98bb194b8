use std::ops::Range;

use log::{debug, warn};
use ndarray::{ArrayD, Axis, IxDyn, Slice};

use crate::{
    errors::{Error, Result},
    geom::Window,
    retry::RetryPolicy,
    source::Source,
};

/// Reads a window of one variable from one source.
///
/// For variables with a time dimension a single bulk read is tried first. Servers commonly
/// reject large requests, so if the bulk read fails with a transient error, the window is read
/// again one record at a time, retrying each record according to the retry policy.
///
pub struct ChunkRetriever {
    policy: RetryPolicy,
    prefer_bulk: bool,
}

impl ChunkRetriever {
    pub fn new(policy: RetryPolicy, prefer_bulk: bool) -> Self {
        Self {
            policy,
            prefer_bulk,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Read `records` (indices along the source's time dimension) of `window`.
    ///
    /// Output is `(records, [levels,] rows, cols)`. Variables without a time dimension are
    /// read as a single record and `records` is ignored.
    ///
    pub async fn fetch(
        &self,
        source: &dyn Source,
        name: &str,
        window: &Window,
        records: Range<usize>,
    ) -> Result<ArrayD<f64>> {
        if window.time.is_none() {
            let ranges = window.ranges(0..1);
            let what = format!("read of {name} from {}", source.location());
            let data = self
                .policy
                .run(&what, || source.read(name, &ranges))
                .await?;
            check_shape(name, &data, &window.shape(1)[1..])?;

            return Ok(data.insert_axis(Axis(0)));
        }

        let expected = window.shape(records.len());
        if self.prefer_bulk {
            match source.read(name, &window.ranges(records.clone())).await {
                Ok(data) => {
                    check_shape(name, &data, &expected)?;
                    return Ok(data);
                }
                Err(err) if err.is_transient() => {
                    warn!(
                        "bulk read of {name} records {records:?} from {} failed ({err}), \
                         reading one record at a time",
                        source.location()
                    );
                }
                Err(err) => return Err(err),
            }
        }

        let mut data = ArrayD::zeros(IxDyn(&expected));
        let count = records.len();
        for (row, record) in records.enumerate() {
            debug!("reading {name} record {record} ({} of {count})", row + 1);
            let ranges = window.ranges(record..record + 1);
            let what = format!("read of {name} record {record} from {}", source.location());
            let step = self
                .policy
                .run(&what, || source.read(name, &ranges))
                .await?;
            check_shape(name, &step, &window.shape(1))?;

            data.slice_axis_mut(Axis(0), Slice::from(row..row + 1))
                .assign(&step);
        }

        Ok(data)
    }
}

fn check_shape(name: &str, data: &ArrayD<f64>, expected: &[usize]) -> Result<()> {
    if data.shape() == expected {
        Ok(())
    } else {
        Err(Error::ShapeMismatch {
            name: name.to_string(),
            expected: expected.to_vec(),
            got: data.shape().to_vec(),
        })
    }
}
