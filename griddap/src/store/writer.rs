use log::{debug, info, warn};
use ndarray::{Array1, Axis, Slice};

use crate::{
    errors::{Error, Result},
    retrieval::{Coordinate, Subset},
    source::{AttrValue, DataType, VariableInfo, FILL_VALUE},
    time::{key, TimeUnits, Timestamp, EPOCH_UNITS},
};

use super::{OutputStore, VariableDef};

/// Name of the time dimension and variable created for variables without one
const SYNTHETIC_TIME: &str = "time";

/// How the first new timestamp was placed on the stored time axis
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// Found on the stored time axis
    Exact,

    /// Later than everything on the stored time axis, so appended after it
    Append,

    /// Not found on the stored time axis, so guessed
    Heuristic,

    /// There was no stored time axis yet
    Fresh,
}

/// What a single write did
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteReport {
    pub variable: String,

    /// Position of the first retrieved record on the stored time axis
    pub offset: usize,

    pub placement: Placement,

    /// Number of time values appended to the stored time axis
    pub times_written: usize,

    /// Number of records of the variable written
    pub rows_written: usize,
}

/// Appends retrieved subsets to an `OutputStore`.
///
/// Dimensions, variables and attributes are created the first time they are needed and never
/// redefined. Records that are already stored are never rewritten.
///
pub struct OutputStoreWriter<'a, S: OutputStore + ?Sized> {
    store: &'a mut S,
    strict: bool,
}

impl<'a, S: OutputStore + ?Sized> OutputStoreWriter<'a, S> {
    /// With `strict` set, retrieved times that can't be found on the stored time axis are an
    /// error rather than being placed by guesswork.
    ///
    pub fn new(store: &'a mut S, strict: bool) -> Self {
        Self { store, strict }
    }

    pub fn write(&mut self, subset: &Subset) -> Result<WriteReport> {
        info!("writing {} ({})", subset.name, subset.info.name);

        self.write_coordinate(&subset.x)?;
        self.write_coordinate(&subset.y)?;
        if let Some(depth) = &subset.depth {
            self.write_coordinate(depth)?;
        }

        let (time_name, offset, placement) = self.place_times(subset)?;
        let times_written = self.write_times(&time_name, subset, offset)?;

        let info = &subset.info;
        let data = &subset.data;
        self.ensure_variable(info, data.shape(), true, subset.time.is_none())?;

        let records = self.store.records(&info.name)?;
        let count = data.shape()[0];
        let skip = records.saturating_sub(offset).min(count);
        if skip > 0 {
            debug!("{} already has {skip} of {count} records", info.name);
        }
        let rows_written = count - skip;
        if rows_written > 0 {
            let rows = data.slice_axis(Axis(0), Slice::from(skip..));
            self.store.write(&info.name, offset + skip, rows)?;
        }
        self.store.flush()?;

        Ok(WriteReport {
            variable: info.name.clone(),
            offset,
            placement,
            times_written,
            rows_written,
        })
    }

    /// Write the full extent of a coordinate variable
    ///
    pub fn write_coordinate(&mut self, coordinate: &Coordinate) -> Result<()> {
        let values = &coordinate.values;
        self.ensure_variable(&coordinate.info, values.shape(), false, false)?;
        self.store.write(&coordinate.info.name, 0, values.view())
    }

    /// Create a variable like `info`, unless it already exists.
    ///
    /// Missing dimensions are created with lengths from `shape`, except a leading time
    /// dimension which is created unlimited. With `prepend_time` the synthetic time dimension is
    /// added in front of `info`'s dimensions.
    ///
    fn ensure_variable(
        &mut self,
        info: &VariableInfo,
        shape: &[usize],
        record: bool,
        prepend_time: bool,
    ) -> Result<()> {
        if self.store.variable(&info.name).is_some() {
            return Ok(());
        }

        let mut dimensions = info.dimensions.clone();
        if prepend_time {
            dimensions.insert(0, SYNTHETIC_TIME.to_string());
        }
        if dimensions.len() != shape.len() {
            return Err(Error::ShapeMismatch {
                name: info.name.clone(),
                expected: shape.to_vec(),
                got: vec![0; dimensions.len()],
            });
        }

        for (i, (dim, &len)) in dimensions.iter().zip(shape).enumerate() {
            if self.store.dimension(dim).is_none() {
                let len = if record && i == 0 { None } else { Some(len) };
                self.store.create_dimension(dim, len)?;
            }
        }

        let mut attributes = info.attributes.clone();
        attributes.remove(FILL_VALUE);
        self.store.create_variable(VariableDef {
            name: info.name.clone(),
            dtype: info.dtype,
            dimensions,
            attributes,
            fill_value: info.fill_value(),
        })
    }

    /// Work out where the subset's first timestamp goes on the stored time axis
    ///
    fn place_times(&mut self, subset: &Subset) -> Result<(String, usize, Placement)> {
        let time_name = match &subset.time {
            Some(info) => info.name.clone(),
            None => SYNTHETIC_TIME.to_string(),
        };

        if self.store.variable(&time_name).is_none() {
            match &subset.time {
                Some(info) => self.ensure_variable(info, &[subset.times.len()], true, false)?,
                None => {
                    warn!("{} has no time dimension, creating one", subset.name);
                    if self.store.dimension(SYNTHETIC_TIME).is_none() {
                        self.store.create_dimension(SYNTHETIC_TIME, None)?;
                    }
                    self.store.create_variable(
                        VariableDef::new(SYNTHETIC_TIME, DataType::F64, &[SYNTHETIC_TIME])
                            .with_attribute("long_name", "time")
                            .with_attribute("units", EPOCH_UNITS),
                    )?;
                }
            }

            return Ok((time_name, 0, Placement::Fresh));
        }

        let stored = self.stored_times(&time_name)?;
        let first = match subset.times.first() {
            Some(&first) => first,
            None => return Ok((time_name, stored.len(), Placement::Exact)),
        };
        if stored.is_empty() {
            return Ok((time_name, 0, Placement::Fresh));
        }

        if let Some(offset) = stored.iter().position(|&t| key(t) == key(first)) {
            return Ok((time_name, offset, Placement::Exact));
        }
        let last = stored[stored.len() - 1];
        if key(first) > key(last) {
            debug!("{first} is after the stored {time_name}, appending");
            return Ok((time_name, stored.len(), Placement::Append));
        }

        let ambiguous = || Error::AmbiguousAppend {
            variable: subset.name.clone(),
            first,
            stored: stored[0],
        };
        if self.strict {
            return Err(ambiguous());
        }

        // Records of the variable under the guessed offset would never be written
        let offset = if first > stored[0] { 1 } else { 0 };
        let rows = match self.store.variable(&subset.info.name) {
            Some(_) => self.store.records(&subset.info.name)?,
            None => 0,
        };
        if rows > offset {
            warn!(
                "{first} is not on the stored time axis of {} ({} to {last}), \
                 offset {offset} would drop records",
                subset.name, stored[0]
            );
            return Err(ambiguous());
        }
        warn!("{first} is not on the stored time axis of {}, guessing offset {offset}", subset.name);

        Ok((time_name, offset, Placement::Heuristic))
    }

    fn stored_time_units(&self, time_name: &str) -> Result<TimeUnits> {
        let def = self
            .store
            .variable(time_name)
            .ok_or_else(|| Error::BadName(time_name.to_string()))?;
        let text = |name: &str| def.attributes.get(name).and_then(AttrValue::as_str);
        let units = text("units")
            .ok_or_else(|| Error::BadTimeUnits(format!("stored {time_name} has no units")))?;

        TimeUnits::with_calendar(units, text("calendar"))
    }

    fn stored_times(&self, time_name: &str) -> Result<Vec<Timestamp>> {
        let records = self.store.records(time_name)?;
        if records == 0 {
            return Ok(vec![]);
        }

        let units = self.stored_time_units(time_name)?;
        let values = self.store.read(time_name)?;
        units.decode_all(values.iter().take(records).copied())
    }

    /// Append the subset's times that lie beyond the end of the stored time axis
    ///
    fn write_times(&mut self, time_name: &str, subset: &Subset, offset: usize) -> Result<usize> {
        let stored = self.store.records(time_name)?;
        let skip = stored.saturating_sub(offset).min(subset.times.len());
        let new = &subset.times[skip..];
        if new.is_empty() {
            return Ok(0);
        }

        let units = self.stored_time_units(time_name)?;
        let values = Array1::from(units.encode_all(new)).into_dyn();
        debug!("appending {} times to {time_name} at {}", new.len(), offset + skip);
        self.store.write(time_name, offset + skip, values.view())?;

        Ok(new.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::{Array, ArrayD, IxDyn};

    use crate::{
        geom::{IndexWindow, Window},
        store::MemoryStore,
        testing::{self, COLS, LEVELS, ROWS},
    };

    fn coordinate(name: &str, len: usize, first: f64) -> Coordinate {
        Coordinate {
            info: VariableInfo::new(name, &[name], DataType::F64),
            values: Array::from_shape_fn(IxDyn(&[len]), |ix| first + ix[0] as f64),
        }
    }

    fn time_info() -> VariableInfo {
        VariableInfo::new("time", &["time"], DataType::F64)
            .with_attribute("units", testing::TIME_UNITS)
    }

    /// `temp` at the given hours, as if retrieved from the test ocean source
    fn temp(hours: &[usize]) -> Subset {
        let data = Array::from_shape_fn(IxDyn(&[hours.len(), LEVELS, ROWS, COLS]), |ix| {
            testing::value(hours[ix[0]], ix[1], ix[2], ix[3])
        });
        Subset {
            name: "temp".into(),
            info: VariableInfo::new("temp", &["time", "depth", "lat", "lon"], DataType::F32)
                .with_attribute("units", "degC")
                .with_attribute(FILL_VALUE, -999.0),
            x: coordinate("lon", COLS, 110.0),
            y: coordinate("lat", ROWS, -35.0),
            depth: Some(coordinate("depth", LEVELS, 0.0)),
            time: Some(time_info()),
            times: hours.iter().map(|&h| testing::hour(h)).collect(),
            data,
            window: Window {
                time: Some(IndexWindow::new(0, hours.len())),
                depth: Some(IndexWindow::full(LEVELS)),
                y: IndexWindow::full(ROWS),
                x: IndexWindow::full(COLS),
            },
        }
    }

    fn bathymetry(at: Timestamp) -> Subset {
        let data = Array::from_shape_fn(IxDyn(&[1, ROWS, COLS]), |ix| {
            testing::bathymetry(ix[1], ix[2])
        });
        Subset {
            name: "h".into(),
            info: VariableInfo::new("h", &["lat", "lon"], DataType::F64),
            x: coordinate("lon", COLS, 110.0),
            y: coordinate("lat", ROWS, -35.0),
            depth: None,
            time: None,
            times: vec![at],
            data,
            window: Window {
                time: None,
                depth: None,
                y: IndexWindow::full(ROWS),
                x: IndexWindow::full(COLS),
            },
        }
    }

    fn stored_hours(store: &MemoryStore) -> Result<Vec<f64>> {
        Ok(store.read("time")?.iter().copied().collect())
    }

    fn hours_of(data: &ArrayD<f64>) -> Vec<usize> {
        data.outer_iter()
            .map(|record| record.iter().next().map_or(0, |&v| v as usize / 1000))
            .collect()
    }

    #[test]
    fn test_first_write() -> Result<()> {
        let mut store = MemoryStore::new();
        let report = OutputStoreWriter::new(&mut store, false).write(&temp(&[0, 1, 2]))?;

        assert_eq!(
            report,
            WriteReport {
                variable: "temp".into(),
                offset: 0,
                placement: Placement::Fresh,
                times_written: 3,
                rows_written: 3,
            }
        );
        assert!(store.dimension("time").map_or(false, |d| d.unlimited));
        assert_eq!(store.dimension("lat").map(|d| d.len), Some(ROWS));
        assert_eq!(stored_hours(&store)?, vec![0.0, 1.0, 2.0]);
        assert_eq!(store.read("temp")?, temp(&[0, 1, 2]).data);
        assert_eq!(store.read("lon")?[[2]], 112.0);

        let def = store.variable("temp").unwrap();
        assert_eq!(def.fill_value, Some(-999.0));
        assert!(!def.attributes.contains_key(FILL_VALUE));
        assert_eq!(
            def.attributes.get("units"),
            Some(&AttrValue::Text("degC".into()))
        );

        Ok(())
    }

    #[test]
    fn test_overlapping_writes() -> Result<()> {
        let mut store = MemoryStore::new();
        let mut writer = OutputStoreWriter::new(&mut store, true);
        writer.write(&temp(&[0, 1, 2, 3, 4]))?;
        let report = writer.write(&temp(&[3, 4, 5, 6, 7]))?;

        assert_eq!(report.offset, 3);
        assert_eq!(report.placement, Placement::Exact);
        assert_eq!(report.times_written, 3);
        assert_eq!(report.rows_written, 3);

        assert_eq!(
            stored_hours(&store)?,
            vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]
        );
        assert_eq!(hours_of(&store.read("temp")?), (0..8).collect::<Vec<_>>());

        Ok(())
    }

    #[test]
    fn test_rewrite_is_noop() -> Result<()> {
        let mut store = MemoryStore::new();
        let mut writer = OutputStoreWriter::new(&mut store, true);
        writer.write(&temp(&[0, 1, 2]))?;
        let report = writer.write(&temp(&[1, 2]))?;

        assert_eq!(report.offset, 1);
        assert_eq!(report.times_written, 0);
        assert_eq!(report.rows_written, 0);
        assert_eq!(store.records("temp")?, 3);

        Ok(())
    }

    #[test]
    fn test_new_variable_on_existing_axis() -> Result<()> {
        let mut store = MemoryStore::new();
        let mut writer = OutputStoreWriter::new(&mut store, true);
        writer.write(&temp(&[0, 1, 2, 3]))?;

        let mut salt = temp(&[2, 3]);
        salt.name = "salt".into();
        salt.info.name = "salt".into();
        let report = writer.write(&salt)?;

        assert_eq!(report.offset, 2);
        assert_eq!(report.rows_written, 2);
        let stored = store.read("salt")?;
        assert_eq!(stored.shape()[0], 4);
        assert!(stored.index_axis(Axis(0), 0).iter().all(|&v| v == -999.0));
        assert_eq!(hours_of(&stored)[2..], [2, 3]);

        Ok(())
    }

    #[test]
    fn test_append_after_stored_times() -> Result<()> {
        let mut store = MemoryStore::new();
        let mut writer = OutputStoreWriter::new(&mut store, false);
        writer.write(&temp(&[0, 1, 2]))?;

        let report = writer.write(&temp(&[3, 4]))?;
        assert_eq!(report.placement, Placement::Append);
        assert_eq!(report.offset, 3);
        assert_eq!(report.times_written, 2);
        assert_eq!(report.rows_written, 2);

        // A gap in time still goes on the end
        let report = writer.write(&temp(&[10]))?;
        assert_eq!(report.placement, Placement::Append);
        assert_eq!(report.offset, 5);
        assert_eq!(report.rows_written, 1);

        assert_eq!(
            stored_hours(&store)?,
            vec![0.0, 1.0, 2.0, 3.0, 4.0, 10.0]
        );
        assert_eq!(hours_of(&store.read("temp")?), vec![0, 1, 2, 3, 4, 10]);

        Ok(())
    }

    #[test]
    fn test_ambiguous_placement_loses_nothing() -> Result<()> {
        let mut store = MemoryStore::new();
        let mut writer = OutputStoreWriter::new(&mut store, false);
        writer.write(&temp(&[2, 4, 6]))?;

        // Between stored times, and before all of them
        let mut between = temp(&[5]);
        between.times = vec![testing::hour(4) + chrono::Duration::minutes(30)];
        assert!(matches!(
            writer.write(&between),
            Err(Error::AmbiguousAppend { .. })
        ));
        assert!(matches!(
            writer.write(&temp(&[0, 1])),
            Err(Error::AmbiguousAppend { .. })
        ));

        assert_eq!(store.records("time")?, 3);
        assert_eq!(hours_of(&store.read("temp")?), vec![2, 4, 6]);

        Ok(())
    }

    #[test]
    fn test_heuristic_placement() -> Result<()> {
        let mut store = MemoryStore::new();
        let mut writer = OutputStoreWriter::new(&mut store, false);
        writer.write(&temp(&[2, 4, 6]))?;

        // A new variable has nothing stored to lose
        let mut salt = temp(&[5]);
        salt.name = "salt".into();
        salt.info.name = "salt".into();
        salt.times = vec![testing::hour(4) + chrono::Duration::minutes(30)];
        let report = writer.write(&salt)?;
        assert_eq!(report.placement, Placement::Heuristic);
        assert_eq!(report.offset, 1);
        assert_eq!(report.times_written, 0);
        assert_eq!(report.rows_written, 1);
        assert_eq!(hours_of(&store.read("salt")?)[1], 5);

        Ok(())
    }

    #[test]
    fn test_strict_placement() -> Result<()> {
        let mut store = MemoryStore::new();
        let mut writer = OutputStoreWriter::new(&mut store, true);
        writer.write(&temp(&[5, 6, 7]))?;

        let result = writer.write(&temp(&[0, 1]));
        assert!(matches!(result, Err(Error::AmbiguousAppend { .. })));

        Ok(())
    }

    #[test]
    fn test_variable_without_time() -> Result<()> {
        let mut store = MemoryStore::new();
        let at = testing::hour(5);
        let report = OutputStoreWriter::new(&mut store, true).write(&bathymetry(at))?;

        assert_eq!(report.placement, Placement::Fresh);
        assert_eq!(report.rows_written, 1);
        let time = store.variable("time").unwrap();
        assert_eq!(
            time.attributes.get("units"),
            Some(&AttrValue::Text(EPOCH_UNITS.into()))
        );
        // 2020-01-01T05:00:00
        assert_eq!(store.read("time")?[[0]], 1_577_854_800.0);
        assert_eq!(
            store.variable("h").map(|def| def.dimensions),
            Some(vec!["time".to_string(), "lat".into(), "lon".into()])
        );
        assert_eq!(store.read("h")?[[0, 1, 2]], testing::bathymetry(1, 2));

        Ok(())
    }
}
