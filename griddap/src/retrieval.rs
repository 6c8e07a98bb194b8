//! Driving a retrieval session: which variables, from where, into what.
//!
use std::{collections::HashMap, sync::Arc};

use log::{debug, info};
use ndarray::ArrayD;

use crate::{
    aggregate::LogicalTimeAxis,
    config::Config,
    coords::CoordNames,
    errors::{Error, Result},
    geom::Window,
    helpers::rearrange,
    retrieve::ChunkRetriever,
    source::{AttrValue, Opener, Source, VariableInfo},
    stitch::MultiFileStitcher,
    store::{OutputStore, OutputStoreWriter, WriteReport},
    time::{TimeUnits, Timestamp, EPOCH_UNITS},
    window::{resolve, Grid, Request},
};

/// A coordinate variable and the values retrieved for it
///
#[derive(Clone, Debug, PartialEq)]
pub struct Coordinate {
    pub info: VariableInfo,
    pub values: ArrayD<f64>,
}

/// Everything retrieved for one variable.
///
/// `data` is always `(records, [levels,] rows, cols)`. Variables without a time dimension have
/// a single record, stamped with a synthetic timestamp, and `time` is `None`.
///
#[derive(Clone, Debug, PartialEq)]
pub struct Subset {
    /// Configured name of the variable
    pub name: String,

    /// The variable as the source describes it
    pub info: VariableInfo,

    pub x: Coordinate,
    pub y: Coordinate,
    pub depth: Option<Coordinate>,

    /// The source's time variable
    pub time: Option<VariableInfo>,

    pub times: Vec<Timestamp>,
    pub data: ArrayD<f64>,

    /// Indices of the retrieved window. Time indices are on the logical time axis when
    /// retrieving from many files.
    pub window: Window,
}

/// A variable to retrieve, with its name in the source and its coordinate roles worked out
///
#[derive(Clone, Debug, PartialEq)]
pub struct Target {
    pub name: String,
    pub remote: String,
    pub coords: CoordNames,
}

/// The outcome for one variable of `Retrieval::run`
///
#[derive(Debug)]
pub struct Retrieved {
    pub subset: Subset,

    /// What was written, when writing to a store
    pub report: Option<WriteReport>,
}

/// A retrieval session.
///
/// Holds the configured source (for many files, the first of them) open for the lifetime of the
/// session. For many files, the logical time axis is built the first time a variable needs it and
/// reused by every later variable with the same time variable.
///
pub struct Retrieval {
    config: Config,
    opener: Arc<dyn Opener>,
    retriever: ChunkRetriever,
    source: Box<dyn Source>,
    grid_source: Option<Box<dyn Source>>,
    targets: Vec<Target>,
    axes: HashMap<String, LogicalTimeAxis>,
    grids: HashMap<CoordNames, Grid>,
}

impl Retrieval {
    /// Validate `config`, open its sources and work out what to retrieve.
    ///
    pub async fn open(config: Config, opener: Arc<dyn Opener>) -> Result<Self> {
        config.validate()?;

        let source = open_with_retry(opener.as_ref(), &config.sources[0], &config).await?;
        let grid_source = match &config.grid_file {
            Some(location) => Some(open_with_retry(opener.as_ref(), location, &config).await?),
            None => None,
        };

        let mut targets = vec![];
        for spec in config.variables() {
            let remote = spec.remote_name().to_string();
            let coords = match spec.coords {
                Some(coords) => coords,
                None => CoordNames::infer(source.variable_info(&remote)?)?,
            };
            debug!("{} is {remote} in the source, with coordinates {coords:?}", spec.name);

            targets.push(Target {
                name: spec.name,
                remote,
                coords,
            });
        }

        let retriever = ChunkRetriever::new(config.retry.clone(), config.prefer_bulk);

        Ok(Self {
            config,
            opener,
            retriever,
            source,
            grid_source,
            targets,
            axes: HashMap::new(),
            grids: HashMap::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Variables to retrieve, in the order `run` retrieves them
    ///
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    fn target(&self, name: &str) -> Result<&Target> {
        self.targets
            .iter()
            .find(|target| target.name == name)
            .ok_or_else(|| Error::BadName(name.to_string()))
    }

    /// Source coordinates are read from
    ///
    fn coord_source(&self) -> &dyn Source {
        self.grid_source.as_deref().unwrap_or(self.source.as_ref())
    }

    async fn grid(&mut self, coords: &CoordNames) -> Result<Grid> {
        if let Some(grid) = self.grids.get(coords) {
            return Ok(grid.clone());
        }

        let grid = Grid::load(self.coord_source(), coords).await?;
        self.grids.insert(coords.clone(), grid.clone());

        Ok(grid)
    }

    /// All times of a time variable, across every file when there are many
    ///
    async fn times(&mut self, time_name: &str) -> Result<Vec<Timestamp>> {
        if !self.config.multifile {
            let what = format!("read of {time_name} from {}", self.source.location());
            let source = self.source.as_ref();
            return self
                .config
                .retry
                .run(&what, || source.read_times(time_name))
                .await;
        }

        if !self.axes.contains_key(time_name) {
            let axis = LogicalTimeAxis::build(
                self.opener.as_ref(),
                &self.config.sources,
                time_name,
                &self.config.retry,
            )
            .await?;
            info!(
                "{time_name} spans {} distinct times over {} files",
                axis.len(),
                axis.files().len()
            );
            self.axes.insert(time_name.to_string(), axis);
        }

        Ok(self.axes[time_name].times().to_vec())
    }

    fn coordinate(&self, name: &str, values: ArrayD<f64>) -> Result<Coordinate> {
        Ok(Coordinate {
            info: self.coord_source().variable_info(name)?.clone(),
            values,
        })
    }

    /// A request for everything between two times given in the configured time format
    ///
    pub fn request(&self, start: &str, end: &str) -> Result<Request> {
        Request::new().with_configured_time(start, end, &self.config)
    }

    /// Retrieve the part of a configured variable covered by `request`
    ///
    pub async fn load(&mut self, name: &str, request: &Request) -> Result<Subset> {
        let target = self.target(name)?.clone();
        let info = self.source.variable_info(&target.remote)?.clone();
        info!("retrieving {} ({})", target.name, target.remote);

        let grid = self.grid(&target.coords).await?;
        let (times, time_info) = match &target.coords.time {
            Some(time_name) => {
                let times = self.times(time_name).await?;
                let time_info = self.source.variable_info(time_name)?.clone();
                (Some(times), Some(time_info))
            }
            None => (None, None),
        };

        let window = resolve(&grid, times.as_deref(), request);
        debug!("{} window is {window:?}", target.name);

        let data = if self.config.multifile && target.coords.has_time() {
            let axis = target
                .coords
                .time
                .as_ref()
                .and_then(|time_name| self.axes.get(time_name))
                .ok_or_else(|| Error::BadName(format!("time axis of {}", target.name)))?;
            MultiFileStitcher::new(self.opener.as_ref(), axis, &self.retriever)
                .fetch(&target.remote, &window)
                .await?
        } else {
            let records = window.time.map_or(0..1, |time| time.range());
            self.retriever
                .fetch(self.source.as_ref(), &target.remote, &window, records)
                .await?
        };

        let times = match (&times, window.time) {
            (Some(times), Some(time)) => times[time.range()].to_vec(),
            _ => vec![synthetic_time(request)?],
        };

        let sub = grid.subset(&window);
        let x = self.coordinate(&target.coords.x, sub.horizontal.x_values())?;
        let y = self.coordinate(&target.coords.y, sub.horizontal.y_values())?;
        let depth = match (&target.coords.depth, sub.depth) {
            (Some(name), Some(values)) => Some(self.coordinate(name, values.into_dyn())?),
            _ => None,
        };

        Ok(Subset {
            name: target.name,
            info,
            x,
            y,
            depth,
            time: time_info,
            times,
            data,
            window,
        })
    }

    /// Retrieve every configured variable in turn, writing each to `store` if given.
    ///
    pub async fn run(
        &mut self,
        request: &Request,
        mut store: Option<&mut dyn OutputStore>,
    ) -> Result<Vec<Retrieved>> {
        let names: Vec<String> = self.targets.iter().map(|t| t.name.clone()).collect();
        let mut retrieved = Vec::with_capacity(names.len());
        for name in names {
            let subset = self.load(&name, request).await?;
            let report = match store.as_deref_mut() {
                Some(store) => {
                    self.describe(store)?;
                    let report =
                        OutputStoreWriter::new(store, self.config.strict_append).write(&subset)?;
                    info!(
                        "wrote {} records of {} at {}",
                        report.rows_written, report.variable, report.offset
                    );
                    Some(report)
                }
                None => None,
            };

            retrieved.push(Retrieved { subset, report });
        }

        Ok(retrieved)
    }

    /// Write just the full coordinates of a configured variable
    ///
    pub async fn write_grid(&mut self, name: &str, store: &mut dyn OutputStore) -> Result<()> {
        let coords = self.target(name)?.coords.clone();
        let grid = self.grid(&coords).await?;

        let mut coordinates = vec![
            self.coordinate(&coords.x, grid.horizontal.x_values())?,
            self.coordinate(&coords.y, grid.horizontal.y_values())?,
        ];
        if let (Some(name), Some(values)) = (&coords.depth, grid.depth) {
            coordinates.push(self.coordinate(name, values.into_dyn())?);
        }

        self.describe(store)?;
        let mut writer = OutputStoreWriter::new(store, self.config.strict_append);
        for coordinate in &coordinates {
            info!("writing grid coordinate {}", coordinate.info.name);
            writer.write_coordinate(coordinate)?;
        }

        store.flush()
    }

    /// Give a store its global attributes, unless it already has them
    ///
    fn describe(&self, store: &mut dyn OutputStore) -> Result<()> {
        if store.attribute("title").is_none() {
            store.set_attribute("title", AttrValue::Text(self.config.kind.title()))?;
        }
        if store.attribute("url").is_none() {
            store.set_attribute("url", AttrValue::Text(self.config.sources.join(" ")))?;
        }

        Ok(())
    }
}

async fn open_with_retry(
    opener: &dyn Opener,
    location: &str,
    config: &Config,
) -> Result<Box<dyn Source>> {
    info!("opening {location}");
    config
        .retry
        .run(&format!("open of {location}"), || opener.open(location))
        .await
}

/// Timestamp for data without a time dimension: the start of the requested time range, or the
/// Unix epoch
///
fn synthetic_time(request: &Request) -> Result<Timestamp> {
    match request.time {
        Some([t1, t2]) => Ok(rearrange(t1, t2).0),
        None => TimeUnits::parse(EPOCH_UNITS)?.decode(0.0),
    }
}
