//! Translating physical coordinate ranges into index windows.
//!
use ndarray::{s, Array1, Array2, ArrayD, Axis, Ix1, Ix2, Slice};

use crate::{
    config::Config,
    coords::CoordNames,
    errors::{Error, Result},
    geom::{IndexWindow, Window},
    helpers::rearrange,
    locate::{nearest_1d, nearest_2d, nearest_time},
    source::Source,
    time::{parse_timestamp, Timestamp},
};

/// Horizontal coordinates of a grid
///
#[derive(Clone, Debug, PartialEq)]
pub enum Horizontal {
    /// Separate 1D axes, `x` along columns and `y` along rows
    Rectilinear { x: Array1<f64>, y: Array1<f64> },

    /// Coordinates given for every grid point, both arrays are `(rows, cols)`
    Curvilinear { x: Array2<f64>, y: Array2<f64> },
}

impl Horizontal {
    pub fn rows(&self) -> usize {
        match self {
            Horizontal::Rectilinear { y, .. } => y.len(),
            Horizontal::Curvilinear { y, .. } => y.nrows(),
        }
    }

    pub fn cols(&self) -> usize {
        match self {
            Horizontal::Rectilinear { x, .. } => x.len(),
            Horizontal::Curvilinear { x, .. } => x.ncols(),
        }
    }

    pub fn x_values(&self) -> ArrayD<f64> {
        match self {
            Horizontal::Rectilinear { x, .. } => x.clone().into_dyn(),
            Horizontal::Curvilinear { x, .. } => x.clone().into_dyn(),
        }
    }

    pub fn y_values(&self) -> ArrayD<f64> {
        match self {
            Horizontal::Rectilinear { y, .. } => y.clone().into_dyn(),
            Horizontal::Curvilinear { y, .. } => y.clone().into_dyn(),
        }
    }
}

/// Spatial coordinates of a variable
///
#[derive(Clone, Debug, PartialEq)]
pub struct Grid {
    pub horizontal: Horizontal,
    pub depth: Option<Array1<f64>>,
}

impl Grid {
    /// Read the coordinate variables named by `names` from `source`.
    ///
    pub async fn load(source: &dyn Source, names: &CoordNames) -> Result<Self> {
        let x = source.read_all(&names.x).await?;
        let y = source.read_all(&names.y).await?;

        let horizontal = match (x.ndim(), y.ndim()) {
            (1, 1) => Horizontal::Rectilinear {
                x: to_1d(&names.x, x)?,
                y: to_1d(&names.y, y)?,
            },
            (2, 2) => {
                if x.shape() != y.shape() {
                    return Err(Error::ShapeMismatch {
                        name: names.y.clone(),
                        expected: x.shape().to_vec(),
                        got: y.shape().to_vec(),
                    });
                }
                Horizontal::Curvilinear {
                    x: to_2d(&names.x, x)?,
                    y: to_2d(&names.y, y)?,
                }
            }
            (xdim, ydim) => {
                return Err(Error::UnresolvedCoordinates {
                    variable: format!("{}/{}", names.x, names.y),
                    reason: format!("coordinates have {xdim} and {ydim} dimensions"),
                });
            }
        };

        if horizontal.rows() == 0 || horizontal.cols() == 0 {
            return Err(Error::ShapeMismatch {
                name: format!("{}/{}", names.x, names.y),
                expected: vec![1, 1],
                got: vec![horizontal.rows(), horizontal.cols()],
            });
        }

        let depth = match &names.depth {
            Some(name) => {
                let depth = to_1d(name, source.read_all(name).await?)?;
                if depth.is_empty() {
                    return Err(Error::ShapeMismatch {
                        name: name.clone(),
                        expected: vec![1],
                        got: vec![0],
                    });
                }
                Some(depth)
            }
            None => None,
        };

        Ok(Self { horizontal, depth })
    }

    /// Coordinates of the part of this grid covered by `window`
    ///
    pub fn subset(&self, window: &Window) -> Self {
        let rows = Slice::from(window.y.range());
        let cols = Slice::from(window.x.range());
        let horizontal = match &self.horizontal {
            Horizontal::Rectilinear { x, y } => Horizontal::Rectilinear {
                x: x.slice_axis(Axis(0), cols).to_owned(),
                y: y.slice_axis(Axis(0), rows).to_owned(),
            },
            Horizontal::Curvilinear { x, y } => {
                let (rows, cols) = (window.y.range(), window.x.range());
                Horizontal::Curvilinear {
                    x: x.slice(s![rows.clone(), cols.clone()]).to_owned(),
                    y: y.slice(s![rows, cols]).to_owned(),
                }
            }
        };
        let depth = match (&self.depth, window.depth) {
            (Some(depth), Some(levels)) => {
                Some(depth.slice_axis(Axis(0), Slice::from(levels.range())).to_owned())
            }
            (depth, _) => depth.clone(),
        };

        Self { horizontal, depth }
    }
}

fn to_1d(name: &str, data: ArrayD<f64>) -> Result<Array1<f64>> {
    let shape = data.shape().to_vec();
    data.into_dimensionality::<Ix1>()
        .map_err(|_| Error::ShapeMismatch {
            name: name.to_string(),
            expected: vec![0],
            got: shape,
        })
}

fn to_2d(name: &str, data: ArrayD<f64>) -> Result<Array2<f64>> {
    let shape = data.shape().to_vec();
    data.into_dimensionality::<Ix2>()
        .map_err(|_| Error::ShapeMismatch {
            name: name.to_string(),
            expected: vec![0, 0],
            got: shape,
        })
}

/// Physical ranges to retrieve.
///
/// Any range left as `None` means the whole axis.
///
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Request {
    pub x: Option<[f64; 2]>,
    pub y: Option<[f64; 2]>,
    pub depth: Option<[f64; 2]>,
    pub time: Option<[Timestamp; 2]>,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    /// The box between two `(x, y)` corners
    ///
    pub fn with_box(self, corner1: (f64, f64), corner2: (f64, f64)) -> Self {
        self.with_x(corner1.0, corner2.0)
            .with_y(corner1.1, corner2.1)
    }

    pub fn with_x(mut self, x1: f64, x2: f64) -> Self {
        self.x = Some([x1, x2]);
        self
    }

    pub fn with_y(mut self, y1: f64, y2: f64) -> Self {
        self.y = Some([y1, y2]);
        self
    }

    pub fn with_depth(mut self, z1: f64, z2: f64) -> Self {
        self.depth = Some([z1, z2]);
        self
    }

    pub fn with_time(mut self, t1: Timestamp, t2: Timestamp) -> Self {
        self.time = Some([t1, t2]);
        self
    }

    /// Time range given as strings in `format`, eg `"20200101.000000"` for
    /// `time::DEFAULT_FORMAT`
    ///
    pub fn with_time_str(self, t1: &str, t2: &str, format: &str) -> Result<Self> {
        let t1 = parse_timestamp(t1, format)?;
        let t2 = parse_timestamp(t2, format)?;

        Ok(self.with_time(t1, t2))
    }

    /// Time range given as strings in the format configured for a retrieval
    ///
    pub fn with_configured_time(self, t1: &str, t2: &str, config: &Config) -> Result<Self> {
        self.with_time_str(t1, t2, &config.time_format)
    }
}

fn axis_window(axis: &Array1<f64>, range: Option<[f64; 2]>) -> IndexWindow {
    match range {
        None => IndexWindow::full(axis.len()),
        Some([lo, hi]) => IndexWindow::new(
            nearest_1d(axis.view(), lo),
            nearest_1d(axis.view(), hi),
        ),
    }
}

/// Resolve a request against a variable's grid and (for variables with a time dimension) its
/// time axis.
///
/// Windows are half open: the index nearest the upper end of a range is excluded unless the
/// window would otherwise be empty.
///
pub fn resolve(grid: &Grid, times: Option<&[Timestamp]>, request: &Request) -> Window {
    let (y, x) = match &grid.horizontal {
        Horizontal::Rectilinear { x, y } => {
            (axis_window(y, request.y), axis_window(x, request.x))
        }
        Horizontal::Curvilinear { x, y } => match (request.x, request.y) {
            (Some([x1, x2]), Some([y1, y2])) => {
                let (row1, col1) = nearest_2d(x.view(), y.view(), (x1, y1));
                let (row2, col2) = nearest_2d(x.view(), y.view(), (x2, y2));
                (IndexWindow::new(row1, row2), IndexWindow::new(col1, col2))
            }
            _ => (IndexWindow::full(y.nrows()), IndexWindow::full(x.ncols())),
        },
    };

    let depth = grid
        .depth
        .as_ref()
        .map(|depth| axis_window(depth, request.depth));

    let time = times.map(|times| match request.time {
        None => IndexWindow::full(times.len()),
        Some([t1, t2]) => {
            let (t1, t2) = rearrange(t1, t2);
            IndexWindow::new(nearest_time(times, t1), nearest_time(times, t2))
        }
    });

    Window { time, depth, y, x }
}
