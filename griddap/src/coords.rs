//! Working out which variables hold the coordinates of a data variable.
//!
use serde::Deserialize;

use crate::{
    errors::{Error, Result},
    source::VariableInfo,
};

/// Names of the coordinate variables for each role of a data variable.
///
/// `time` and `depth` are absent for variables without those dimensions.
///
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Hash)]
#[serde(deny_unknown_fields)]
pub struct CoordNames {
    #[serde(default)]
    pub time: Option<String>,

    #[serde(default)]
    pub depth: Option<String>,

    pub y: String,
    pub x: String,
}

impl CoordNames {
    pub fn new<S: Into<String>>(y: S, x: S) -> Self {
        Self {
            time: None,
            depth: None,
            y: y.into(),
            x: x.into(),
        }
    }

    pub fn with_time<S: Into<String>>(mut self, time: S) -> Self {
        self.time = Some(time.into());
        self
    }

    pub fn with_depth<S: Into<String>>(mut self, depth: S) -> Self {
        self.depth = Some(depth.into());
        self
    }

    /// Guess coordinate roles from a variable's metadata.
    ///
    /// A `coordinates` attribute, when present, names the horizontal coordinates as
    /// `"<x> <y> ..."`. Otherwise dimensions are taken to be `(time, depth, y, x)`,
    /// `(time, y, x)` or `(y, x)` depending on their number.
    ///
    pub fn infer(info: &VariableInfo) -> Result<Self> {
        let unresolved = |reason: &str| Error::UnresolvedCoordinates {
            variable: info.name.clone(),
            reason: reason.to_string(),
        };

        let dims = &info.dimensions;
        let ndim = dims.len();
        if !(2..=4).contains(&ndim) {
            return Err(unresolved(&format!("{ndim} dimensions")));
        }

        let listed: Vec<&str> = info
            .text("coordinates")
            .map(|coords| coords.split_whitespace().collect())
            .unwrap_or_default();

        let (time, depth, y, x) = if listed.len() >= 2 {
            let time = (ndim >= 3).then(|| dims[0].clone());
            let depth = (ndim == 4).then(|| dims[1].clone());
            (time, depth, listed[1].to_string(), listed[0].to_string())
        } else {
            match dims.as_slice() {
                [t, z, y, x] => (Some(t.clone()), Some(z.clone()), y.clone(), x.clone()),
                [t, y, x] => (Some(t.clone()), None, y.clone(), x.clone()),
                [y, x] => (None, None, y.clone(), x.clone()),
                _ => return Err(unresolved("unexpected dimensions")),
            }
        };

        // Names in the wrong roles
        let (y, x) = if x.to_lowercase().contains("lat") || y.to_lowercase().contains("lon") {
            (x, y)
        } else {
            (y, x)
        };

        let (y, x) = if x == "X" || y == "Y" {
            ("Latitude".to_string(), "Longitude".to_string())
        } else {
            (y, x)
        };

        Ok(Self { time, depth, y, x })
    }

    /// Whether the variable has a time dimension
    ///
    pub fn has_time(&self) -> bool {
        self.time.is_some()
    }
}
