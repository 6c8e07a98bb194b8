use std::{collections::BTreeMap, ops::Range, sync::Arc};

use async_trait::async_trait;
use griddap::{Error, Opener, Result, Source, VariableInfo};
use log::{debug, info};
use ndarray::{ArrayD, IxDyn};
use parking_lot::Mutex;
use tokio::task;

use crate::{
    convert,
    status::{open_error, read_error},
};

/// A netCDF file, local or served over OPeNDAP
///
/// Variables whose type isn't numeric are left out.
///
pub struct NetcdfSource {
    location: String,
    file: Arc<Mutex<netcdf::File>>,
    dimensions: BTreeMap<String, usize>,
    variables: BTreeMap<String, VariableInfo>,
}

impl NetcdfSource {
    pub fn new<S: Into<String>>(location: S, file: netcdf::File) -> Self {
        let location = location.into();
        let dimensions = file
            .dimensions()
            .map(|dim| (dim.name(), dim.len()))
            .collect();

        let mut variables = BTreeMap::new();
        for var in file.variables() {
            let name = var.name();
            match convert::data_type(&var.vartype()) {
                Some(dtype) => {
                    let info = VariableInfo {
                        name: name.clone(),
                        dimensions: var.dimensions().iter().map(|dim| dim.name()).collect(),
                        dtype,
                        attributes: convert::attributes(var.attributes()),
                    };
                    variables.insert(name, info);
                }
                None => debug!("{location}: skipping non-numeric variable {name}"),
            }
        }

        Self {
            location,
            file: Arc::new(Mutex::new(file)),
            dimensions,
            variables,
        }
    }
}

#[async_trait]
impl Source for NetcdfSource {
    fn location(&self) -> &str {
        &self.location
    }

    fn dimension_len(&self, name: &str) -> Option<usize> {
        self.dimensions.get(name).copied()
    }

    fn variable(&self, name: &str) -> Option<&VariableInfo> {
        self.variables.get(name)
    }

    async fn read(&self, name: &str, ranges: &[Range<usize>]) -> Result<ArrayD<f64>> {
        let shape = self.shape_of(name)?;
        let in_bounds = ranges.len() == shape.len()
            && ranges
                .iter()
                .zip(&shape)
                .all(|(range, &len)| range.start <= range.end && range.end <= len);
        if !in_bounds {
            return Err(Error::OutOfBounds {
                name: name.to_string(),
                ranges: ranges.to_vec(),
                shape,
            });
        }

        let start: Vec<usize> = ranges.iter().map(|range| range.start).collect();
        let count: Vec<usize> = ranges.iter().map(|range| range.end - range.start).collect();
        if count.iter().any(|&n| n == 0) {
            return Ok(ArrayD::zeros(IxDyn(&count)));
        }

        let dtype = self.variable_info(name)?.dtype;
        let file = Arc::clone(&self.file);
        let variable = name.to_string();
        let (read_start, read_count) = (start.clone(), count.clone());
        let values = task::spawn_blocking(move || {
            let file = file.lock();
            let var = file
                .variable(&variable)
                .ok_or_else(|| Error::BadName(variable.clone()))?;

            Ok::<_, Error>(convert::read(&var, dtype, &read_start, &read_count))
        })
        .await
        .map_err(|err| Error::protocol(&self.location, err))??
        .map_err(|err| read_error(&self.location, err))?;

        debug!("read {name} {ranges:?} from {}", self.location);
        ArrayD::from_shape_vec(IxDyn(&count), values)
            .map_err(|err| Error::protocol(&self.location, format!("reading {name}: {err}")))
    }
}

/// Opens netCDF files by path, and OPeNDAP datasets by URL.
///
/// Relies on the netCDF library to speak DAP, so it must have been built with DAP support for
/// URLs to work.
///
#[derive(Clone, Debug, Default)]
pub struct NetcdfOpener;

impl NetcdfOpener {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Opener for NetcdfOpener {
    async fn open(&self, location: &str) -> Result<Box<dyn Source>> {
        let path = location.to_string();
        let file = task::spawn_blocking(move || netcdf::open(path))
            .await
            .map_err(|err| Error::protocol(location, err))?
            .map_err(|err| open_error(location, err))?;

        let source = NetcdfSource::new(location, file);
        info!(
            "opened {location}: {} dimensions, {} variables",
            source.dimensions.len(),
            source.variables.len()
        );

        Ok(Box::new(source))
    }
}
