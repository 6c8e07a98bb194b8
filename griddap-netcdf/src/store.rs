use std::path::{Path, PathBuf};

use griddap::{
    source::FILL_VALUE,
    store::{check_definition, check_write},
    AttrValue, Dimension, Error, OutputStore, Result, VariableDef,
};
use log::{debug, info};
use ndarray::{ArrayD, ArrayViewD, IxDyn};

use crate::{convert, status::store_error};

/// zlib level used unless told otherwise
pub const DEFAULT_COMPRESSION: i32 = 4;

/// An `OutputStore` kept in a netCDF-4 file.
///
/// Variables with more than one dimension are zlib compressed, with the shuffle filter.
///
pub struct NetcdfStore {
    path: PathBuf,

    /// Only `None` if reopening the file after a flush failed
    file: Option<netcdf::FileMut>,

    compression: Option<i32>,
}

impl NetcdfStore {
    /// Create a new, empty store, replacing anything already at `path`
    ///
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = netcdf::create(&path)
            .map_err(|err| store_error(&format!("creating {}", path.display()), err))?;
        info!("created {}", path.display());

        Ok(Self {
            path,
            file: Some(file),
            compression: Some(DEFAULT_COMPRESSION),
        })
    }

    /// Open the store at `path` to add to it, creating it if there isn't one yet
    ///
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Self::create(path);
        }

        let file = netcdf::append(path)
            .map_err(|err| store_error(&format!("opening {}", path.display()), err))?;
        info!("opened {} to append", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            compression: Some(DEFAULT_COMPRESSION),
        })
    }

    /// zlib level (1 to 9) for variables created from now on. `None` turns compression off.
    ///
    pub fn with_compression(mut self, level: Option<i32>) -> Self {
        self.compression = level;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file(&self) -> Result<&netcdf::FileMut> {
        self.file
            .as_ref()
            .ok_or_else(|| Error::Store(format!("{} is closed", self.path.display())))
    }

    fn file_mut(&mut self) -> Result<&mut netcdf::FileMut> {
        let path = &self.path;
        self.file
            .as_mut()
            .ok_or_else(|| Error::Store(format!("{} is closed", path.display())))
    }

    fn def(&self, name: &str) -> Result<VariableDef> {
        self.variable(name)
            .ok_or_else(|| Error::BadName(name.to_string()))
    }

    fn is_record_variable(&self, def: &VariableDef) -> bool {
        def.dimensions
            .first()
            .and_then(|name| self.dimension(name))
            .map_or(false, |dim| dim.unlimited)
    }

    fn shape(&self, def: &VariableDef) -> Result<Vec<usize>> {
        def.dimensions
            .iter()
            .map(|name| {
                self.dimension(name)
                    .map(|dim| dim.len)
                    .ok_or_else(|| Error::BadDimension(name.clone()))
            })
            .collect()
    }

    fn read_slab(&self, def: &VariableDef, start: &[usize], count: &[usize]) -> Result<Vec<f64>> {
        let file = self.file()?;
        let var = file
            .variable(&def.name)
            .ok_or_else(|| Error::BadName(def.name.clone()))?;

        convert::read(&var, def.dtype, start, count)
            .map_err(|err| store_error(&format!("reading {}", def.name), err))
    }
}

/// Whether a stored sample is one that was never written
///
fn unwritten(def: &VariableDef, value: f64) -> bool {
    let fill = def
        .fill_value
        .unwrap_or_else(|| convert::default_fill(def.dtype));

    value.is_nan() || value == fill
}

impl OutputStore for NetcdfStore {
    fn dimension(&self, name: &str) -> Option<Dimension> {
        let dim = self.file.as_ref()?.dimension(name)?;

        Some(Dimension {
            name: dim.name(),
            len: dim.len(),
            unlimited: dim.is_unlimited(),
        })
    }

    fn create_dimension(&mut self, name: &str, len: Option<usize>) -> Result<()> {
        if self.dimension(name).is_some() {
            return Err(Error::Exists(format!("dimension {name}")));
        }

        let file = self.file_mut()?;
        let what = format!("creating dimension {name}");
        match len {
            Some(len) => {
                file.add_dimension(name, len)
                    .map_err(|err| store_error(&what, err))?;
            }
            None => {
                if let Some(dim) = file.dimensions().find(|dim| dim.is_unlimited()) {
                    return Err(Error::Exists(format!("unlimited dimension {}", dim.name())));
                }
                file.add_unlimited_dimension(name)
                    .map_err(|err| store_error(&what, err))?;
            }
        }
        debug!("created dimension {name} ({len:?})");

        Ok(())
    }

    fn variable(&self, name: &str) -> Option<VariableDef> {
        let var = self.file.as_ref()?.variable(name)?;
        let dtype = convert::data_type(&var.vartype())?;

        let mut attributes = convert::attributes(var.attributes());
        let fill_value = attributes
            .remove(FILL_VALUE)
            .and_then(|value| value.as_f64());

        Some(VariableDef {
            name: var.name(),
            dtype,
            dimensions: var.dimensions().iter().map(|dim| dim.name()).collect(),
            attributes,
            fill_value,
        })
    }

    fn create_variable(&mut self, def: VariableDef) -> Result<()> {
        if self.variable(&def.name).is_some() {
            return Err(Error::Exists(format!("variable {}", def.name)));
        }
        let dimensions: Vec<Option<Dimension>> =
            def.dimensions.iter().map(|name| self.dimension(name)).collect();
        check_definition(&def, &dimensions)?;

        let compression = self.compression;
        let what = format!("creating variable {}", def.name);
        let file = self.file_mut()?;
        let mut var = convert::add_variable(file, &def).map_err(|err| store_error(&what, err))?;
        if let (Some(level), true) = (compression, def.dimensions.len() > 1) {
            var.set_compression(level, true)
                .map_err(|err| store_error(&what, err))?;
        }
        if let Some(fill) = def.fill_value {
            convert::set_fill_value(&mut var, def.dtype, def.dtype.coerce(fill, None))
                .map_err(|err| store_error(&what, err))?;
        }
        for (name, value) in def.attributes.iter().filter(|(name, _)| *name != FILL_VALUE) {
            var.put_attribute(name, convert::nc_value(value))
                .map_err(|err| store_error(&what, err))?;
        }
        debug!("created variable {} {:?}", def.name, def.dimensions);

        Ok(())
    }

    fn attribute(&self, name: &str) -> Option<AttrValue> {
        let value = self.file.as_ref()?.attribute(name)?.value().ok()?;

        convert::attr_value(value)
    }

    fn set_attribute(&mut self, name: &str, value: AttrValue) -> Result<()> {
        self.file_mut()?
            .add_attribute(name, convert::nc_value(&value))
            .map_err(|err| store_error(&format!("setting attribute {name}"), err))?;

        Ok(())
    }

    fn records(&self, name: &str) -> Result<usize> {
        let def = self.def(name)?;
        let shape = self.shape(&def)?;
        if !self.is_record_variable(&def) {
            return Ok(shape.first().copied().unwrap_or(1));
        }

        // The unlimited dimension is as long as the longest variable along it, so this
        // variable's own extent is wherever its last written record is.
        let mut start = vec![0; shape.len()];
        let mut count = shape.clone();
        count[0] = 1;
        for record in (0..shape[0]).rev() {
            start[0] = record;
            let values = self.read_slab(&def, &start, &count)?;
            if values.iter().any(|&value| !unwritten(&def, value)) {
                return Ok(record + 1);
            }
        }

        Ok(0)
    }

    fn read(&self, name: &str) -> Result<ArrayD<f64>> {
        let def = self.def(name)?;
        let shape = self.shape(&def)?;
        if shape.iter().any(|&n| n == 0) {
            return Ok(ArrayD::from_elem(IxDyn(&shape), f64::NAN));
        }

        let start = vec![0; shape.len()];
        let mut values = self.read_slab(&def, &start, &shape)?;
        if def.fill_value.is_none() {
            let fill = convert::default_fill(def.dtype);
            for value in values.iter_mut().filter(|value| **value == fill) {
                *value = f64::NAN;
            }
        }

        ArrayD::from_shape_vec(IxDyn(&shape), values)
            .map_err(|err| Error::Store(format!("reading {name}: {err}")))
    }

    fn write(&mut self, name: &str, offset: usize, data: ArrayViewD<f64>) -> Result<()> {
        let def = self.def(name)?;
        let shape = self.shape(&def)?;
        let record = self.is_record_variable(&def);
        check_write(name, &shape, record, offset, data.shape())?;
        if data.is_empty() {
            return Ok(());
        }

        let values: Vec<f64> = data
            .iter()
            .map(|&value| def.dtype.coerce(value, def.fill_value))
            .collect();
        let mut start = vec![0; data.ndim()];
        if record {
            start[0] = offset;
            debug!("writing {name} records {offset}..{}", offset + data.shape()[0]);
        } else {
            debug!("writing {name}");
        }

        let what = format!("writing {name}");
        let mut var = self
            .file_mut()?
            .variable_mut(name)
            .ok_or_else(|| Error::BadName(name.to_string()))?;
        convert::write(&mut var, def.dtype, &values, &start, data.shape())
            .map_err(|err| store_error(&what, err))
    }

    /// netCDF only promises that data is on disk once the file is closed, so flushing closes
    /// the file and opens it again.
    ///
    fn flush(&mut self) -> Result<()> {
        drop(self.file.take());
        let file = netcdf::append(&self.path)
            .map_err(|err| store_error(&format!("reopening {}", self.path.display()), err))?;
        self.file = Some(file);

        Ok(())
    }
}
