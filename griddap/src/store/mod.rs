//! Local, appendable storage for retrieved data.
//!
//! An `OutputStore` holds named dimensions (at most one of them unlimited), variables defined
//! over those dimensions, and attributes. Variables whose first dimension is unlimited grow by
//! appending records.
//!
use std::collections::BTreeMap;

use log::debug;
use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn};

use crate::{
    errors::{Error, Result},
    source::{AttrValue, Attributes, DataType},
};

pub mod writer;

pub use writer::{OutputStoreWriter, Placement, WriteReport};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,

    /// Current length. For an unlimited dimension, the most records written to any variable.
    pub len: usize,

    pub unlimited: bool,
}

/// Definition of a stored variable
///
#[derive(Clone, Debug, PartialEq)]
pub struct VariableDef {
    pub name: String,
    pub dtype: DataType,
    pub dimensions: Vec<String>,
    pub attributes: Attributes,

    /// Value read back for samples never written. Also stands in for NaN in integer variables.
    pub fill_value: Option<f64>,
}

impl VariableDef {
    pub fn new<S: Into<String>>(name: S, dtype: DataType, dimensions: &[&str]) -> Self {
        Self {
            name: name.into(),
            dtype,
            dimensions: dimensions.iter().map(|d| d.to_string()).collect(),
            attributes: Attributes::new(),
            fill_value: None,
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_attribute<S, V>(mut self, name: S, value: V) -> Self
    where
        S: Into<String>,
        V: Into<AttrValue>,
    {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_fill_value(mut self, fill_value: f64) -> Self {
        self.fill_value = Some(fill_value);
        self
    }
}

/// A persistent container that retrieved variables are written to
///
pub trait OutputStore: Send {
    fn dimension(&self, name: &str) -> Option<Dimension>;

    /// Create a dimension. `None` creates the store's unlimited dimension.
    ///
    fn create_dimension(&mut self, name: &str, len: Option<usize>) -> Result<()>;

    fn variable(&self, name: &str) -> Option<VariableDef>;

    /// Create a variable. Its dimensions must already exist.
    ///
    fn create_variable(&mut self, def: VariableDef) -> Result<()>;

    /// Global attribute
    ///
    fn attribute(&self, name: &str) -> Option<AttrValue>;

    fn set_attribute(&mut self, name: &str, value: AttrValue) -> Result<()>;

    /// Extent of a variable along its first dimension that has been written so far.
    ///
    /// Variables that are not along the unlimited dimension always report their full length.
    ///
    fn records(&self, name: &str) -> Result<usize>;

    /// The whole of a variable. Unwritten samples read as the fill value, or NaN.
    ///
    fn read(&self, name: &str) -> Result<ArrayD<f64>>;

    /// Write `data` to a variable starting at `offset` along its first dimension.
    ///
    /// Only variables along the unlimited dimension may be written at a non-zero offset, or
    /// partially.
    ///
    fn write(&mut self, name: &str, offset: usize, data: ArrayViewD<f64>) -> Result<()>;

    /// Make sure everything written so far is persisted
    ///
    fn flush(&mut self) -> Result<()>;
}

/// Check a new variable against the dimensions it is defined over
///
pub fn check_definition(def: &VariableDef, dimensions: &[Option<Dimension>]) -> Result<()> {
    for (i, (name, dim)) in def.dimensions.iter().zip(dimensions).enumerate() {
        let dim = dim.as_ref().ok_or_else(|| Error::BadDimension(name.clone()))?;
        if dim.unlimited && i > 0 {
            return Err(Error::BadDimension(format!(
                "{name} must be the first dimension of {}",
                def.name
            )));
        }
    }

    Ok(())
}

/// Check that `got` can be written at `offset` to a variable with the given shape
///
pub fn check_write(
    name: &str,
    shape: &[usize],
    record: bool,
    offset: usize,
    got: &[usize],
) -> Result<()> {
    let mismatch = |expected: Vec<usize>| Error::ShapeMismatch {
        name: name.to_string(),
        expected,
        got: got.to_vec(),
    };
    if got.len() != shape.len() {
        return Err(mismatch(shape.to_vec()));
    }

    if record {
        if got[1..] != shape[1..] {
            let mut expected = shape.to_vec();
            expected[0] = got[0];
            return Err(mismatch(expected));
        }
    } else {
        if offset != 0 {
            return Err(Error::OutOfBounds {
                name: name.to_string(),
                ranges: vec![offset..offset + got.first().copied().unwrap_or(1)],
                shape: shape.to_vec(),
            });
        }
        if got != shape {
            return Err(mismatch(shape.to_vec()));
        }
    }

    Ok(())
}

struct StoredVariable {
    def: VariableDef,

    /// One array per record for record variables, a single array for the rest
    written: Vec<Option<ArrayD<f64>>>,
}

/// An `OutputStore` held in RAM
///
#[derive(Default)]
pub struct MemoryStore {
    dimensions: Vec<Dimension>,
    variables: BTreeMap<String, StoredVariable>,
    attributes: Attributes,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn stored(&self, name: &str) -> Result<&StoredVariable> {
        self.variables
            .get(name)
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
}

impl OutputStore for MemoryStore {
    fn dimension(&self, name: &str) -> Option<Dimension> {
        self.dimensions.iter().find(|dim| dim.name == name).cloned()
    }

    fn create_dimension(&mut self, name: &str, len: Option<usize>) -> Result<()> {
        if self.dimension(name).is_some() {
            return Err(Error::Exists(format!("dimension {name}")));
        }
        if len.is_none() {
            if let Some(dim) = self.dimensions.iter().find(|dim| dim.unlimited) {
                return Err(Error::Exists(format!("unlimited dimension {}", dim.name)));
            }
        }

        debug!("creating dimension {name} ({len:?})");
        self.dimensions.push(Dimension {
            name: name.to_string(),
            len: len.unwrap_or(0),
            unlimited: len.is_none(),
        });

        Ok(())
    }

    fn variable(&self, name: &str) -> Option<VariableDef> {
        self.variables.get(name).map(|var| var.def.clone())
    }

    fn create_variable(&mut self, def: VariableDef) -> Result<()> {
        if self.variables.contains_key(&def.name) {
            return Err(Error::Exists(format!("variable {}", def.name)));
        }
        let dimensions: Vec<Option<Dimension>> =
            def.dimensions.iter().map(|name| self.dimension(name)).collect();
        check_definition(&def, &dimensions)?;

        debug!("creating variable {} {:?}", def.name, def.dimensions);
        self.variables.insert(
            def.name.clone(),
            StoredVariable {
                def,
                written: vec![],
            },
        );

        Ok(())
    }

    fn attribute(&self, name: &str) -> Option<AttrValue> {
        self.attributes.get(name).cloned()
    }

    fn set_attribute(&mut self, name: &str, value: AttrValue) -> Result<()> {
        self.attributes.insert(name.to_string(), value);

        Ok(())
    }

    fn records(&self, name: &str) -> Result<usize> {
        let var = self.stored(name)?;
        if self.is_record_variable(&var.def) {
            Ok(var.written.len())
        } else {
            Ok(self.shape(&var.def)?.first().copied().unwrap_or(1))
        }
    }

    fn read(&self, name: &str) -> Result<ArrayD<f64>> {
        let var = self.stored(name)?;
        let shape = self.shape(&var.def)?;
        let fill = var.def.fill_value.unwrap_or(f64::NAN);

        let mut data = ArrayD::from_elem(IxDyn(&shape), fill);
        if self.is_record_variable(&var.def) {
            for (i, record) in var.written.iter().enumerate() {
                if let Some(record) = record {
                    data.index_axis_mut(Axis(0), i).assign(record);
                }
            }
        } else if let Some(Some(values)) = var.written.first() {
            data.assign(values);
        }

        Ok(data)
    }

    fn write(&mut self, name: &str, offset: usize, data: ArrayViewD<f64>) -> Result<()> {
        let def = self.stored(name)?.def.clone();
        let shape = self.shape(&def)?;
        let record = self.is_record_variable(&def);
        check_write(name, &shape, record, offset, data.shape())?;

        let values = data.mapv(|value| def.dtype.coerce(value, def.fill_value));
        if record {
            let end = offset + values.shape()[0];
            debug!("writing {name} records {offset}..{end}");

            let var = self
                .variables
                .get_mut(name)
                .ok_or_else(|| Error::BadName(name.to_string()))?;
            if var.written.len() < end {
                var.written.resize(end, None);
            }
            for (i, values) in values.outer_iter().enumerate() {
                var.written[offset + i] = Some(values.to_owned());
            }

            let unlimited = &def.dimensions[0];
            if let Some(dim) = self.dimensions.iter_mut().find(|dim| &dim.name == unlimited) {
                dim.len = dim.len.max(end);
            }
        } else {
            debug!("writing {name}");
            if let Some(var) = self.variables.get_mut(name) {
                var.written = vec![Some(values)];
            }
        }

        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
