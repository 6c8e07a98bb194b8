use std::{collections::BTreeMap, ops::Range};

use async_trait::async_trait;
use ndarray::ArrayD;

use crate::{
    errors::{Error, Result},
    time::{TimeUnits, Timestamp},
};

/// Numeric type of values stored in a variable
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    F32,
    F64,
}

impl DataType {
    /// The value actually stored for `value` in a variable of this type.
    ///
    /// Integers are rounded and clamped to the type's range. NaN is not an integer, so it
    /// becomes `fill`, or 0 without one.
    ///
    pub fn coerce(self, value: f64, fill: Option<f64>) -> f64 {
        let (min, max) = match self {
            DataType::F64 => return value,
            DataType::F32 => return value as f32 as f64,
            DataType::I8 => (i8::MIN as f64, i8::MAX as f64),
            DataType::U8 => (0.0, u8::MAX as f64),
            DataType::I16 => (i16::MIN as f64, i16::MAX as f64),
            DataType::U16 => (0.0, u16::MAX as f64),
            DataType::I32 => (i32::MIN as f64, i32::MAX as f64),
            DataType::U32 => (0.0, u32::MAX as f64),
            DataType::I64 => (i64::MIN as f64, i64::MAX as f64),
        };
        if value.is_nan() {
            return fill.unwrap_or(0.0);
        }

        value.round().clamp(min, max)
    }
}

/// Value of a variable or global attribute
///
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Text(String),
    Numbers(Vec<f64>),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Text(text) => Some(text),
            AttrValue::Numbers(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Numbers(numbers) => numbers.first().copied(),
            AttrValue::Text(_) => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(text: &str) -> Self {
        AttrValue::Text(text.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(text: String) -> Self {
        AttrValue::Text(text)
    }
}

impl From<f64> for AttrValue {
    fn from(number: f64) -> Self {
        AttrValue::Numbers(vec![number])
    }
}

pub type Attributes = BTreeMap<String, AttrValue>;

/// Name of the attribute holding a variable's fill value
pub const FILL_VALUE: &str = "_FillValue";

/// Description of a variable in a source
///
#[derive(Clone, Debug, PartialEq)]
pub struct VariableInfo {
    pub name: String,
    pub dimensions: Vec<String>,
    pub dtype: DataType,
    pub attributes: Attributes,
}

impl VariableInfo {
    pub fn new<S: Into<String>>(name: S, dimensions: &[&str], dtype: DataType) -> Self {
        Self {
            name: name.into(),
            dimensions: dimensions.iter().map(|d| d.to_string()).collect(),
            dtype,
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute<S, V>(mut self, name: S, value: V) -> Self
    where
        S: Into<String>,
        V: Into<AttrValue>,
    {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn ndim(&self) -> usize {
        self.dimensions.len()
    }

    pub fn text(&self, attribute: &str) -> Option<&str> {
        self.attributes.get(attribute).and_then(AttrValue::as_str)
    }

    pub fn fill_value(&self) -> Option<f64> {
        self.attributes.get(FILL_VALUE).and_then(AttrValue::as_f64)
    }

    /// Time units described by this variable's `units` and `calendar` attributes
    ///
    pub fn time_units(&self) -> Result<TimeUnits> {
        let units = self
            .text("units")
            .ok_or_else(|| Error::BadTimeUnits(format!("{} has no units", self.name)))?;

        TimeUnits::with_calendar(units, self.text("calendar"))
    }
}

/// An open connection to one remote or local gridded dataset.
///
/// Dropping a `Source` closes it.
///
#[async_trait]
pub trait Source: Send + Sync {
    /// Where this source was opened from
    ///
    fn location(&self) -> &str;

    /// Length of the named dimension, if the source has it
    ///
    fn dimension_len(&self, name: &str) -> Option<usize>;

    /// Description of the named variable, if the source has it
    ///
    fn variable(&self, name: &str) -> Option<&VariableInfo>;

    /// Read a rectangular slice of a variable, one index range per dimension.
    ///
    /// Failures that might go away if the read is repeated should be reported as
    /// `Error::Transport`.
    ///
    async fn read(&self, name: &str, ranges: &[Range<usize>]) -> Result<ArrayD<f64>>;

    /// Same as `variable`, but a missing variable is an error
    ///
    fn variable_info(&self, name: &str) -> Result<&VariableInfo> {
        self.variable(name)
            .ok_or_else(|| Error::BadName(name.to_string()))
    }

    /// Full shape of the named variable
    ///
    fn shape_of(&self, name: &str) -> Result<Vec<usize>> {
        self.variable_info(name)?
            .dimensions
            .iter()
            .map(|dim| {
                self.dimension_len(dim)
                    .ok_or_else(|| Error::BadDimension(dim.clone()))
            })
            .collect()
    }

    /// Read the whole of a variable
    ///
    async fn read_all(&self, name: &str) -> Result<ArrayD<f64>> {
        let ranges: Vec<Range<usize>> = self.shape_of(name)?.into_iter().map(|n| 0..n).collect();
        self.read(name, &ranges).await
    }

    /// Read a time variable and convert it to timestamps using its units
    ///
    async fn read_times(&self, name: &str) -> Result<Vec<Timestamp>> {
        let units = self.variable_info(name)?.time_units()?;
        let values = self.read_all(name).await?;

        units.decode_all(values.iter().copied())
    }
}

/// Opens sources by location (a URL or a path).
///
#[async_trait]
pub trait Opener: Send + Sync {
    /// Open the source at `location`.
    ///
    /// Locations this opener does not understand should produce `Error::UnrecognizedSource`.
    ///
    async fn open(&self, location: &str) -> Result<Box<dyn Source>>;
}
