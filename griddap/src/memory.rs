//! Sources held entirely in RAM.
//!
//! Useful for data that has already been fetched by some other means, and for testing.
//!
use std::{
    collections::{BTreeMap, HashMap},
    ops::Range,
    sync::Arc,
};

use async_trait::async_trait;
use ndarray::{ArrayD, Axis, Slice};
use parking_lot::Mutex;

use crate::{
    errors::{Error, Result},
    source::{Opener, Source, VariableInfo},
};

pub struct MemorySource {
    location: String,
    dimensions: BTreeMap<String, usize>,
    variables: BTreeMap<String, (VariableInfo, ArrayD<f64>)>,
}

impl MemorySource {
    pub fn new<S: Into<String>>(location: S) -> Self {
        Self {
            location: location.into(),
            dimensions: BTreeMap::new(),
            variables: BTreeMap::new(),
        }
    }

    /// Add a variable with its data.
    ///
    /// Dimensions are defined by the first variable that uses them. Later variables must agree
    /// on their lengths.
    ///
    pub fn add_variable(&mut self, info: VariableInfo, data: ArrayD<f64>) -> Result<()> {
        if info.ndim() != data.ndim() {
            return Err(Error::ShapeMismatch {
                expected: vec![0; info.ndim()],
                name: info.name,
                got: data.shape().to_vec(),
            });
        }

        let expected: Vec<usize> = info
            .dimensions
            .iter()
            .zip(data.shape())
            .map(|(dim, &len)| *self.dimensions.get(dim).unwrap_or(&len))
            .collect();
        if expected != data.shape() {
            return Err(Error::ShapeMismatch {
                name: info.name,
                expected,
                got: data.shape().to_vec(),
            });
        }

        for (dim, &len) in info.dimensions.iter().zip(data.shape()) {
            self.dimensions.insert(dim.clone(), len);
        }
        self.variables.insert(info.name.clone(), (info, data));

        Ok(())
    }

    pub fn with_variable(mut self, info: VariableInfo, data: ArrayD<f64>) -> Result<Self> {
        self.add_variable(info, data)?;
        Ok(self)
    }
}

#[async_trait]
impl Source for MemorySource {
    fn location(&self) -> &str {
        &self.location
    }

    fn dimension_len(&self, name: &str) -> Option<usize> {
        self.dimensions.get(name).copied()
    }

    fn variable(&self, name: &str) -> Option<&VariableInfo> {
        self.variables.get(name).map(|(info, _)| info)
    }

    async fn read(&self, name: &str, ranges: &[Range<usize>]) -> Result<ArrayD<f64>> {
        let (_, data) = self
            .variables
            .get(name)
            .ok_or_else(|| Error::BadName(name.to_string()))?;

        let in_bounds = ranges.len() == data.ndim()
            && ranges
                .iter()
                .zip(data.shape())
                .all(|(range, &len)| range.start <= range.end && range.end <= len);
        if !in_bounds {
            return Err(Error::OutOfBounds {
                name: name.to_string(),
                ranges: ranges.to_vec(),
                shape: data.shape().to_vec(),
            });
        }

        let mut view = data.view();
        for (axis, range) in ranges.iter().enumerate() {
            view.slice_axis_inplace(Axis(axis), Slice::from(range.clone()));
        }

        Ok(view.to_owned())
    }
}

/// Sources are shared between everyone who opens them
///
#[async_trait]
impl Source for Arc<MemorySource> {
    fn location(&self) -> &str {
        (**self).location()
    }

    fn dimension_len(&self, name: &str) -> Option<usize> {
        (**self).dimension_len(name)
    }

    fn variable(&self, name: &str) -> Option<&VariableInfo> {
        (**self).variable(name)
    }

    async fn read(&self, name: &str, ranges: &[Range<usize>]) -> Result<ArrayD<f64>> {
        (**self).read(name, ranges).await
    }
}

/// Opens `MemorySource`s by location.
///
/// Keeps a log of every location opened, in order.
///
pub struct MemoryOpener {
    sources: HashMap<String, Arc<MemorySource>>,
    opened: Mutex<Vec<String>>,
}

impl MemoryOpener {
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
            opened: Mutex::new(vec![]),
        }
    }

    pub fn insert(&mut self, source: MemorySource) {
        self.sources
            .insert(source.location.clone(), Arc::new(source));
    }

    pub fn with_source(mut self, source: MemorySource) -> Self {
        self.insert(source);
        self
    }

    /// Locations opened so far, in the order they were opened
    ///
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

impl Default for MemoryOpener {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Opener for MemoryOpener {
    async fn open(&self, location: &str) -> Result<Box<dyn Source>> {
        let source = self
            .sources
            .get(location)
            .ok_or_else(|| Error::UnrecognizedSource(location.to_string()))?;
        self.opened.lock().push(location.to_string());

        Ok(Box::new(Arc::clone(source)))
    }
}
