use std::{fs, path::Path};

use serde::Deserialize;

use crate::{
    coords::CoordNames,
    errors::{Error, Result},
    retry::RetryPolicy,
    time::DEFAULT_FORMAT,
};

/// What sort of model output is being retrieved, which decides the default variables
///
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    #[default]
    Ocean,
    Atmosphere,
}

impl DatasetKind {
    pub fn default_variables(self) -> &'static [&'static str] {
        match self {
            DatasetKind::Ocean => &["ssh", "u", "v", "temp", "salt"],
            DatasetKind::Atmosphere => &["uwind", "vwind", "tair", "pair", "rh", "cloud", "rain"],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DatasetKind::Ocean => "ocean",
            DatasetKind::Atmosphere => "atmosphere",
        }
    }

    /// Title given to output stores
    ///
    pub fn title(self) -> String {
        format!("{} model data", self.name())
    }
}

/// A variable to retrieve.
///
/// `name` is what the variable is called locally, `remote` what the source calls it (if
/// different). Coordinate roles are inferred from the source unless given.
///
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(from = "VariableSpecRepr")]
pub struct VariableSpec {
    pub name: String,
    pub remote: Option<String>,
    pub coords: Option<CoordNames>,
}

impl VariableSpec {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            remote: None,
            coords: None,
        }
    }

    pub fn with_remote<S: Into<String>>(mut self, remote: S) -> Self {
        self.remote = Some(remote.into());
        self
    }

    pub fn with_coords(mut self, coords: CoordNames) -> Self {
        self.coords = Some(coords);
        self
    }

    /// Name of the variable in the source
    ///
    pub fn remote_name(&self) -> &str {
        self.remote.as_deref().unwrap_or(&self.name)
    }
}

impl From<&str> for VariableSpec {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Variables can be given in JSON as just a name, or in full
///
#[derive(Deserialize)]
#[serde(untagged)]
enum VariableSpecRepr {
    Name(String),
    Full(FullVariableSpec),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FullVariableSpec {
    name: String,

    #[serde(default)]
    remote: Option<String>,

    #[serde(default)]
    coords: Option<CoordNames>,
}

impl From<VariableSpecRepr> for VariableSpec {
    fn from(repr: VariableSpecRepr) -> Self {
        match repr {
            VariableSpecRepr::Name(name) => Self::new(name),
            VariableSpecRepr::Full(spec) => Self {
                name: spec.name,
                remote: spec.remote,
                coords: spec.coords,
            },
        }
    }
}

fn default_prefer_bulk() -> bool {
    true
}

fn default_time_format() -> String {
    DEFAULT_FORMAT.to_string()
}

/// Everything a `Retrieval` needs to know
///
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Locations of the source files (URLs or paths)
    pub sources: Vec<String>,

    /// Whether `sources` are pieces of one dataset, split along time
    #[serde(default)]
    pub multifile: bool,

    #[serde(default)]
    pub kind: DatasetKind,

    /// Variables to retrieve, in order. Empty means the defaults for `kind`.
    #[serde(default)]
    pub variables: Vec<VariableSpec>,

    /// Separate source to read coordinates from
    #[serde(default)]
    pub grid_file: Option<String>,

    /// Try reading all records at once before falling back to one record at a time
    #[serde(default = "default_prefer_bulk")]
    pub prefer_bulk: bool,

    /// Format of time ranges given as strings
    #[serde(default = "default_time_format")]
    pub time_format: String,

    #[serde(default)]
    pub retry: RetryPolicy,

    /// Fail rather than guess when retrieved times can't be placed on a store's time axis
    #[serde(default)]
    pub strict_append: bool,
}

impl Config {
    pub fn new<S: Into<String>>(sources: Vec<S>) -> Self {
        Self {
            sources: sources.into_iter().map(Into::into).collect(),
            multifile: false,
            kind: DatasetKind::default(),
            variables: vec![],
            grid_file: None,
            prefer_bulk: default_prefer_bulk(),
            time_format: default_time_format(),
            retry: RetryPolicy::default(),
            strict_append: false,
        }
    }

    pub fn with_multifile(mut self, multifile: bool) -> Self {
        self.multifile = multifile;
        self
    }

    pub fn with_kind(mut self, kind: DatasetKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_variable<V: Into<VariableSpec>>(mut self, variable: V) -> Self {
        self.variables.push(variable.into());
        self
    }

    pub fn with_grid_file<S: Into<String>>(mut self, grid_file: S) -> Self {
        self.grid_file = Some(grid_file.into());
        self
    }

    pub fn with_prefer_bulk(mut self, prefer_bulk: bool) -> Self {
        self.prefer_bulk = prefer_bulk;
        self
    }

    pub fn with_time_format<S: Into<String>>(mut self, time_format: S) -> Self {
        self.time_format = time_format.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_strict_append(mut self, strict_append: bool) -> Self {
        self.strict_append = strict_append;
        self
    }

    /// Parse and validate a JSON configuration
    ///
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;

        Ok(config)
    }

    /// Read and validate a JSON configuration file
    ///
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        match self.sources.len() {
            0 => {
                return Err(Error::UnrecognizedSource("no sources given".into()));
            }
            1 => {}
            n if !self.multifile => {
                return Err(Error::UnrecognizedSource(format!(
                    "{n} sources given but multifile is not set"
                )));
            }
            _ => {}
        }
        if let Some(empty) = self.sources.iter().find(|source| source.trim().is_empty()) {
            return Err(Error::UnrecognizedSource(format!("{empty:?}")));
        }

        self.retry.validate()?;

        if self.time_format.is_empty() {
            return Err(Error::Config("time_format is empty".into()));
        }

        let mut seen = vec![];
        for variable in &self.variables {
            if variable.name.is_empty() || variable.remote_name().is_empty() {
                return Err(Error::Config("variable with an empty name".into()));
            }
            if seen.contains(&&variable.name) {
                return Err(Error::Config(format!("{} is listed twice", variable.name)));
            }
            seen.push(&variable.name);
        }

        Ok(())
    }

    /// Variables to retrieve, falling back to the defaults for the dataset kind
    ///
    pub fn variables(&self) -> Vec<VariableSpec> {
        if self.variables.is_empty() {
            self.kind
                .default_variables()
                .iter()
                .map(|&name| VariableSpec::new(name))
                .collect()
        } else {
            self.variables.clone()
        }
    }
}
