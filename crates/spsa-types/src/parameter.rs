//! Parameter catalog and the vectors that live in it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::sync::Arc;

use crate::errors::ConfigError;

/// Whether a parameter is realized as an integer or a float.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    Integer,
    Continuous,
}

/// A single tunable parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Parameter name (e.g. "lmr_base").
    pub name: String,
    pub initial: f64,
    pub min: f64,
    pub max: f64,
    /// Perturbation unit. Zero freezes the parameter.
    pub step: f64,
    pub kind: ParameterKind,
    /// Excludes the parameter from perturbation and updates regardless of `step`.
    #[serde(default)]
    pub frozen: bool,
}

impl ParameterSpec {
    pub fn integer(name: impl Into<String>, initial: f64, min: f64, max: f64, step: f64) -> Self {
        Self {
            name: name.into(),
            initial,
            min,
            max,
            step,
            kind: ParameterKind::Integer,
            frozen: false,
        }
    }

    pub fn continuous(name: impl Into<String>, initial: f64, min: f64, max: f64, step: f64) -> Self {
        Self {
            name: name.into(),
            initial,
            min,
            max,
            step,
            kind: ParameterKind::Continuous,
            frozen: false,
        }
    }

    pub fn freeze(mut self) -> Self {
        self.frozen = true;
        self
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen || self.step == 0.0
    }

    /// Step used by perturbation and (de)normalization; zero when frozen.
    pub fn effective_step(&self) -> f64 {
        if self.is_frozen() {
            0.0
        } else {
            self.step
        }
    }

    /// Bounds a projected value must respect. Integer parameters are
    /// restricted to the integers inside `[min, max]`.
    pub fn projection_bounds(&self) -> (f64, f64) {
        match self.kind {
            ParameterKind::Integer => (self.min.ceil(), self.max.floor()),
            ParameterKind::Continuous => (self.min, self.max),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidParameter {
                name: self.name.clone(),
                message: "name must not be empty".to_string(),
            });
        }
        for (field, value) in [
            ("initial", self.initial),
            ("min", self.min),
            ("max", self.max),
            ("step", self.step),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::InvalidParameter {
                    name: self.name.clone(),
                    message: format!("{field} must be finite, got {value}"),
                });
            }
        }
        if self.min > self.max {
            return Err(ConfigError::InvalidBounds {
                name: self.name.clone(),
                min: self.min,
                max: self.max,
            });
        }
        if self.step < 0.0 {
            return Err(ConfigError::NegativeStep {
                name: self.name.clone(),
                step: self.step,
            });
        }
        let (lo, hi) = self.projection_bounds();
        if lo > hi {
            return Err(ConfigError::InvalidParameter {
                name: self.name.clone(),
                message: format!("no integer lies within [{}, {}]", self.min, self.max),
            });
        }
        if self.initial < self.min || self.initial > self.max {
            return Err(ConfigError::InitialOutOfBounds {
                name: self.name.clone(),
                initial: self.initial,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

/// The full parameter catalog: an ordered list of uniquely named specs.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpace {
    parameters: Vec<ParameterSpec>,
    index: HashMap<String, usize>,
}

impl ParameterSpace {
    pub fn new(parameters: Vec<ParameterSpec>) -> Result<Self, ConfigError> {
        if parameters.is_empty() {
            return Err(ConfigError::EmptySpace);
        }

        let mut index = HashMap::with_capacity(parameters.len());
        for (i, spec) in parameters.iter().enumerate() {
            spec.validate()?;
            if index.insert(spec.name.clone(), i).is_some() {
                return Err(ConfigError::DuplicateParameter {
                    name: spec.name.clone(),
                });
            }
        }

        Ok(Self { parameters, index })
    }

    /// Convenience for building a space that is immediately shared.
    pub fn shared(parameters: Vec<ParameterSpec>) -> Result<Arc<Self>, ConfigError> {
        Self::new(parameters).map(Arc::new)
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn specs(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.parameters.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| p.name.as_str())
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
        self.index_of(name).map(|i| &self.parameters[i])
    }

    /// Number of parameters that take part in perturbation.
    pub fn active_count(&self) -> usize {
        self.parameters.iter().filter(|p| !p.is_frozen()).count()
    }

    /// The starting point declared by the catalog.
    pub fn initial_vector(self: &Arc<Self>) -> ParameterVector {
        let values = self.parameters.iter().map(|p| p.initial).collect();
        ParameterVector {
            space: Arc::clone(self),
            values,
        }
    }

    /// The initial point with some entries replaced. Unknown names are rejected;
    /// overrides are not required to lie within bounds.
    pub fn initial_with_overrides(
        self: &Arc<Self>,
        overrides: &BTreeMap<String, f64>,
    ) -> Result<ParameterVector, ConfigError> {
        let mut vector = self.initial_vector();
        for (name, value) in overrides {
            let idx = self
                .index_of(name)
                .ok_or_else(|| ConfigError::UnknownParameter { name: name.clone() })?;
            if !value.is_finite() {
                return Err(ConfigError::InvalidParameter {
                    name: name.clone(),
                    message: format!("override must be finite, got {value}"),
                });
            }
            vector.values[idx] = *value;
        }
        Ok(vector)
    }

    /// Builds a vector from a complete name → value mapping.
    pub fn vector_from_map(
        self: &Arc<Self>,
        map: &HashMap<String, f64>,
    ) -> Result<ParameterVector, ConfigError> {
        if let Some(unknown) = map.keys().find(|k| !self.index.contains_key(k.as_str())) {
            return Err(ConfigError::UnknownParameter {
                name: unknown.clone(),
            });
        }
        let values = self
            .parameters
            .iter()
            .map(|p| {
                map.get(&p.name)
                    .copied()
                    .ok_or_else(|| ConfigError::MissingParameter {
                        name: p.name.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ParameterVector {
            space: Arc::clone(self),
            values,
        })
    }
}

/// A point in a [`ParameterSpace`]. Values are stored in catalog order, so
/// the key set always equals the space's key set.
#[derive(Debug, Clone)]
pub struct ParameterVector {
    space: Arc<ParameterSpace>,
    values: Vec<f64>,
}

impl PartialEq for ParameterVector {
    fn eq(&self, other: &Self) -> bool {
        self.same_space(other) && self.values == other.values
    }
}

impl ParameterVector {
    pub fn zeros(space: &Arc<ParameterSpace>) -> Self {
        Self {
            space: Arc::clone(space),
            values: vec![0.0; space.len()],
        }
    }

    pub fn from_values(space: &Arc<ParameterSpace>, values: Vec<f64>) -> Result<Self, ConfigError> {
        if values.len() != space.len() {
            return Err(ConfigError::LengthMismatch {
                expected: space.len(),
                actual: values.len(),
            });
        }
        Ok(Self {
            space: Arc::clone(space),
            values,
        })
    }

    pub fn space(&self) -> &Arc<ParameterSpace> {
        &self.space
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn value(&self, index: usize) -> f64 {
        self.values[index]
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.space.index_of(name).map(|i| self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.space.names().zip(self.values.iter().copied())
    }

    pub fn to_map(&self) -> BTreeMap<String, f64> {
        self.iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// Applies `f(spec, value)` to every entry.
    pub fn map_with_spec(&self, mut f: impl FnMut(&ParameterSpec, f64) -> f64) -> Self {
        let values = self
            .space
            .iter()
            .zip(&self.values)
            .map(|(spec, v)| f(spec, *v))
            .collect();
        Self {
            space: Arc::clone(&self.space),
            values,
        }
    }

    /// Divides every entry by its parameter's step. A zero (or frozen) step
    /// divides by one.
    pub fn normalize(&self) -> Self {
        self.map_with_spec(|spec, v| {
            let step = spec.effective_step();
            if step == 0.0 {
                v
            } else {
                v / step
            }
        })
    }

    /// Multiplies every entry by its parameter's step.
    pub fn denormalize(&self) -> Self {
        self.map_with_spec(|spec, v| v * spec.effective_step())
    }

    /// Reciprocal of every entry; zero entries become one.
    pub fn invert(&self) -> Self {
        self.map_with_spec(|_, v| if v == 0.0 { 1.0 } else { 1.0 / v })
    }

    fn same_space(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.space, &other.space) || *self.space == *other.space
    }

    fn zip_with(&self, other: &Self, f: impl Fn(f64, f64) -> f64) -> Self {
        assert!(
            self.same_space(other),
            "parameter vectors from different spaces cannot be combined"
        );
        let values = self
            .values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| f(*a, *b))
            .collect();
        Self {
            space: Arc::clone(&self.space),
            values,
        }
    }
}

impl fmt::Display for ParameterVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{name}: {value}")?;
        }
        Ok(())
    }
}

impl Neg for &ParameterVector {
    type Output = ParameterVector;

    fn neg(self) -> ParameterVector {
        self.map_with_spec(|_, v| -v)
    }
}

impl Neg for ParameterVector {
    type Output = ParameterVector;

    fn neg(self) -> ParameterVector {
        -&self
    }
}

impl Add<&ParameterVector> for &ParameterVector {
    type Output = ParameterVector;

    fn add(self, rhs: &ParameterVector) -> ParameterVector {
        self.zip_with(rhs, |a, b| a + b)
    }
}

impl Add for ParameterVector {
    type Output = ParameterVector;

    fn add(self, rhs: ParameterVector) -> ParameterVector {
        &self + &rhs
    }
}

impl Sub<&ParameterVector> for &ParameterVector {
    type Output = ParameterVector;

    fn sub(self, rhs: &ParameterVector) -> ParameterVector {
        self + &(-rhs)
    }
}

impl Sub for ParameterVector {
    type Output = ParameterVector;

    fn sub(self, rhs: ParameterVector) -> ParameterVector {
        &self - &rhs
    }
}

impl Mul<f64> for &ParameterVector {
    type Output = ParameterVector;

    fn mul(self, rhs: f64) -> ParameterVector {
        self.map_with_spec(|_, v| v * rhs)
    }
}

impl Mul<f64> for ParameterVector {
    type Output = ParameterVector;

    fn mul(self, rhs: f64) -> ParameterVector {
        &self * rhs
    }
}

impl Mul<&ParameterVector> for f64 {
    type Output = ParameterVector;

    fn mul(self, rhs: &ParameterVector) -> ParameterVector {
        rhs * self
    }
}

impl Mul<ParameterVector> for f64 {
    type Output = ParameterVector;

    fn mul(self, rhs: ParameterVector) -> ParameterVector {
        &rhs * self
    }
}

/// Element-wise division.
impl Div<&ParameterVector> for &ParameterVector {
    type Output = ParameterVector;

    fn div(self, rhs: &ParameterVector) -> ParameterVector {
        self.zip_with(rhs, |a, b| a / b)
    }
}
