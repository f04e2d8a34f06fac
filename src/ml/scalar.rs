//! Scalar prediction using polynomial regression (linfa)
//!
//! One predictor holds the observation log of a single scalar kind (weight,
//! repetitions, intensity or duration) for every exercise identity. The log
//! is append-only; positions may repeat across sessions, in which case the
//! most recent observation at a position is the one that gets fitted.

use std::collections::{BTreeMap, HashMap};

use linfa::prelude::*;
use linfa_linear::LinearRegression;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::rounding::ScalarKind;
use crate::exercises::ExerciseIdentity;

/// Highest polynomial degree ever fitted
const MAX_DEGREE: usize = 2;

/// Serialization format version
const BLOB_VERSION: u32 = 1;

/// A single observed value at a position (set number within a session)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub position: u32,
    pub value: f64,
}

/// Fitted model: `intercept + c1*x + c2*x^2`
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    intercept: f64,
    coefficients: Vec<f64>,
}

impl Polynomial {
    fn constant(value: f64) -> Self {
        Self { intercept: value, coefficients: Vec::new() }
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len()
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        self.coefficients
            .iter()
            .enumerate()
            .fold(self.intercept, |acc, (i, c)| acc + c * x.powi(i as i32 + 1))
    }
}

/// Latest value per position, in position order
fn effective_points(observations: &[Observation]) -> BTreeMap<u32, f64> {
    observations
        .iter()
        .map(|o| (o.position, o.value))
        .collect()
}

/// Least-squares fit of degree `min(2, points - 1)`; fewer than two points
/// degenerate to the most recent value
fn fit(observations: &[Observation]) -> Polynomial {
    let last = observations.last().map(|o| o.value).unwrap_or(0.0);
    let points = effective_points(observations);
    if points.len() < 2 {
        return Polynomial::constant(last);
    }

    let degree = (points.len() - 1).min(MAX_DEGREE);
    let n_samples = points.len();

    // X = [x, x^2, ...] per position, Y = observed value
    let features: Vec<f64> = points
        .keys()
        .flat_map(|x| (1..=degree).map(move |d| f64::from(*x).powi(d as i32)))
        .collect();
    let records = match Array2::from_shape_vec((n_samples, degree), features) {
        Ok(records) => records,
        Err(e) => {
            warn!("Cannot shape regression records: {}", e);
            return Polynomial::constant(last);
        }
    };
    let targets = Array1::from_iter(points.values().copied());
    let dataset = Dataset::new(records, targets);

    match LinearRegression::default().fit(&dataset) {
        Ok(model) => Polynomial {
            intercept: model.intercept(),
            coefficients: model.params().to_vec(),
        },
        Err(e) => {
            debug!("Regression failed ({}), falling back to last value", e);
            Polynomial::constant(last)
        }
    }
}

/// Persisted form of a [`ScalarPredictor`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ScalarBlob {
    version: u32,
    kind: ScalarKind,
    #[serde(default)]
    series: BTreeMap<ExerciseIdentity, Vec<Observation>>,
}

/// Per-identity regressor for one scalar kind
#[derive(Debug, Clone)]
pub struct ScalarPredictor {
    kind: ScalarKind,
    max_history: usize,
    series: HashMap<ExerciseIdentity, Vec<Observation>>,
    fitted: HashMap<ExerciseIdentity, Polynomial>,
}

impl ScalarPredictor {
    pub fn new(kind: ScalarKind, max_history: usize) -> Self {
        Self {
            kind,
            max_history: max_history.max(1),
            series: HashMap::new(),
            fitted: HashMap::new(),
        }
    }

    pub fn kind(&self) -> ScalarKind {
        self.kind
    }

    /// Number of recorded observations for the identity
    pub fn history_len(&self, identity: &ExerciseIdentity) -> usize {
        self.series.get(identity).map_or(0, Vec::len)
    }

    pub fn history(&self, identity: &ExerciseIdentity) -> &[Observation] {
        self.series.get(identity).map_or(&[], Vec::as_slice)
    }

    pub fn identities(&self) -> impl Iterator<Item = &ExerciseIdentity> {
        self.series.keys()
    }

    /// Replaces the identity's history with `values` at positions 0..n
    pub fn train(&mut self, identity: &ExerciseIdentity, values: &[f64]) {
        let observations = values
            .iter()
            .enumerate()
            .map(|(i, v)| Observation { position: i as u32, value: *v })
            .collect();
        self.series.insert(identity.clone(), observations);
        self.refit(identity);
    }

    /// Appends values at explicit positions, leaving gaps for skipped sets
    pub fn train_positional(&mut self, identity: &ExerciseIdentity, values: &[(u32, f64)]) {
        let series = self.series.entry(identity.clone()).or_default();
        series.extend(values.iter().map(|(position, value)| Observation {
            position: *position,
            value: *value,
        }));
        self.refit(identity);
    }

    /// Appends a single confirmed value
    pub fn observe(&mut self, identity: &ExerciseIdentity, position: u32, value: f64) {
        self.train_positional(identity, &[(position, value)]);
    }

    fn refit(&mut self, identity: &ExerciseIdentity) {
        let Some(series) = self.series.get_mut(identity) else {
            return;
        };
        if series.len() > self.max_history {
            let excess = series.len() - self.max_history;
            series.drain(..excess);
        }
        let polynomial = fit(series);
        debug!(
            "Refitted {:?} for {} (degree {}, {} observations)",
            self.kind,
            identity,
            polynomial.degree(),
            series.len()
        );
        self.fitted.insert(identity.clone(), polynomial);
    }

    /// Raw (unrounded, clamped to >= 0) estimate at `position`; 0 for unknown identities
    pub fn predict(&self, identity: &ExerciseIdentity, position: u32) -> f64 {
        self.fitted
            .get(identity)
            .map(|p| p.evaluate(f64::from(position)))
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
            .max(0.0)
    }

    pub fn polynomial(&self, identity: &ExerciseIdentity) -> Option<&Polynomial> {
        self.fitted.get(identity)
    }

    /// Unions `other` into this predictor; `other` wins on conflicting positions
    pub fn merge(&mut self, other: &ScalarPredictor) {
        for (identity, theirs) in &other.series {
            let series = self.series.entry(identity.clone()).or_default();
            series.retain(|o| !theirs.iter().any(|t| t.position == o.position));
            series.extend(theirs.iter().copied());
            self.refit(identity);
        }
    }

    /// Merges a persisted blob; undecodable blobs are ignored
    pub fn merge_encoded(&mut self, data: &[u8]) {
        let other = Self::decode_or_default(self.kind, self.max_history, data);
        self.merge(&other);
    }

    pub(crate) fn to_blob(&self) -> ScalarBlob {
        ScalarBlob {
            version: BLOB_VERSION,
            kind: self.kind,
            series: self
                .series
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    pub(crate) fn from_blob(blob: ScalarBlob, max_history: usize) -> Self {
        if blob.version > BLOB_VERSION {
            debug!("Reading scalar blob version {} with reader {}", blob.version, BLOB_VERSION);
        }
        let mut predictor = Self::new(blob.kind, max_history);
        for (identity, observations) in blob.series {
            predictor.series.insert(identity.clone(), observations);
            predictor.refit(&identity);
        }
        predictor
    }

    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(&self.to_blob()).unwrap_or_default()
    }

    pub fn decode(data: &[u8], max_history: usize) -> anyhow::Result<Self> {
        let blob: ScalarBlob = serde_json::from_slice(data)?;
        Ok(Self::from_blob(blob, max_history))
    }

    /// Decodes `data`, or returns an empty predictor when it is corrupt or of another kind
    pub fn decode_or_default(kind: ScalarKind, max_history: usize, data: &[u8]) -> Self {
        match Self::decode(data, max_history) {
            Ok(predictor) if predictor.kind == kind => predictor,
            Ok(predictor) => {
                warn!("Scalar blob holds {:?}, expected {:?}; starting empty", predictor.kind, kind);
                Self::new(kind, max_history)
            }
            Err(e) => {
                warn!("Corrupt {:?} predictor blob ({}); starting empty", kind, e);
                Self::new(kind, max_history)
            }
        }
    }
}
