//! Reference session files
//!
//! ```text
//! Arms on Tuesday
//! resistanceTargeted:arms
//! resistanceTargeted:arms/dumbbell-biceps-curl,W=12.5,R=10,I=0.6
//! resistanceTargeted:arms/cable-triceps-pushdown,R=12,W=20
//! ```

use std::fmt::Write as _;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::catalog::ExerciseCatalog;
use crate::exercises::{ExerciseDetail, ExerciseIdentity, ExerciseLabel, ExerciseType, IdentityError};

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("cannot read reference session: {0}")]
    Io(#[from] std::io::Error),
    #[error("reference session is empty")]
    Empty,
    #[error("reference session has no exercise type line")]
    MissingType,
    #[error("line {line}: {source}")]
    Identity {
        line: usize,
        #[source]
        source: IdentityError,
    },
}

/// A recorded session replayed by the evaluator
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSession {
    pub description: String,
    pub exercise_type: ExerciseType,
    pub rows: Vec<(ExerciseDetail, Vec<ExerciseLabel>)>,
}

fn parse_label(token: &str) -> Option<ExerciseLabel> {
    let (key, value) = token.split_once('=')?;
    let value = value.trim();
    match key.trim() {
        "W" => value.parse().ok().map(ExerciseLabel::Weight),
        "R" => value.parse().ok().map(ExerciseLabel::Repetitions),
        "I" => value.parse().ok().map(ExerciseLabel::Intensity),
        _ => None,
    }
}

fn label_token(label: &ExerciseLabel) -> String {
    match label {
        ExerciseLabel::Weight(w) => format!("W={w}"),
        ExerciseLabel::Repetitions(r) => format!("R={r}"),
        ExerciseLabel::Intensity(i) => format!("I={i}"),
    }
}

impl ReferenceSession {
    pub fn load(path: &Path, catalog: &dyn ExerciseCatalog) -> Result<Self, LoaderError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, catalog)
    }

    /// Parses the text format; details come from the catalog, permissive when unknown
    pub fn parse(content: &str, catalog: &dyn ExerciseCatalog) -> Result<Self, LoaderError> {
        let mut lines = content.lines().enumerate();
        let description = lines
            .next()
            .map(|(_, l)| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .ok_or(LoaderError::Empty)?;
        let (type_index, type_line) = lines.next().ok_or(LoaderError::MissingType)?;
        let exercise_type: ExerciseType = type_line
            .trim()
            .parse()
            .map_err(|source| LoaderError::Identity { line: type_index + 1, source })?;

        let mut rows = Vec::new();
        for (index, line) in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut tokens = line.split(',');
            let id = tokens.next().unwrap_or_default().trim();
            let identity = ExerciseIdentity::parse(id)
                .map_err(|source| LoaderError::Identity { line: index + 1, source })?;
            let labels: Vec<ExerciseLabel> = tokens
                .filter_map(|token| {
                    let label = parse_label(token);
                    if label.is_none() {
                        debug!("Line {}: ignoring token `{}`", index + 1, token);
                    }
                    label
                })
                .collect();
            rows.push((catalog.detail_or_permissive(&identity), labels));
        }

        Ok(Self { description, exercise_type, rows })
    }

    /// Renders the text format back
    pub fn to_text(&self) -> String {
        let mut text = format!("{}\n{}\n", self.description, self.exercise_type);
        for (detail, labels) in &self.rows {
            let tokens: Vec<String> = labels.iter().map(label_token).collect();
            let _ = writeln!(text, "{},{}", detail.identity, tokens.join(","));
        }
        text
    }
}
