use std::collections::BTreeMap;

use thiserror::Error;

use super::question::{MultiSelectWire, PhaseSchema, QuestionKind};

/// Errors emitted by `AnswerSheet` mutations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnswerError {
    #[error("unknown question key: {key}")]
    UnknownQuestion { key: String },

    #[error("question {key} does not take a {given} answer")]
    KindMismatch { key: String, given: &'static str },
}

/// A recorded answer: scalar text/letter, or an ordered letter selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerValue {
    Scalar(String),
    Selection(Vec<String>),
}

impl AnswerValue {
    fn empty_for(kind: &QuestionKind) -> Self {
        match kind {
            QuestionKind::Text { .. } | QuestionKind::SingleChoice => {
                AnswerValue::Scalar(String::new())
            }
            QuestionKind::MultiSelect { .. } => AnswerValue::Selection(Vec::new()),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            AnswerValue::Scalar(text) => text.is_empty(),
            AnswerValue::Selection(picks) => picks.is_empty(),
        }
    }
}

/// In-memory answer record for one timed phase.
///
/// Every question key declared by the phase schema is present from
/// construction onward; an empty string or empty selection means
/// unanswered, never an absent key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerSheet {
    schema: PhaseSchema,
    values: BTreeMap<String, AnswerValue>,
}

impl AnswerSheet {
    #[must_use]
    pub fn new(schema: PhaseSchema) -> Self {
        let values = schema
            .questions()
            .iter()
            .map(|spec| (spec.key().to_string(), AnswerValue::empty_for(spec.kind())))
            .collect();
        Self { schema, values }
    }

    #[must_use]
    pub fn schema(&self) -> &PhaseSchema {
        &self.schema
    }

    #[must_use]
    pub fn value(&self, key: &str) -> Option<&AnswerValue> {
        self.values.get(key)
    }

    /// Number of questions with a non-empty answer.
    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.values.values().filter(|v| !v.is_empty()).count()
    }

    /// Replace a scalar answer. Free-text values are clamped to the
    /// question's character cap by truncation rather than rejected.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError` for unknown keys or multi-select questions.
    pub fn set_scalar(&mut self, key: &str, value: &str) -> Result<(), AnswerError> {
        let spec = self
            .schema
            .question(key)
            .ok_or_else(|| AnswerError::UnknownQuestion {
                key: key.to_string(),
            })?;
        let stored = match spec.kind() {
            QuestionKind::Text { max_len: Some(max) } => value.chars().take(*max).collect(),
            QuestionKind::Text { max_len: None } | QuestionKind::SingleChoice => value.to_string(),
            QuestionKind::MultiSelect { .. } => {
                return Err(AnswerError::KindMismatch {
                    key: key.to_string(),
                    given: "scalar",
                });
            }
        };
        self.values
            .insert(key.to_string(), AnswerValue::Scalar(stored));
        Ok(())
    }

    /// Toggle one option of a multi-select question. Removing is always
    /// permitted; adding past the declared maximum is a no-op, not an error.
    /// Insertion order is preserved and determines flatten slot assignment.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError` for unknown keys or non-multi-select questions.
    pub fn toggle_selection(&mut self, key: &str, option: &str) -> Result<(), AnswerError> {
        let spec = self
            .schema
            .question(key)
            .ok_or_else(|| AnswerError::UnknownQuestion {
                key: key.to_string(),
            })?;
        let QuestionKind::MultiSelect { max, .. } = spec.kind() else {
            return Err(AnswerError::KindMismatch {
                key: key.to_string(),
                given: "selection",
            });
        };
        let max = *max;
        match self.values.get_mut(key) {
            Some(AnswerValue::Selection(picks)) => {
                if let Some(pos) = picks.iter().position(|pick| pick == option) {
                    picks.remove(pos);
                } else if picks.len() < max {
                    picks.push(option.to_string());
                }
                Ok(())
            }
            _ => Err(AnswerError::KindMismatch {
                key: key.to_string(),
                given: "selection",
            }),
        }
    }

    /// Reset every answer to its empty default in one update.
    pub fn clear_all(&mut self) {
        for spec in self.schema.questions() {
            self.values
                .insert(spec.key().to_string(), AnswerValue::empty_for(spec.kind()));
        }
    }

    /// Produce the flat slot-number → value map the backend expects.
    ///
    /// Pure and safe to call repeatedly. Positional multi-selects fill
    /// their slot span in insertion order, padding with empty strings;
    /// comma-joined multi-selects collapse into their single slot. Missing
    /// values become empty strings.
    #[must_use]
    pub fn flatten(&self) -> BTreeMap<String, String> {
        let mut flat = BTreeMap::new();
        for spec in self.schema.questions() {
            let value = self.values.get(spec.key());
            match spec.kind() {
                QuestionKind::Text { .. } | QuestionKind::SingleChoice => {
                    let text = match value {
                        Some(AnswerValue::Scalar(text)) => text.clone(),
                        _ => String::new(),
                    };
                    flat.insert(spec.number().to_string(), text);
                }
                QuestionKind::MultiSelect { max, wire } => {
                    let picks: &[String] = match value {
                        Some(AnswerValue::Selection(picks)) => picks,
                        _ => &[],
                    };
                    match wire {
                        MultiSelectWire::Positional => {
                            for offset in 0..*max {
                                let slot = spec.number() + u16::try_from(offset).unwrap_or(0);
                                flat.insert(
                                    slot.to_string(),
                                    picks.get(offset).cloned().unwrap_or_default(),
                                );
                            }
                        }
                        MultiSelectWire::CommaJoined => {
                            flat.insert(spec.number().to_string(), picks.join(","));
                        }
                    }
                }
            }
        }
        flat
    }
}
