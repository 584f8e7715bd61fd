use super::Phase;

/// Character cap the client enforces on free-text answers. The backend does
/// not enforce one, so truncation here is a behavioral contract.
pub const FREE_TEXT_MAX_LEN: usize = 30;

/// Declared cap for the reading section's letter-group questions, matching
/// the longest option list shown for them.
pub const READING_MULTI_MAX: usize = 5;

/// How a multi-select answer is written into the flat wire map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiSelectWire {
    /// Each selected letter occupies its own numbered slot, in insertion
    /// order (first pick fills the question's own number, second the next).
    Positional,
    /// All selected letters are comma-joined into the question's single slot.
    CommaJoined,
}

/// Shape of a single question's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionKind {
    /// Free text, optionally clamped to a maximum character count.
    Text { max_len: Option<usize> },
    /// A single letter or short enum value.
    SingleChoice,
    /// A bounded, ordered set of letters.
    MultiSelect { max: usize, wire: MultiSelectWire },
}

impl QuestionKind {
    /// Number of wire slots this question occupies.
    #[must_use]
    pub fn slot_span(&self) -> u16 {
        match self {
            QuestionKind::MultiSelect {
                max,
                wire: MultiSelectWire::Positional,
            } => u16::try_from(*max).unwrap_or(u16::MAX),
            _ => 1,
        }
    }
}

/// One question in a phase: stable key, first wire slot number, answer shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionSpec {
    key: String,
    number: u16,
    kind: QuestionKind,
}

impl QuestionSpec {
    #[must_use]
    pub fn new(key: impl Into<String>, number: u16, kind: QuestionKind) -> Self {
        Self {
            key: key.into(),
            number,
            kind,
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// First wire slot this question writes to.
    #[must_use]
    pub fn number(&self) -> u16 {
        self.number
    }

    #[must_use]
    pub fn kind(&self) -> &QuestionKind {
        &self.kind
    }
}

/// The fixed question layout of a timed phase.
///
/// Writing has no numbered questions and therefore no schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseSchema {
    phase: Phase,
    questions: Vec<QuestionSpec>,
}

impl PhaseSchema {
    /// Schema for the given phase, or `None` for the unnumbered writing phase.
    #[must_use]
    pub fn for_phase(phase: Phase) -> Option<Self> {
        match phase {
            Phase::Listening => Some(Self::listening()),
            Phase::Reading => Some(Self::reading()),
            Phase::Writing => None,
        }
    }

    /// Listening: four parts, 40 wire slots.
    ///
    /// Questions 22 and 24 are "select TWO letters" groups; each spans two
    /// wire slots (22/23 and 24/25 respectively).
    #[must_use]
    pub fn listening() -> Self {
        let mut questions = Vec::with_capacity(38);
        for n in 1..=10u16 {
            questions.push(text(n, Some(FREE_TEXT_MAX_LEN)));
        }
        for n in 11..=21u16 {
            questions.push(single(n));
        }
        questions.push(multi(22, 2, MultiSelectWire::Positional));
        questions.push(multi(24, 2, MultiSelectWire::Positional));
        for n in 26..=30u16 {
            questions.push(single(n));
        }
        for n in 31..=40u16 {
            questions.push(text(n, Some(FREE_TEXT_MAX_LEN)));
        }
        Self {
            phase: Phase::Listening,
            questions,
        }
    }

    /// Reading: three passages, 40 wire slots.
    ///
    /// Questions 23-26 are letter groups whose selections are comma-joined
    /// into their own slot on the wire.
    #[must_use]
    pub fn reading() -> Self {
        let mut questions = Vec::with_capacity(40);
        for n in 1..=22u16 {
            questions.push(text(n, None));
        }
        for n in 23..=26u16 {
            questions.push(multi(n, READING_MULTI_MAX, MultiSelectWire::CommaJoined));
        }
        for n in 27..=40u16 {
            questions.push(text(n, None));
        }
        Self {
            phase: Phase::Reading,
            questions,
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn questions(&self) -> &[QuestionSpec] {
        &self.questions
    }

    #[must_use]
    pub fn question(&self, key: &str) -> Option<&QuestionSpec> {
        self.questions.iter().find(|spec| spec.key() == key)
    }

    /// Total number of wire slots across all questions.
    #[must_use]
    pub fn slot_count(&self) -> u16 {
        self.questions
            .iter()
            .map(|spec| spec.kind().slot_span())
            .sum()
    }
}

fn text(number: u16, max_len: Option<usize>) -> QuestionSpec {
    QuestionSpec::new(format!("q{number}"), number, QuestionKind::Text { max_len })
}

fn single(number: u16) -> QuestionSpec {
    QuestionSpec::new(format!("q{number}"), number, QuestionKind::SingleChoice)
}

fn multi(number: u16, max: usize, wire: MultiSelectWire) -> QuestionSpec {
    QuestionSpec::new(
        format!("q{number}"),
        number,
        QuestionKind::MultiSelect { max, wire },
    )
}
