use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which of the two writing prompts a piece of text belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritingTask {
    Task1,
    Task2,
}

/// Locally persisted writing progress, independent of the remote session.
///
/// Survives reloads; cleared only on a confirmed successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WritingDraft {
    pub task1: String,
    pub task2: String,
    pub word_count1: u32,
    pub word_count2: u32,
    pub last_saved: DateTime<Utc>,
}

impl WritingDraft {
    #[must_use]
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            task1: String::new(),
            task2: String::new(),
            word_count1: 0,
            word_count2: 0,
            last_saved: now,
        }
    }

    #[must_use]
    pub fn from_texts(
        task1: impl Into<String>,
        task2: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let task1 = task1.into();
        let task2 = task2.into();
        let word_count1 = word_count(&task1);
        let word_count2 = word_count(&task2);
        Self {
            task1,
            task2,
            word_count1,
            word_count2,
            last_saved: now,
        }
    }

    /// Replace one task's text, recounting words and stamping the save time.
    pub fn set_task(&mut self, task: WritingTask, text: impl Into<String>, now: DateTime<Utc>) {
        let text = text.into();
        let count = word_count(&text);
        match task {
            WritingTask::Task1 => {
                self.task1 = text;
                self.word_count1 = count;
            }
            WritingTask::Task2 => {
                self.task2 = text;
                self.word_count2 = count;
            }
        }
        self.last_saved = now;
    }

    #[must_use]
    pub fn text(&self, task: WritingTask) -> &str {
        match task {
            WritingTask::Task1 => &self.task1,
            WritingTask::Task2 => &self.task2,
        }
    }

    #[must_use]
    pub fn word_count(&self, task: WritingTask) -> u32 {
        match task {
            WritingTask::Task1 => self.word_count1,
            WritingTask::Task2 => self.word_count2,
        }
    }
}

/// Whitespace-separated token count, matching what the exam page displays.
#[must_use]
pub fn word_count(text: &str) -> u32 {
    u32::try_from(text.split_whitespace().count()).unwrap_or(u32::MAX)
}
