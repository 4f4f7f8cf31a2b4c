//! Health questions asked on every consent form.
//!
//! Answers are stored as an opaque key/value map, so adding a question here
//! needs no storage migration.

const YES_NO: &[(&str, &str)] = &[("no", "No"), ("yes", "Yes")];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuestionKind {
    /// One of a fixed set of `(value, label)` pairs.
    Choice(&'static [(&'static str, &'static str)]),
    Text,
}

#[derive(Debug, Clone, Copy)]
pub struct HealthQuestion {
    pub key: &'static str,
    pub label: &'static str,
    pub kind: QuestionKind,
    pub required: bool,
}

pub const HEALTH_QUESTIONS: &[HealthQuestion] = &[
    HealthQuestion {
        key: "allergies",
        label: "Do you have any allergies?",
        kind: QuestionKind::Choice(YES_NO),
        required: true,
    },
    HealthQuestion {
        key: "pregnancy",
        label: "Are you pregnant or breastfeeding?",
        kind: QuestionKind::Choice(YES_NO),
        required: true,
    },
    HealthQuestion {
        key: "medications",
        label: "List any medications you are currently taking",
        kind: QuestionKind::Text,
        required: false,
    },
    HealthQuestion {
        key: "skin_conditions",
        label: "Do you have any skin conditions we should know about?",
        kind: QuestionKind::Text,
        required: false,
    },
];

pub fn find_question(key: &str) -> Option<&'static HealthQuestion> {
    HEALTH_QUESTIONS.iter().find(|q| q.key == key)
}

impl HealthQuestion {
    pub fn accepts(&self, value: &str) -> bool {
        match self.kind {
            QuestionKind::Choice(choices) => choices.iter().any(|(v, _)| *v == value),
            QuestionKind::Text => true,
        }
    }
}

/// Turn an answer key into a display label: `skin_conditions` → `Skin Conditions`.
pub fn answer_label(key: &str) -> String {
    key.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
