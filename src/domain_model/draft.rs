use super::{Language, ProblemCode};

/// Every draft key starts with this prefix, which lets a session teardown
/// sweep them without knowing individual problems.
pub const DRAFT_KEY_PREFIX: &str = "code_";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DraftKey {
    pub problem: ProblemCode,
    pub language: Language,
}

impl DraftKey {
    pub fn new(problem: ProblemCode, language: Language) -> Self {
        Self { problem, language }
    }

    pub fn storage_key(&self) -> String {
        format!("{}{}_{}", DRAFT_KEY_PREFIX, self.language, self.problem)
    }
}
