pub(crate) mod extraction;
pub(crate) mod generation;
pub(crate) mod grading;
pub(crate) mod identifiers;
pub(crate) mod papers;
pub(crate) mod prompts;
pub(crate) mod rendering;
pub(crate) mod sessions;
pub(crate) mod storage;
pub(crate) mod submissions;
