pub(crate) mod answers;
pub(crate) mod assignments;
pub(crate) mod papers;
pub(crate) mod users;
