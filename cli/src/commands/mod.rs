pub mod analyze;
pub mod evaluate;
pub mod policy;
pub mod prompt;
pub mod reconcile;
pub mod trivia;
