pub mod duplicate;
pub mod hash;
pub mod history;
pub mod merge;
pub mod pipeline;
pub mod progress;
pub mod scanner;
