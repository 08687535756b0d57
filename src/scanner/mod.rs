pub mod classifier;
pub mod tree_scanner;

pub use classifier::{Classification, ClassificationRules};
pub use tree_scanner::{TreeCensus, TreeScanner};
