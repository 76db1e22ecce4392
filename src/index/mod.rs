pub mod batch;
pub mod collector;
pub mod indexer;
pub mod processor;
pub mod seq;
