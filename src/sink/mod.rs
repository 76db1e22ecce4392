pub mod checkpoint;
pub mod client;
