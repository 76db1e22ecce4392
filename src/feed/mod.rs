pub mod slurper;
pub mod transport;
pub mod url;
