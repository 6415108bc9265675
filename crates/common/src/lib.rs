// gdslink-common: shared protocol, stream and config types for the gdslink workspace

pub mod config;
pub mod protocol;
pub mod selection;
pub mod stream;
