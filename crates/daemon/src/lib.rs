// gdslink-daemon library entry point (embeddable control server).

pub mod host;
pub mod rpc;
pub mod runtime;
pub mod startup;
