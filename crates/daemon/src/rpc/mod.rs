// Control server: line-delimited JSON over TCP, dispatched through one hub task.

pub mod hub;
pub mod methods;
pub mod outbound;
pub mod selection;
pub mod tcp;
pub mod trace;
