// Control socket protocol: message shapes and method registry.

pub mod methods;
pub mod wire;
