// Domain layer: core models and ports (interfaces). No transport details beyond request/response shapes.

pub mod model;
pub mod ports;
