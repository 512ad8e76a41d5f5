// Domain layer: deploy log and dump records plus the ports the adapters implement.

pub mod model;
pub mod ports;
