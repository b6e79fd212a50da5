pub mod payment;
pub mod ports;
pub mod status;
