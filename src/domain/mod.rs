//! Domain layer: entities, value objects and the pure business rules, plus
//! the ports the outer layers implement.

pub mod booking;
pub mod listing;
pub mod money;
pub mod payment;
pub mod ports;
pub mod review;
pub mod user;
