pub mod broadcast_service;
pub mod generation;
pub mod notification_service;
pub mod payment;
