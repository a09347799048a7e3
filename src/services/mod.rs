pub mod fcm;
pub mod health_service;
pub mod oauth;
