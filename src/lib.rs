pub mod application;
pub mod bridge;
pub mod domain;
pub mod interfaces;
pub mod protocol;
