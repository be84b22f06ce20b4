pub mod registration_service;

pub use registration_service::{RegistrationError, RegistrationService};
