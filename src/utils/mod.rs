pub mod error;
pub mod html;
pub mod logger;
pub mod redact;
pub mod validation;
