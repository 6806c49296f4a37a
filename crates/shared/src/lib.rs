pub mod domain;
pub mod error;
pub mod observable;
pub mod text;
