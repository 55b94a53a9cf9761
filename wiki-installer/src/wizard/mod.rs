pub mod engine;
pub mod error;
pub mod finalizer;
pub mod probe;
pub mod validator;
