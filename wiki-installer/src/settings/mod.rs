pub mod artifact;
pub mod installer;
