//! External collaborator integrations

pub mod interactsh;
pub use interactsh::{InteractshClient, InteractshInteraction};
