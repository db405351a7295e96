pub mod orchestrate;
pub mod tasks;
