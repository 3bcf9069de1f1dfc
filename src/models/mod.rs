pub mod contact;
pub mod history;
pub mod queue;
pub mod settings;
