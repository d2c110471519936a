pub mod config;
pub mod contact;
pub mod data;
pub mod demo;
pub mod error;
pub mod export;
pub mod manager;
pub mod shell;
pub mod storage;
pub mod student;
pub mod validate;

pub use config::*;
pub use contact::*;
pub use data::{Entity, Id};
pub use error::*;
pub use manager::*;
pub use shell::*;
pub use storage::*;
pub use student::*;
pub use validate::ValidationError;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

// Contacts, backed by whichever storage they were opened with.
pub type ContactBook<S = JsonStorage> = Manager<Contact, S>;

// Students, backed by whichever storage they were opened with.
pub type Roster<S = JsonStorage> = Manager<Student, S>;
