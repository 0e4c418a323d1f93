pub mod categories;
pub mod chat;
pub mod config;
pub mod constants;
pub mod gemini;
pub mod markdown;
pub mod oracle;
pub mod prompt;
pub mod session;
pub mod web_server;

pub use categories::{Catalog, CategorySelector, Selection};
pub use chat::ChatContext;
pub use oracle::{Oracle, OracleError, OracleSession};
pub use session::{Message, Role, Session, SessionError, SessionManager};
