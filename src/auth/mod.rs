pub mod session;

pub use session::{AuthToken, Session, SessionContext};
