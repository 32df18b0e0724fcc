pub mod handle;
pub mod session;

pub use handle::{AuthSnapshot, SessionHandle};
pub use session::SessionStore;
