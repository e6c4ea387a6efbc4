//! Authentication commands.
//!
//! Login and signup are the only places caller-facing auth errors surface.
//! Whether someone is signed in is always read back from the reconciler.

mod form;
mod login;
mod logout;
mod status;

pub use form::{AuthForm, FormMode};
pub use login::submit;
pub use logout::logout;
pub use status::status;
