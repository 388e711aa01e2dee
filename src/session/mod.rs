mod gate;
mod redirect;

pub use gate::{RefreshResult, SessionManager};
pub use redirect::{LoginRedirect, NoRedirect};
