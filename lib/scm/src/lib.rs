pub mod commit;
pub mod drivers;
pub mod errors;
pub mod platforms;

pub use errors::{ScmError, ScmResult};
