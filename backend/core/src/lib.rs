pub mod error;
pub mod message;
pub mod traits;
pub mod types;

pub use error::{FailureKind, LmcError};
pub use message::{JobResult, Outcome};
pub use traits::{Probe, RemoteApi};
pub use types::{ConnectionState, Credentials, Job, JobKind, Link, NewUser};
