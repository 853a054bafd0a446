#![allow(unreachable_pub)]

mod error;
mod handler;
mod request;
mod result;
mod status;

pub use error::ErrorKind;
pub use handler::{Completed, Handler};
pub use request::{Request, RequestId, RequestOptions};
pub use result::{ResultRecord, TRANSPORT_ERROR_CODE, status_message};
pub use status::RequestStatus;

/// The fanout `Result` type
pub type Result<T> = std::result::Result<T, crate::ErrorKind>;
