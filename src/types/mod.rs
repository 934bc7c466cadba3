//! Public request/response types.

mod request;
mod response;

pub use request::{GenerateRequest, Priority};
pub use response::{Admission, GenerateResponse, StreamEvent, Usage};
