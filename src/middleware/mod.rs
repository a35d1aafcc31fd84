pub mod recover;
pub mod response;
pub mod trace;

pub use recover::handle_panic;
pub use response::{ApiResponse, ApiResult, Envelope};
pub use trace::{make_request_span, REQUEST_ID_HEADER};
