pub mod identity;
pub mod request_id;

pub use identity::identity_middleware;
pub use request_id::{make_span_with_request_id, request_id_middleware, RequestId};
