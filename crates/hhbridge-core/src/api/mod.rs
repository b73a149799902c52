//! HTTP clients.
//!
//! - `HhClient`: HH API with bearer authentication, single-flight login and
//!   one re-authentication retry on 401/403
//! - `BitrixClient`: Bitrix24 webhook REST calls

pub mod bitrix;
pub mod error;
pub mod hh;
pub mod request;
pub mod response;

pub use bitrix::BitrixClient;
pub use error::ApiError;
pub use hh::{HhClient, HhClientBuilder, Photo};
pub use request::{OutboundRequest, RequestBody, ResponseMode};
pub use response::ApiResponse;
