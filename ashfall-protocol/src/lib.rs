pub mod client;
pub mod envelope;
pub mod framing;
pub mod response;
pub mod upstream;
pub mod wire;

pub use envelope::{ProtocolError, RequestEnvelope, RequestHeader, RequestTimestamps};
pub use response::ResponseBuilder;
