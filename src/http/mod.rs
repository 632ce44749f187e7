pub mod connection;
pub mod request;
pub mod response;

pub use connection::{ConnReaper, Connection, ConnectionTable};
pub use request::{HttpParser, Method, ParseOutcome};
pub use response::HttpResponder;
