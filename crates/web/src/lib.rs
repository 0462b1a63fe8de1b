//! A minimal web framework over the `pike-http` engine
//!
//! Routes map method + path to handlers; handlers receive a [`Context`]
//! with zero-copy access to the parsed request and a buffered writer for
//! the response. Middleware wraps every route in registration order.
//!
//! ```no_run
//! use pike_web::Server;
//!
//! fn main() -> Result<(), pike_web::ServerError> {
//!     Server::builder()
//!         .address("127.0.0.1:8080")
//!         .get(b"/hello/:name", |ctx| {
//!             let name = ctx.param(b"name").unwrap_or(b"world").to_vec();
//!             let _ = ctx.send(&name);
//!         })
//!         .build()?
//!         .start()
//! }
//! ```

mod context;
mod server;

pub use context::{Context, Handler};
pub use server::{BoundServer, Server, ServerBuilder, ServerError};
