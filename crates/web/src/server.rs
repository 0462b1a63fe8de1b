//! Server builder and request dispatch
//!
//! [`Server::builder`] wires routes, middleware and engine knobs together;
//! [`Server::bind`] creates the listening socket (separately from running,
//! so the actually bound address is observable when binding port 0), and
//! [`BoundServer::run`] hands a dispatch callback to the engine and blocks
//! forever.
//!
//! Dispatch runs on engine worker threads: drain every complete buffered
//! request, route each one, run the middleware chain, and answer 404 for
//! routing misses. A malformed request or a failed response write closes
//! the connection.

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use pike_http::engine::{Conn, EngineConfig, Reactor, ServeFn, ServeOutcome, Session};
use pike_http::protocol::{EngineError, parser};
use pike_http::router::Router;
use thiserror::Error;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::FmtSubscriber;

use crate::context::{Context, Handler};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("server address must be set")]
    MissingAddress,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub struct ServerBuilder {
    address: Option<Vec<SocketAddr>>,
    router: Router<Handler>,
    middleware: Vec<Handler>,
    default_handler: Handler,
    engine: EngineConfig,
}

impl ServerBuilder {
    fn new() -> Self {
        Self {
            address: None,
            router: Router::new(),
            middleware: Vec::new(),
            default_handler: Box::new(not_found),
            engine: EngineConfig::default(),
        }
    }

    /// Sets the listen address. A resolution failure is reported at
    /// [`ServerBuilder::build`] as [`ServerError::MissingAddress`].
    pub fn address<A: ToSocketAddrs>(mut self, address: A) -> Self {
        self.address = match address.to_socket_addrs() {
            Ok(addrs) => Some(addrs.collect()),
            Err(e) => {
                warn!(cause = %e, "failed to resolve listen address");
                None
            }
        };
        self
    }

    /// Registers an endpoint for `method` + `path`. Path segments starting
    /// with `:` are parameters, e.g. `/users/:id`.
    pub fn route(
        mut self,
        method: &[u8],
        path: &[u8],
        handler: impl Fn(&mut Context<'_>) + Send + Sync + 'static,
    ) -> Self {
        self.router.register(method, path, Box::new(handler));
        self
    }

    pub fn get(self, path: &[u8], handler: impl Fn(&mut Context<'_>) + Send + Sync + 'static) -> Self {
        self.route(b"GET", path, handler)
    }

    pub fn post(self, path: &[u8], handler: impl Fn(&mut Context<'_>) + Send + Sync + 'static) -> Self {
        self.route(b"POST", path, handler)
    }

    pub fn put(self, path: &[u8], handler: impl Fn(&mut Context<'_>) + Send + Sync + 'static) -> Self {
        self.route(b"PUT", path, handler)
    }

    pub fn delete(self, path: &[u8], handler: impl Fn(&mut Context<'_>) + Send + Sync + 'static) -> Self {
        self.route(b"DELETE", path, handler)
    }

    /// Appends a middleware; middleware runs in registration order, each
    /// one deciding via [`Context::next`] whether the chain continues.
    pub fn middleware(mut self, handler: impl Fn(&mut Context<'_>) + Send + Sync + 'static) -> Self {
        self.middleware.push(Box::new(handler));
        self
    }

    /// Replaces the routing-miss handler (the built-in one answers 404).
    pub fn default_handler(mut self, handler: impl Fn(&mut Context<'_>) + Send + Sync + 'static) -> Self {
        self.default_handler = Box::new(handler);
        self
    }

    /// Caps the raw size of one request (and the per-connection buffer).
    pub fn max_request_size(mut self, bytes: usize) -> Self {
        self.engine.max_raw_size = bytes;
        self
    }

    pub fn workers(mut self, count: usize) -> Self {
        self.engine.workers = Some(count);
        self
    }

    pub fn build(self) -> Result<Server, ServerError> {
        let address = self.address.filter(|a| !a.is_empty()).ok_or(ServerError::MissingAddress)?;
        let app = App { router: self.router, middleware: self.middleware, default_handler: self.default_handler };
        Ok(Server { address, engine: self.engine, app: Arc::new(app) })
    }
}

impl std::fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("address", &self.address)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

/// A configured server, not yet bound.
pub struct Server {
    address: Vec<SocketAddr>,
    engine: EngineConfig,
    app: Arc<App>,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Binds the listening socket, trying each resolved address in order.
    pub fn bind(self) -> Result<BoundServer, ServerError> {
        let mut last_error = None;
        for addr in &self.address {
            match Reactor::bind(*addr, self.engine.clone()) {
                Ok(reactor) => return Ok(BoundServer { reactor, app: self.app }),
                Err(e) => {
                    warn!(addr = %addr, cause = %e, "bind failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.map_or(ServerError::MissingAddress, ServerError::Engine))
    }

    /// Installs a fmt subscriber, binds and runs. Intended for binaries;
    /// embedders wanting their own subscriber use [`Server::bind`] +
    /// [`BoundServer::run`] directly.
    pub fn start(self) -> Result<(), ServerError> {
        let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
        tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

        let bound = self.bind()?;
        info!(addr = %bound.local_addr(), "server bound");
        bound.run()?;
        Ok(())
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server").field("address", &self.address).finish()
    }
}

/// A server with its listening socket in place.
pub struct BoundServer {
    reactor: Reactor,
    app: Arc<App>,
}

impl std::fmt::Debug for BoundServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundServer").field("local_addr", &self.local_addr()).finish()
    }
}

impl BoundServer {
    /// The actually bound address — the ephemeral port when binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.reactor.local_addr()
    }

    /// Blocks forever dispatching requests on engine worker threads.
    pub fn run(self) -> Result<(), ServerError> {
        let app = Arc::clone(&self.app);
        let serve: Arc<ServeFn> = Arc::new(move |conn, session| app.serve(conn, session));
        self.reactor.run(serve)?;
        Ok(())
    }
}

/// Immutable routing state shared by all worker threads.
struct App {
    router: Router<Handler>,
    middleware: Vec<Handler>,
    default_handler: Handler,
}

impl App {
    fn serve(&self, conn: &Conn<'_>, session: &mut Session) -> ServeOutcome {
        let mut close = false;
        let result = parser::drain(session, |session, _consumed| {
            if !close && !self.dispatch(conn, session) {
                close = true;
            }
        });

        if close {
            return ServeOutcome::Close;
        }
        match result {
            Ok(true) => ServeOutcome::Drained,
            Ok(false) => ServeOutcome::Partial,
            Err(e) => {
                debug!(fd = conn.fd(), cause = %e, "malformed request");
                ServeOutcome::Close
            }
        }
    }

    /// Routes and answers one request. Returns `false` when the connection
    /// must be closed (the response write failed).
    fn dispatch(&self, conn: &Conn<'_>, session: &mut Session) -> bool {
        let endpoint = match self.router.serve(session) {
            Some(handler) => handler,
            None => &self.default_handler,
        };

        let mut ctx = Context::new(conn, session, &self.middleware, endpoint);
        ctx.next();
        if !ctx.sent() {
            // a handler that wrote nothing still owes the client an answer
            let _ = ctx.send(b"");
        }

        debug!(
            method = %String::from_utf8_lossy(session.method_bytes()),
            path = %String::from_utf8_lossy(session.path_bytes()),
            status = ctx.status(),
            "request served"
        );
        !ctx.write_failed()
    }
}

fn not_found(ctx: &mut Context<'_>) {
    ctx.set_status(404);
    ctx.set_header(b"Content-Type", b"text/plain");
    let _ = ctx.send(b"404 page not found\n");
}
