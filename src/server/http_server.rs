use may::coroutine::JoinHandle;
use may_minihttp::{HttpServerWithHeaders, HttpService};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Bind attempts made for a `:0` address before giving up.
const EPHEMERAL_BIND_ATTEMPTS: usize = 5;

/// Wrapper around may_minihttp's HTTP server, accepting up to 32 request headers.
pub struct HttpServer<T>(pub T);

/// Handle to a running HTTP server.
pub struct ServerHandle {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl ServerHandle {
    /// Address the server is listening on, with the real port when `:0` was requested.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Poll until the listener accepts connections.
    ///
    /// # Errors
    ///
    /// Returns `TimedOut` if nothing accepts within ~250ms (50 attempts, 5ms apart).
    pub fn wait_ready(&self) -> io::Result<()> {
        for _ in 0..50 {
            if TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }

    /// Cancel the server coroutine and wait for it to finish.
    pub fn stop(self) {
        // SAFETY: cancelling is the may API for stopping a coroutine we own the handle of;
        // the server holds no locks across yield points.
        unsafe {
            self.handle.coroutine().cancel();
        }
        let _ = self.handle.join();
        info!(addr = %self.addr, "HTTP server stopped");
    }

    /// Block until the server coroutine exits.
    ///
    /// # Errors
    ///
    /// Returns the panic payload if the server coroutine panicked.
    pub fn join(self) -> std::thread::Result<()> {
        self.handle.join()
    }
}

fn first_addr(addr: impl ToSocketAddrs) -> io::Result<SocketAddr> {
    addr.to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid address"))
}

/// A port the OS currently reports free on `addr`'s interface.
///
/// The temporary listener is closed before returning, so another process can take the
/// port before the server binds it; [`HttpServer::start`] retries when that happens.
fn free_port(addr: SocketAddr) -> io::Result<SocketAddr> {
    TcpListener::bind(addr)?.local_addr()
}

impl<T: HttpService + Clone + Send + Sync + 'static> HttpServer<T> {
    /// Bind `addr` and serve on a may coroutine.
    ///
    /// # Arguments
    ///
    /// * `addr` - Listen address. Port `0` picks a free ephemeral port.
    ///
    /// # Returns
    ///
    /// A [`ServerHandle`] whose [`ServerHandle::addr`] is the address actually bound.
    ///
    /// # Errors
    ///
    /// Returns the bind error if the address cannot be resolved or bound. For port `0`,
    /// a port lost to another process between selection and bind is retried
    /// up to five times before its `AddrInUse` error is returned.
    pub fn start<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        let requested = first_addr(addr)?;
        if requested.port() != 0 {
            let handle = HttpServerWithHeaders::<_, 32>(self.0).start(requested)?;
            info!(addr = %requested, "HTTP server started");
            return Ok(ServerHandle {
                addr: requested,
                handle,
            });
        }

        let mut last_err = io::Error::new(io::ErrorKind::AddrInUse, "no free port");
        for attempt in 1..=EPHEMERAL_BIND_ATTEMPTS {
            let addr = free_port(requested)?;
            match HttpServerWithHeaders::<_, 32>(self.0.clone()).start(addr) {
                Ok(handle) => {
                    info!(addr = %addr, "HTTP server started");
                    return Ok(ServerHandle { addr, handle });
                }
                Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                    debug!(addr = %addr, attempt, "Ephemeral port taken before bind, retrying");
                    last_err = e;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err)
    }
}
