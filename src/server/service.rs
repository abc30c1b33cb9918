use super::request::parse_request;
use super::response::{write_handler_response, HeaderLines};
use crate::dispatcher::HandlerResponse;
use crate::registry::App;
use http::Method;
use may_minihttp::{HttpService, Request, Response};
use serde_json::json;
use std::io;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// `may_minihttp` service driving a frozen [`App`].
///
/// Cloned once per connection; clones share the same `App` and each gets its own
/// header line storage.
pub struct AppService {
    app: Arc<App>,
    lines: HeaderLines,
}

impl Clone for AppService {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.app))
    }
}

impl AppService {
    pub fn new(app: Arc<App>) -> Self {
        Self {
            app,
            lines: HeaderLines::new(),
        }
    }

    pub fn app(&self) -> &App {
        &self.app
    }
}

/// Liveness check body.
pub fn health_response() -> HandlerResponse {
    HandlerResponse::json(200, json!({ "status": "ok" }))
}

impl HttpService for AppService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let start = Instant::now();
        let request = match parse_request(req) {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "Unsupported request method");
                return write_handler_response(
                    res,
                    &HandlerResponse::error(400, "Bad Request"),
                    &mut self.lines,
                );
            }
        };

        if request.method == Method::GET && request.path == "/health" {
            return write_handler_response(res, &health_response(), &mut self.lines);
        }

        let response = self.app.handle(&request);
        info!(
            request_id = %request.request_id,
            method = %request.method,
            path = %request.path,
            status = response.status,
            latency_us = start.elapsed().as_micros() as u64,
            "Request handled"
        );
        write_handler_response(res, &response, &mut self.lines)
    }
}
