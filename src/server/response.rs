use crate::dispatcher::HandlerResponse;
use may_minihttp::Response;
use std::io;

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        422 => "Unprocessable Entity",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// Owned header lines of the response currently being written on one connection.
///
/// `may_minihttp` takes header lines as `&'static str` and encodes the response right
/// after [`may_minihttp::HttpService::call`] returns, before the next request on the
/// same connection is handed to the service. The lines therefore only have to outlive
/// one call: they are kept here and replaced when the next response is rendered, so
/// memory stays proportional to a single response however many distinct values
/// (request ids, item links) a connection sees.
#[derive(Debug, Default)]
pub struct HeaderLines {
    lines: Vec<Box<str>>,
}

impl HeaderLines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored lines with `Name: value` lines for `hr`.
    fn render(&mut self, hr: &HandlerResponse) {
        self.lines.clear();
        self.lines.extend(
            hr.headers
                .iter()
                .map(|(name, value)| format!("{name}: {value}").into_boxed_str()),
        );
    }

    fn iter(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|l| l.as_ref())
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Write a dispatcher response to the wire.
///
/// # Arguments
///
/// * `res` - Response being built for the current request
/// * `hr` - Rendered dispatcher response
/// * `lines` - The connection's line storage; every header in `hr` is written
///
/// # Errors
///
/// Returns an error if the JSON body fails to serialize.
#[allow(unsafe_code)]
pub fn write_handler_response(
    res: &mut Response,
    hr: &HandlerResponse,
    lines: &mut HeaderLines,
) -> io::Result<()> {
    res.status_code(hr.status as usize, status_reason(hr.status));
    lines.render(hr);
    for line in lines.iter() {
        // SAFETY: the boxed line is only dropped by the next `render` on this
        // connection's `HeaderLines`, which happens in the next service call, after
        // may_minihttp has encoded this response. Moving the Vec does not move the
        // boxed contents.
        let line: &'static str = unsafe { &*(line as *const str) };
        res.header(line);
    }
    if hr.has_body() {
        let body = serde_json::to_vec(&hr.body).map_err(io::Error::other)?;
        res.body_vec(body);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::RequestId;
    use serde_json::json;

    #[test]
    fn test_status_reason() {
        assert_eq!(status_reason(204), "No Content");
        assert_eq!(status_reason(422), "Unprocessable Entity");
        assert_eq!(status_reason(599), "Unknown");
    }

    #[test]
    fn test_render_formats_every_header() {
        let mut hr = HandlerResponse::json(200, json!({"id": 1}));
        hr.set_header("Link", "<http://h/cats/1>; rel=\"self\"".to_string());
        let mut lines = HeaderLines::new();
        lines.render(&hr);
        let rendered: Vec<&str> = lines.iter().collect();
        assert_eq!(
            rendered,
            vec![
                "Content-Type: application/json",
                "Link: <http://h/cats/1>; rel=\"self\"",
            ]
        );
    }

    #[test]
    fn test_links_survive_many_distinct_request_ids() {
        let mut lines = HeaderLines::new();
        for i in 0..20_000u32 {
            let mut hr = HandlerResponse::json(200, json!({"id": i}));
            hr.set_header("X-Request-Id", RequestId::new().to_string());
            lines.render(&hr);
        }

        let mut hr = HandlerResponse::json(200, json!({"id": 77}));
        hr.set_header("Link", "<http://h/cats/77>; rel=\"self\"".to_string());
        hr.set_header("Access-Control-Expose-Headers", "Link".to_string());
        hr.set_header("X-Request-Id", RequestId::new().to_string());
        lines.render(&hr);

        let rendered: Vec<&str> = lines.iter().collect();
        assert!(rendered.contains(&"Link: <http://h/cats/77>; rel=\"self\""));
        assert!(rendered.contains(&"Access-Control-Expose-Headers: Link"));
        assert!(rendered.iter().any(|l| l.starts_with("X-Request-Id: ")));
        assert_eq!(lines.len(), 4);
    }
}
