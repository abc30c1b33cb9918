use crate::dispatcher::{HandlerRequest, HeaderVec, RequestBody};
use crate::ids::RequestId;
use http::Method;
use may_minihttp::Request;
use std::io::Read;
use std::sync::Arc;
use tracing::debug;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Parse a `Cookie` header into name/value pairs.
pub fn parse_cookies(header: Option<&str>) -> HeaderVec {
    header
        .map(|c| {
            c.split(';')
                .filter_map(|pair| {
                    let mut parts = pair.trim().splitn(2, '=');
                    let name = parts.next()?.trim();
                    if name.is_empty() {
                        return None;
                    }
                    let value = parts.next().unwrap_or("").trim().to_string();
                    Some((Arc::from(name), value))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Decode a raw body according to its content type.
///
/// Empty bodies stay [`RequestBody::Empty`]; anything that is not a form is read as
/// JSON.
pub fn decode_body(content_type: Option<&str>, bytes: &[u8]) -> RequestBody {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return RequestBody::Empty;
    }
    let is_form = content_type
        .map(|ct| ct.trim().to_ascii_lowercase().starts_with(FORM_CONTENT_TYPE))
        .unwrap_or(false);
    if is_form {
        return RequestBody::Form(
            url::form_urlencoded::parse(bytes)
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        );
    }
    match serde_json::from_slice(bytes) {
        Ok(value) => RequestBody::Json(value),
        Err(e) => RequestBody::Invalid(format!("invalid JSON body: {e}")),
    }
}

/// Read and decode a request body.
///
/// A body that cannot be read completely is [`RequestBody::Invalid`], so the request
/// fails with `400` instead of reaching the resource with a truncated payload.
///
/// # Arguments
///
/// * `reader` - The request body stream
/// * `content_type` - Value of the `Content-Type` header, if any
///
/// # Returns
///
/// The decoded body and the number of bytes read.
pub fn read_body(mut reader: impl Read, content_type: Option<&str>) -> (RequestBody, usize) {
    let mut bytes = Vec::new();
    match reader.read_to_end(&mut bytes) {
        Ok(n) => (decode_body(content_type, &bytes), n),
        Err(e) => {
            debug!(error = %e, bytes_read = bytes.len(), "Request body read failed");
            (
                RequestBody::Invalid(format!("request body could not be read: {e}")),
                bytes.len(),
            )
        }
    }
}

/// Turn a wire request into a [`HandlerRequest`].
///
/// Fails only for method tokens `http` cannot represent.
pub fn parse_request(req: Request) -> Result<HandlerRequest, http::method::InvalidMethod> {
    let method = Method::from_bytes(req.method().as_bytes())?;
    let mut parsed = HandlerRequest::new(method, req.path());

    for h in req.headers() {
        parsed.headers.push((
            Arc::from(h.name.to_ascii_lowercase()),
            String::from_utf8_lossy(h.value).into_owned(),
        ));
    }
    parsed.request_id = RequestId::from_header_or_new(parsed.get_header("x-request-id"));
    parsed.cookies = parse_cookies(parsed.get_header("cookie"));

    let (body, body_bytes) = read_body(req.body(), parsed.get_header("content-type"));
    parsed.body = body;

    debug!(
        request_id = %parsed.request_id,
        method = %parsed.method,
        path = %parsed.path,
        header_count = parsed.headers.len(),
        body_bytes,
        "HTTP request parsed"
    );
    Ok(parsed)
}
