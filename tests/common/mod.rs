#![allow(dead_code)]

pub const JWT_SECRET: &str = "s3cr1t";

pub mod test_server {
    use std::sync::Once;

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_stack_size(0x8000);
        });
    }
}

pub mod tokens {
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::{json, Value};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    pub fn sign(claims: &Value, secret: &str) -> String {
        jsonwebtoken::encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn token(token_type: &str, fresh: bool, exp: i64, secret: &str) -> String {
        let claims = json!({"sub": "1", "token_type": token_type, "fresh": fresh, "exp": exp});
        sign(&claims, secret)
    }

    pub fn access_token() -> String {
        token("access", true, now() + 900, super::JWT_SECRET)
    }

    /// Valid access token issued by a refresh rather than a login.
    pub fn stale_access_token() -> String {
        token("access", false, now() + 900, super::JWT_SECRET)
    }

    pub fn refresh_token() -> String {
        token("refresh", false, now() + 900, super::JWT_SECRET)
    }

    pub fn forged_token() -> String {
        token("access", true, now() + 900, "not-the-secret")
    }

    pub fn expired_token() -> String {
        token("access", true, now() - 3600, super::JWT_SECRET)
    }
}

pub mod http {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpStream};
    use std::time::Duration;

    pub fn send_request(addr: &SocketAddr, req: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(req.as_bytes()).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_millis(200)))
            .unwrap();
        let mut buf = Vec::new();
        loop {
            let mut tmp = [0u8; 1024];
            match stream.read(&mut tmp) {
                Ok(0) => break,
                Ok(n) => buf.extend_from_slice(&tmp[..n]),
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    break
                }
                Err(e) => panic!("read error: {:?}", e),
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Status, lowercased headers and JSON body (`Null` when empty).
    pub fn parse_response(resp: &str) -> (u16, Vec<(String, String)>, serde_json::Value) {
        let (head, body) = resp.split_once("\r\n\r\n").unwrap_or((resp, ""));
        let mut lines = head.lines();
        let status = lines
            .next()
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let headers = lines
            .filter_map(|l| l.split_once(':'))
            .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
            .collect();
        let json = serde_json::from_str(body).unwrap_or(serde_json::Value::Null);
        (status, headers, json)
    }

    pub fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
        headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}
