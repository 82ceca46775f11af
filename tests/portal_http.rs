use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread::JoinHandle;

use complyd::core::{DeviceInfo, Platform};
use complyd::portal::{Portal, PortalClient, PortalError, SessionCookie};

type Handler = Box<dyn Fn(&str, &str, &str) -> (u16, String) + Send>;

struct StubPortalServer {
    base_url: String,
    handle: JoinHandle<Vec<String>>,
}

impl StubPortalServer {
    /// 指定件数のリクエストを順に処理して終了する。ハンドラは
    /// (メソッド, パス, Cookie ヘッダ) を受け取り (ステータス, ボディ) を返す。
    fn spawn(requests: usize, handler: Handler) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("local addr");

        let handle = std::thread::spawn(move || {
            let mut seen = Vec::new();
            for _ in 0..requests {
                let (mut stream, _) = listener.accept().expect("accept");
                let (method, path, cookie) = read_request(&mut stream);
                seen.push(format!("{method} {path}"));

                let (status, body) = handler(&method, &path, &cookie);
                let reason = match status {
                    200 => "OK",
                    401 => "Unauthorized",
                    _ => "Error",
                };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes());
            }
            seen
        });

        Self {
            base_url: format!("http://{addr}"),
            handle,
        }
    }

    fn finish(self) -> Vec<String> {
        self.handle.join().expect("server thread")
    }
}

fn read_request(stream: &mut std::net::TcpStream) -> (String, String, String) {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];
    let headers_end = loop {
        let n = stream.read(&mut tmp).expect("read");
        if n == 0 {
            break buf.len();
        }
        buf.extend_from_slice(&tmp[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let headers = String::from_utf8_lossy(&buf[..headers_end]).to_string();
    let content_length = headers
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);

    let mut body_have = buf.len().saturating_sub(headers_end + 4);
    while body_have < content_length {
        let n = stream.read(&mut tmp).expect("read body");
        if n == 0 {
            break;
        }
        body_have += n;
    }

    let request_line = headers.lines().next().unwrap_or("");
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let path = parts.next().unwrap_or("").to_string();
    let cookie = headers
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("cookie") {
                Some(value.trim().to_string())
            } else {
                None
            }
        })
        .unwrap_or_default();

    (method, path, cookie)
}

fn session() -> SessionCookie {
    SessionCookie::new("portal_session", "tok-123")
}

fn sample_device() -> DeviceInfo {
    DeviceInfo {
        display_name: "test-host".to_string(),
        hostname: "test-host".to_string(),
        platform: Platform::Linux,
        os_version: "Ubuntu 24.04".to_string(),
        serial_number: None,
        hardware_model: None,
    }
}

#[test]
fn identity_sends_cookie_and_parses_user() {
    let server = StubPortalServer::spawn(
        1,
        Box::new(|method, path, cookie| {
            assert_eq!(method, "GET");
            assert_eq!(path, "/api/device-agent/me");
            assert_eq!(cookie, "portal_session=tok-123");
            (200, r#"{"userId":"user-1"}"#.to_string())
        }),
    );

    let client = PortalClient::new(&server.base_url).unwrap();
    let identity = client.identity(&session()).unwrap();
    assert_eq!(identity.user_id, "user-1");

    server.finish();
}

#[test]
fn my_organizations_parses_wire_fields() {
    let server = StubPortalServer::spawn(
        1,
        Box::new(|_, path, _| {
            assert_eq!(path, "/api/device-agent/my-organizations");
            (
                200,
                r#"[{"organizationId":"org-1","organizationName":"Acme","organizationSlug":"acme","role":"member"}]"#
                    .to_string(),
            )
        }),
    );

    let client = PortalClient::new(&server.base_url).unwrap();
    let orgs = client.my_organizations(&session()).unwrap();
    assert_eq!(orgs.len(), 1);
    assert_eq!(orgs[0].organization_id, "org-1");
    assert_eq!(orgs[0].organization_name, "Acme");

    server.finish();
}

#[test]
fn register_device_returns_device_id() {
    let server = StubPortalServer::spawn(
        1,
        Box::new(|method, path, _| {
            assert_eq!(method, "POST");
            assert_eq!(path, "/api/device-agent/register");
            (200, r#"{"deviceId":"dev-9"}"#.to_string())
        }),
    );

    let client = PortalClient::new(&server.base_url).unwrap();
    let device_id = client
        .register_device(&session(), "org-1", &sample_device(), "0.1.0")
        .unwrap();
    assert_eq!(device_id, "dev-9");

    server.finish();
}

#[test]
fn unauthorized_maps_to_session_expired() {
    let server = StubPortalServer::spawn(
        1,
        Box::new(|_, _, _| (401, r#"{"error":"unauthorized"}"#.to_string())),
    );

    let client = PortalClient::new(&server.base_url).unwrap();
    let err = client.check_in(&session(), "dev-1", &[], "0.1.0").unwrap_err();
    assert!(matches!(err, PortalError::SessionExpired));

    server.finish();
}

#[test]
fn server_error_keeps_status_and_body() {
    let server = StubPortalServer::spawn(
        1,
        Box::new(|_, _, _| (503, "overloaded".to_string())),
    );

    let client = PortalClient::new(&server.base_url).unwrap();
    let err = client.my_organizations(&session()).unwrap_err();
    let PortalError::Status { status, body } = err else {
        panic!("Status になるはず: {err}");
    };
    assert_eq!(status, 503);
    assert_eq!(body, "overloaded");

    server.finish();
}

#[test]
fn check_in_parses_compliance_flag() {
    let server = StubPortalServer::spawn(
        1,
        Box::new(|_, path, _| {
            assert_eq!(path, "/api/device-agent/check-in");
            (200, r#"{"isCompliant":false}"#.to_string())
        }),
    );

    let client = PortalClient::new(&server.base_url).unwrap();
    let response = client.check_in(&session(), "dev-1", &[], "0.1.0").unwrap();
    assert!(!response.is_compliant);
    assert!(response.next_check_in.is_none());

    server.finish();
}
