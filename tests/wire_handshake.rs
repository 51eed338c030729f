//! End-to-end handshake and query tests against an in-process fake server
//!
//! The fake server speaks just enough of the MariaDB protocol: a v10 greeting,
//! an OK (or ERR) for the handshake response, OK for `SET` statements, a one
//! row result set for `SELECT 1` and a syntax error for anything else.

use bytes::{BufMut, BytesMut};
use proxy_backend::connection::{
    Backend, ConnectionEstablisher, ConnectionSettings, Credentials, SslSettings,
};
use proxy_backend::protocol::constants::capabilities;
use proxy_backend::protocol::encode::{frame, put_lenenc_str};
use proxy_backend::query::QueryExecutor;
use proxy_backend::{Error, Host};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Clone, Copy, PartialEq)]
enum Auth {
    Accept,
    Reject,
}

fn greeting(caps: u32) -> BytesMut {
    let mut p = BytesMut::new();
    p.put_u8(10);
    p.put_slice(b"10.5.8-MariaDB\0");
    p.put_u32_le(7);
    p.put_slice(b"12345678");
    p.put_u8(0);
    p.put_u16_le(caps as u16);
    p.put_u8(33);
    p.put_u16_le(2);
    p.put_u16_le((caps >> 16) as u16);
    p.put_u8(21);
    p.put_bytes(0, 10);
    p.put_slice(b"9abcdefghijk\0");
    p.put_slice(b"mysql_native_password\0");
    p
}

fn ok() -> Vec<u8> {
    vec![0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00]
}

fn err(code: u16, state: &str, message: &str) -> Vec<u8> {
    let mut p = vec![0xff];
    p.extend_from_slice(&code.to_le_bytes());
    p.push(b'#');
    p.extend_from_slice(state.as_bytes());
    p.extend_from_slice(message.as_bytes());
    p
}

fn select_one() -> BytesMut {
    let mut coldef = BytesMut::new();
    for part in [&b"def"[..], b"", b"", b"", b"1", b""] {
        put_lenenc_str(&mut coldef, part);
    }
    coldef.put_u8(0x0c);
    coldef.put_u16_le(63);
    coldef.put_u32_le(1);
    coldef.put_u8(0x08);
    coldef.put_bytes(0, 5);

    let mut row = BytesMut::new();
    put_lenenc_str(&mut row, b"1");

    let eof = [0xfe, 0x00, 0x00, 0x02, 0x00];
    let mut out = BytesMut::new();
    out.extend_from_slice(&frame(&[1], 1));
    out.extend_from_slice(&frame(&coldef, 2));
    out.extend_from_slice(&frame(&eof, 3));
    out.extend_from_slice(&frame(&row, 4));
    out.extend_from_slice(&frame(&eof, 5));
    out
}

async fn read_frame(stream: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await.ok()?;
    let len = usize::from(header[0])
        | (usize::from(header[1]) << 8)
        | (usize::from(header[2]) << 16);
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await.ok()?;
    Some((header[3], payload))
}

/// Serve one client; returns the handshake response payload (if any was sent)
async fn serve_one(listener: TcpListener, caps: u32, auth: Auth) -> Option<Vec<u8>> {
    let (mut stream, _) = listener.accept().await.ok()?;
    stream.write_all(&frame(&greeting(caps), 0)).await.ok()?;

    let (_, response) = read_frame(&mut stream).await?;
    match auth {
        Auth::Accept => stream.write_all(&frame(&ok(), 2)).await.ok()?,
        Auth::Reject => {
            let denied = err(1045, "28000", "Access denied for user 'maxuser'");
            stream.write_all(&frame(&denied, 2)).await.ok()?;
            return Some(response);
        }
    }

    while let Some((_, command)) = read_frame(&mut stream).await {
        match command.split_first() {
            Some((0x01, _)) => break,
            Some((0x03, sql)) if sql.starts_with(b"SET ") => {
                stream.write_all(&frame(&ok(), 1)).await.ok()?;
            }
            Some((0x03, b"SELECT 1")) => stream.write_all(&select_one()).await.ok()?,
            _ => {
                let syntax = err(1064, "42000", "You have an error in your SQL syntax");
                stream.write_all(&frame(&syntax, 1)).await.ok()?;
            }
        }
    }
    Some(response)
}

fn server_caps() -> u32 {
    capabilities::CLIENT_FLAGS | capabilities::CLIENT_CONNECT_WITH_DB
}

async fn listen() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn backend(port: u16) -> Backend {
    Backend::new("server1", Host::from_parts("127.0.0.1", i32::from(port)))
}

#[tokio::test]
async fn test_connect_and_query() {
    init_tracing();
    let (listener, port) = listen().await;
    let server = tokio::spawn(serve_one(listener, server_caps(), Auth::Accept));

    let settings = ConnectionSettings::builder().build();
    let establisher = ConnectionEstablisher::new(settings.clone()).unwrap();
    let credentials = Credentials::new("maxuser").password("secret").database("test");
    let mut conn = establisher.connect(&backend(port), &credentials).await.unwrap();

    assert_eq!(conn.charset(), 33);
    assert_eq!(conn.server_version().total, 100508);
    assert_eq!(conn.tls_cipher(), None);

    let executor = QueryExecutor::new(&settings);
    let mut rows = executor.execute(&mut conn, "SELECT 1").await.unwrap();
    assert_eq!(rows.columns(), ["1"]);
    assert_eq!(rows.next().unwrap().get_by_name("1"), Some("1"));

    let err = executor.execute(&mut conn, "SELEC 1").await.unwrap_err();
    assert_eq!(err.code, 1064);
    assert_eq!(
        err.message,
        "Query 'SELEC 1' failed: 'You have an error in your SQL syntax'"
    );

    conn.close().await.unwrap();

    let response = server.await.unwrap().unwrap();
    assert!(response.windows(8).any(|w| w == b"maxuser\0"));
    assert!(response.windows(5).any(|w| w == b"test\0"));
}

#[tokio::test]
async fn test_rejected_login() {
    init_tracing();
    let (listener, port) = listen().await;
    let server = tokio::spawn(serve_one(listener, server_caps(), Auth::Reject));

    let establisher = ConnectionEstablisher::new(ConnectionSettings::default()).unwrap();
    let err = establisher
        .connect(&backend(port), &Credentials::new("maxuser").password("wrong"))
        .await
        .unwrap_err();

    match err {
        Error::AuthRejected { code, message, .. } => {
            assert_eq!(code, 1045);
            assert_eq!(message, "Access denied for user 'maxuser'");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    server.await.unwrap();
}

#[tokio::test]
async fn test_tls_required_but_not_offered() {
    init_tracing();
    let (listener, port) = listen().await;
    let server = tokio::spawn(serve_one(listener, server_caps(), Auth::Accept));

    // A key alone enables TLS without a client certificate; the file is never read
    let settings = ConnectionSettings::builder()
        .ssl(SslSettings {
            key: Some("/nonexistent/client-key.pem".into()),
            ..Default::default()
        })
        .build();
    let establisher = ConnectionEstablisher::new(settings).unwrap();

    let backend = backend(port);
    let err = establisher
        .connect(&backend, &Credentials::new("maxuser").password("secret"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TlsPolicyViolation { .. }), "{:?}", err);

    // No handshake response, so no credentials, reached the server
    assert_eq!(server.await.unwrap(), None);
}

#[tokio::test]
async fn test_extra_port_fallback() {
    init_tracing();
    let (dead, dead_port) = listen().await;
    drop(dead);

    let (listener, port) = listen().await;
    let server = tokio::spawn(serve_one(listener, server_caps(), Auth::Accept));

    let establisher = ConnectionEstablisher::new(ConnectionSettings::default()).unwrap();
    let conn = establisher
        .connect(&backend(dead_port).extra_port(port), &Credentials::new("maxuser"))
        .await
        .unwrap();
    assert!(conn.is_connected());

    conn.close().await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn test_unreachable_backend() {
    init_tracing();
    let (dead, dead_port) = listen().await;
    drop(dead);

    let establisher = ConnectionEstablisher::new(ConnectionSettings::default()).unwrap();
    let err = establisher
        .connect(&backend(dead_port), &Credentials::new("maxuser"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConnectFailed { .. }), "{:?}", err);
    assert!(err.is_transient());
}
