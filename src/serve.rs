//! Preview server with polling live reload.
//!
//! A thread-per-connection HTTP/1.1 file server bound to `127.0.0.1`, rooted
//! at the preview directory. It only understands `GET` and `HEAD`:
//!
//! - `/` and directory paths serve their `index.html`
//! - paths are percent-decoded, then any with `..` segments get 404
//! - HTML responses get [`RELOAD_SCRIPT`] injected before `</body>`
//! - [`RELOAD_PATH`] answers with the current reload version
//!
//! The injected script polls the reload endpoint once a second and reloads
//! the page when the version changes. The watch coordinator bumps the
//! version through [`LiveReload`] whenever preview output changes.

use crate::watch::Reload;
use percent_encoding::percent_decode_str;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Component, Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

pub const RELOAD_PATH: &str = "/__reload";

pub const RELOAD_SCRIPT: &str = r#"<script>(function(){var v=null;setInterval(function(){fetch("/__reload",{cache:"no-store"}).then(function(r){return r.text()}).then(function(t){if(v!==null&&t!==v){location.reload()}v=t}).catch(function(){})},1000)})();</script>"#;

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Reload version shared between the coordinator and the server.
#[derive(Debug, Default)]
pub struct LiveReload {
    version: AtomicU64,
}

impl LiveReload {
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }
}

impl Reload for LiveReload {
    fn reload(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }
}

pub struct PreviewServer {
    port: u16,
    _stop: mpsc::Sender<()>,
}

impl PreviewServer {
    /// Bind and start serving `root` in the background. Port 0 picks a free
    /// port. The server stops when the returned handle is dropped.
    pub fn start(root: PathBuf, port: u16, reload: Arc<LiveReload>) -> Result<Self, ServeError> {
        let addr = format!("127.0.0.1:{port}");
        let bind_error = |source| ServeError::Bind {
            addr: addr.clone(),
            source,
        };
        let listener = TcpListener::bind(&addr).map_err(bind_error)?;
        let port = listener.local_addr().map_err(bind_error)?.port();
        listener.set_nonblocking(true).map_err(bind_error)?;
        let (tx, rx) = mpsc::channel::<()>();

        thread::spawn(move || {
            loop {
                if !matches!(rx.try_recv(), Err(mpsc::TryRecvError::Empty)) {
                    break;
                }
                match listener.accept() {
                    Ok((stream, _)) => {
                        let root = root.clone();
                        let reload = Arc::clone(&reload);
                        thread::spawn(move || serve_request(stream, &root, &reload));
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(Self { port, _stop: tx })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}/", self.port)
    }
}

struct Response {
    status: &'static str,
    content_type: &'static str,
    body: Vec<u8>,
}

impl Response {
    fn not_found() -> Self {
        Self {
            status: "404 Not Found",
            content_type: "text/plain",
            body: b"Not Found".to_vec(),
        }
    }
}

fn serve_request(stream: TcpStream, root: &Path, reload: &LiveReload) {
    let _ = stream.set_nonblocking(false);
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let mut reader = BufReader::new(&stream);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    // Drain the headers so closing the socket doesn't reset the connection.
    let mut header_line = String::new();
    while reader.read_line(&mut header_line).is_ok_and(|n| n > 2) {
        header_line.clear();
    }
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("");
    let target = parts.next().unwrap_or("/");

    let response = match method {
        "GET" | "HEAD" => respond(root, target, reload),
        _ => Response {
            status: "405 Method Not Allowed",
            content_type: "text/plain",
            body: b"Method Not Allowed".to_vec(),
        },
    };

    let header = format!(
        "HTTP/1.1 {}\r\n\
         Content-Type: {}\r\n\
         Content-Length: {}\r\n\
         Cache-Control: no-cache\r\n\
         Connection: close\r\n\
         \r\n",
        response.status,
        response.content_type,
        response.body.len()
    );
    let mut stream = &stream;
    let _ = stream.write_all(header.as_bytes());
    if method != "HEAD" {
        let _ = stream.write_all(&response.body);
    }
}

fn respond(root: &Path, target: &str, reload: &LiveReload) -> Response {
    let path = target.split(['?', '#']).next().unwrap_or("/");
    if path == RELOAD_PATH {
        return Response {
            status: "200 OK",
            content_type: "text/plain",
            body: reload.version().to_string().into_bytes(),
        };
    }
    let Some(file) = resolve(root, path) else {
        return Response::not_found();
    };
    let Ok(body) = std::fs::read(&file) else {
        return Response::not_found();
    };
    let content_type = content_type(&file);
    let body = if content_type.starts_with("text/html") {
        inject_reload(&String::from_utf8_lossy(&body)).into_bytes()
    } else {
        body
    };
    Response {
        status: "200 OK",
        content_type,
        body,
    }
}

/// Map a request path to a file under `root`. `None` for paths that try to
/// leave the root, are not valid UTF-8 once decoded, or don't name an
/// existing file.
pub fn resolve(root: &Path, request_path: &str) -> Option<PathBuf> {
    let decoded = percent_decode_str(request_path).decode_utf8().ok()?;
    let relative = Path::new(decoded.trim_start_matches('/'));
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    let mut file = root.join(relative);
    if file.is_dir() {
        file.push("index.html");
    }
    file.is_file().then_some(file)
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
        "html" => "text/html; charset=utf-8",
        "js" => "application/javascript",
        "css" => "text/css",
        "json" | "webmanifest" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff2" => "font/woff2",
        "woff" => "font/woff",
        _ => "application/octet-stream",
    }
}

/// Insert the reload script before the last `</body>`, or append it.
pub fn inject_reload(html: &str) -> String {
    match html.rfind("</body>") {
        Some(at) => format!("{}{}{}", &html[..at], RELOAD_SCRIPT, &html[at..]),
        None => format!("{html}{RELOAD_SCRIPT}"),
    }
}

/// Open `url` in the desktop's default browser.
pub fn open_browser(url: &str) -> io::Result<()> {
    let mut command = if cfg!(target_os = "macos") {
        let mut c = Command::new("open");
        c.arg(url);
        c
    } else if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", "", url]);
        c
    } else {
        let mut c = Command::new("xdg-open");
        c.arg(url);
        c
    };
    command.spawn().map(|_| ())
}
