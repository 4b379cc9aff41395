//! Page server: hands out the preview page for each surface.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::Result;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};

use crate::core::is_shutdown;
use crate::embed::escape;
use crate::embed::serve::{INDEX_HTML, IndexVars, PREVIEW_HTML, PreviewVars};
use crate::panel::{PanelRegistry, SurfaceId};
use crate::{debug, log};

/// Maximum number of port binding attempts.
const MAX_PORT_RETRIES: u16 = 10;

const HTML: &str = "text/html; charset=utf-8";
const PLAIN: &str = "text/plain; charset=utf-8";

pub struct PageServer {
    server: Arc<Server>,
    addr: SocketAddr,
}

impl PageServer {
    /// Bind to the interface and port, moving up if the port is taken.
    pub fn bind(interface: IpAddr, base_port: u16) -> Result<Self> {
        let (server, addr) = bind_with_retry(interface, base_port)?;
        Ok(Self {
            server: Arc::new(server),
            addr,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `http://host:port`, with a loopback host if bound to all interfaces.
    pub fn origin(&self) -> String {
        if self.addr.ip().is_unspecified() {
            format!("http://localhost:{}", self.addr.port())
        } else {
            format!("http://{}", self.addr)
        }
    }

    /// Serve requests on a background thread until [`stop`](Self::stop).
    pub fn spawn(&self, registry: PanelRegistry, ws_port: u16) -> JoinHandle<()> {
        let server = Arc::clone(&self.server);
        std::thread::spawn(move || {
            for request in server.incoming_requests() {
                if let Err(e) = respond(request, &registry, ws_port) {
                    debug!("http"; "response failed: {}", e);
                }
            }
        })
    }

    pub fn stop(&self) {
        self.server.unblock();
    }
}

/// Bind to the specified interface and port, with automatic port retry.
fn bind_with_retry(interface: IpAddr, base_port: u16) -> Result<(Server, SocketAddr)> {
    let mut last_error = None;
    for offset in 0..MAX_PORT_RETRIES {
        let port = base_port.saturating_add(offset);
        match Server::http(SocketAddr::new(interface, port)) {
            Ok(server) => {
                let addr = server
                    .server_addr()
                    .to_ip()
                    .unwrap_or_else(|| SocketAddr::new(interface, port));
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, addr.port());
                }
                return Ok((server, addr));
            }
            Err(e) => last_error = Some(e),
        }
    }
    Err(anyhow::anyhow!(
        "failed to bind after {} attempts (ports {}-{}): {}",
        MAX_PORT_RETRIES,
        base_port,
        base_port.saturating_add(MAX_PORT_RETRIES - 1),
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}

/// A fully resolved response.
#[derive(Debug)]
struct Page {
    status: u16,
    content_type: &'static str,
    body: String,
}

impl Page {
    fn html(body: String) -> Self {
        Self {
            status: 200,
            content_type: HTML,
            body,
        }
    }

    fn plain(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: PLAIN,
            body: body.to_string(),
        }
    }
}

fn respond(request: Request, registry: &PanelRegistry, ws_port: u16) -> Result<()> {
    let page = if is_shutdown() {
        Page::plain(503, "503 Service Unavailable")
    } else if !matches!(request.method(), Method::Get | Method::Head) {
        Page::plain(405, "405 Method Not Allowed")
    } else {
        route(request.url(), registry, ws_port)
    };

    let head = request.method() == &Method::Head;
    let body = if head { Vec::new() } else { page.body.into_bytes() };
    let mut response = Response::from_data(body).with_status_code(StatusCode(page.status));
    if let Ok(header) = Header::from_bytes("Content-Type", page.content_type) {
        response.add_header(header);
    }
    if let Ok(header) = Header::from_bytes("Cache-Control", "no-store") {
        response.add_header(header);
    }
    request.respond(response)?;
    Ok(())
}

fn route(url: &str, registry: &PanelRegistry, ws_port: u16) -> Page {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    if path == "/" || path == "/index.html" {
        return Page::html(index(registry));
    }

    let surface = path
        .strip_prefix("/surface/")
        .map(|id| id.trim_end_matches('/'))
        .and_then(|id| id.parse().ok())
        .and_then(|id| registry.get(SurfaceId(id)));
    match surface {
        Some(handle) => Page::html(PREVIEW_HTML.render(&PreviewVars {
            title: handle.title(),
            surface_id: handle.id().0,
            ws_port,
        })),
        None => Page::plain(404, "404 Not Found"),
    }
}

fn index(registry: &PanelRegistry) -> String {
    let surfaces = registry.surfaces();
    let items = if surfaces.is_empty() {
        "<li>No previews open.</li>".to_string()
    } else {
        surfaces
            .iter()
            .map(|surface| {
                format!(
                    r#"<li><a href="/surface/{}">{}</a> <span class="state">{}</span></li>"#,
                    surface.id.0,
                    escape(&surface.title),
                    surface.state.label()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    INDEX_HTML.render(&IndexVars {
        surfaces: &items,
        version: env!("CARGO_PKG_VERSION"),
    })
}
