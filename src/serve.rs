//! The development server: requests are routed through the file
//! router below a site root, components are rendered wrapped in
//! `RouteComponent` and `ErrorBoundary`, everything else is served
//! verbatim.

use std::{borrow::Cow, fs::File, path::{Path, PathBuf}, sync::Arc};

use anyhow::{anyhow, Context, Result};
use kstring::KString;
use pct_str::PctStr;
use rouille::{Request, Response, ResponseBody, Server};

use crate::{boundary::{render_fallback, ErrorBoundary, Fragment, RouteComponent},
            component::Component,
            config::Config,
            dt,
            error::ImportError,
            expr::{Evaluator, ExprEvaluator},
            info,
            loader::{FsSources, Loader, Sources},
            router::{FsListing, Listing, RouteMatch, Router, ERROR_PAGE},
            scope::Scope,
            value::{Value, Vars},
            warn};

/// What to send for a request.
#[derive(Debug, PartialEq)]
pub enum Reply {
    Page {
        status: u16,
        content_type: &'static str,
        headers: Vec<(KString, KString)>,
        body: String,
    },
    Static(PathBuf),
}

impl Reply {
    pub fn status(&self) -> u16 {
        match self {
            Reply::Page { status, .. } => *status,
            Reply::Static(_) => 200,
        }
    }
}

fn status_title(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "Internal Server Error",
    }
}

pub fn errorpage_from_status(status: u16) -> Reply {
    let title = status_title(status);
    Reply::Page {
        status,
        content_type: "text/html; charset=utf-8",
        headers: Vec::new(),
        body: format!("<html><head><title>{title}</title></head><body><h1>{title}</h1>\
                       </body></html>\n"),
    }
}

/// Decode a query string into variables; keys are taken as they are,
/// later occurrences win.
pub fn query_vars(query: &str) -> Vars {
    let decode = |s: &str| {
        let s = s.replace('+', " ");
        PctStr::new(&s).ok().map(|p| p.decode()).unwrap_or_else(|| s.clone())
    };
    query.split('&')
        .filter(|kv| !kv.is_empty())
        .map(|kv| {
            let (k, v) = kv.split_once('=').unwrap_or((kv, ""));
            (KString::from_string(decode(k)), Value::from(decode(v)))
        })
        .collect()
}

/// A site: a router over its root directory and a loader for the
/// components found there.
#[derive(Debug)]
pub struct Site<L: Listing> {
    router: Router<L>,
    loader: Arc<Loader>,
}

impl Site<FsListing> {
    pub fn open(root: &Path, config: &Config) -> Site<FsListing> {
        Site::new(FsListing::new(root),
                  Arc::new(FsSources),
                  config,
                  Arc::new(ExprEvaluator::new()))
    }
}

impl<L: Listing> Site<L> {
    pub fn new(listing: L,
               sources: Arc<dyn Sources>,
               config: &Config,
               evaluator: Arc<dyn Evaluator>) -> Site<L> {
        Site {
            router: Router::new(listing),
            loader: Loader::new(sources, config.search_path.clone(), evaluator),
        }
    }

    pub fn router(&self) -> &Router<L> {
        &self.router
    }

    pub fn loader(&self) -> &Arc<Loader> {
        &self.loader
    }

    fn fallback(&self) -> Option<Arc<dyn Component>> {
        let path = self.router.listing().full_path(Path::new(ERROR_PAGE));
        match self.loader.load_path("_error", &path) {
            Ok(c) => Some(c),
            Err(ImportError::NotFound { .. }) => None,
            Err(e) => {
                warn!("can't use the error page: {:#}", anyhow!(e));
                None
            }
        }
    }

    fn page(&self, path: &Path, params: Vars, vars: Vars, fragment: Option<&str>) -> Reply {
        let name = path.to_string_lossy();
        let fallback = self.fallback();
        let scope = Scope::new(vars, Default::default(), false);
        let result = match self.loader.load_path(&name, path) {
            Ok(component) => {
                let mut inner: Arc<dyn Component> = Arc::new(RouteComponent::new(component, params));
                if let Some(id) = fragment {
                    inner = Arc::new(Fragment::new(inner, id));
                }
                // a fallback page is sent whole
                let boundary = ErrorBoundary::new(inner, fallback);
                let result = boundary.render(&scope);
                // no session, nothing may keep running
                scope.notifier().close();
                if let Err(e) = boundary.dispose() {
                    warn!("dispose: {:#}", e);
                }
                result
            }
            // the error page shows parse errors, too
            Err(e) => render_fallback(fallback.as_ref(), &scope, e.into()),
        };
        let meta = scope.response();
        match result {
            Ok(value) => match reply_body(&value) {
                Ok((content_type, body)) => Reply::Page {
                    status: meta.status.unwrap_or(200),
                    content_type,
                    headers: meta.headers,
                    body,
                },
                Err(e) => {
                    warn!("serializing: {:#}", e);
                    errorpage_from_status(500)
                }
            },
            Err(e) => {
                warn!("{:#}", e);
                errorpage_from_status(meta.status.unwrap_or(500))
            }
        }
    }

    /// The reply for a GET of `url_path`; `query` is the raw query
    /// string. The query parameter `fragment` selects an element by id.
    pub fn respond(&self, url_path: &str, query: &str) -> Reply {
        dt!("respond", url_path, query);
        let url_path = url_path.split('?').next().unwrap_or("");
        let route = match self.router.route(url_path) {
            Ok(r) => r,
            Err(e) => {
                warn!("routing {:?}: {:#}", url_path, e);
                return errorpage_from_status(500)
            }
        };
        match route {
            None => {
                info!("no route for {:?}", url_path);
                errorpage_from_status(404)
            }
            Some(RouteMatch::Static(path)) => Reply::Static(path),
            Some(m @ RouteMatch::Component { .. }) => {
                let query = query_vars(query);
                let fragment = query.get("fragment").and_then(Value::as_str).map(String::from);
                let mut vars = Vars::new();
                vars.insert(KString::from_static("path"), Value::from(url_path));
                vars.insert(KString::from_static("query"), Value::from(query));
                let params = m.vars();
                let path = match m {
                    RouteMatch::Component { path, .. } => path,
                    RouteMatch::Static(path) => path,
                };
                self.page(&path, params, vars, fragment.as_deref())
            }
        }
    }
}

/// Markup as HTML, structured data as JSON, the rest as text.
pub fn reply_body(value: &Value) -> Result<(&'static str, String)> {
    Ok(match value {
        Value::Html(m) => ("text/html; charset=utf-8", m.to_html_string()?),
        Value::Array(_) | Value::Object(_) =>
            ("application/json", serde_json::to_string(&value.to_json())?),
        v => ("text/plain; charset=utf-8", v.to_text()),
    })
}

fn to_response(reply: Reply) -> Result<Response> {
    Ok(match reply {
        Reply::Page { status, content_type, headers, body } => {
            let mut hs: Vec<(Cow<'static, str>, Cow<'static, str>)> =
                vec![(Cow::from("Content-Type"), Cow::from(content_type))];
            hs.extend(headers.into_iter()
                      .map(|(k, v)| (Cow::from(k.to_string()), Cow::from(v.to_string()))));
            Response {
                status_code: status,
                headers: hs,
                data: ResponseBody::from_string(body),
                upgrade: None,
            }
        }
        Reply::Static(path) => {
            let file = File::open(&path).with_context(|| anyhow!("opening {:?}", path))?;
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            Response::from_file(rouille::extension_to_mime(ext), file)
        }
    })
}

/// Make a handler for Rouille's `Server`.
pub fn server_handler<L: Listing + 'static>(site: Arc<Site<L>>)
                                          -> impl Fn(&Request) -> Response {
    move |request: &Request| -> Response {
        let reply = match request.method() {
            "GET" | "HEAD" => site.respond(request.raw_url(), request.raw_query_string()),
            _ => errorpage_from_status(405),
        };
        info!("{} {} -> {}", request.method(), request.raw_url(), reply.status());
        let mut response = match to_response(reply) {
            Ok(r) => r,
            Err(e) => {
                warn!("{:#}", e);
                to_response(errorpage_from_status(500))
                    .unwrap_or_else(|_| Response::empty_404())
            }
        };
        if request.method() == "HEAD" {
            response.data = ResponseBody::empty();
        }
        response
    }
}

/// Serve `root` on the configured address until the process ends.
pub fn serve(root: &Path, config: &Config) -> Result<()> {
    let site = Arc::new(Site::open(root, config));
    let server = Server::new(config.listen.clone(), server_handler(site))
        .map_err(|e| anyhow!("starting server on {:?}: {}", config.listen, e))?;
    warn!("listening on http://{}/", server.server_addr());
    server.run();
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::{loader::MemSources, router::MemListing};

    fn site(files: &[(&str, &str)]) -> Site<MemListing> {
        let sources = Arc::new(MemSources::new());
        for (path, text) in files {
            sources.insert(*path, text);
        }
        let listing = MemListing::from_paths(sources.paths());
        Site::new(listing, sources, &Config::default(), Arc::new(ExprEvaluator::new()))
    }

    fn page(status: u16, body: &str) -> Reply {
        Reply::Page {
            status,
            content_type: "text/html; charset=utf-8",
            headers: Vec::new(),
            body: body.into(),
        }
    }

    #[test]
    fn t_query_vars() {
        let v = query_vars("a=1&b=x+y%21&c&a=2");
        assert_eq!(v.get("a"), Some(&Value::from("2")));
        assert_eq!(v.get("b"), Some(&Value::from("x y!")));
        assert_eq!(v.get("c"), Some(&Value::from("")));
    }

    #[test]
    fn t_respond() {
        let s = site(&[
            ("index.chtml", "<h1>Home ${query.q}</h1>"),
            ("users/_id.chtml", "<p>user ${id}</p>"),
            ("data.chtml", "${[1, 2]}"),
            ("broken.chtml", "<p>${nope}</p>"),
            ("logo.png", "png"),
        ]);
        assert_eq!(s.respond("/", "q=x"), page(200, "<h1>Home x</h1>"));
        assert_eq!(s.respond("/users/7", ""), page(200, "<p>user 7</p>"));
        assert_eq!(s.respond("/logo.png", ""), Reply::Static("logo.png".into()));
        assert_eq!(s.respond("/nope/nope", "").status(), 404);
        assert_eq!(s.respond("/broken", "").status(), 500);
        assert_eq!(s.respond("/data", ""), Reply::Page {
            status: 200,
            content_type: "application/json",
            headers: Vec::new(),
            body: "[1,2]".into(),
        });
    }

    #[test]
    fn t_error_page_and_fragment() {
        let s = site(&[
            ("_error.chtml", "<h1>${status}</h1>"),
            ("a.chtml", "<c:gone/>"),
            ("b.chtml", "<div><p id=\"x\">X</p><p>Y</p></div>"),
            ("c.chtml", "<p>${1 +}</p>"),
        ]);
        assert_eq!(s.respond("/a", ""), page(404, "<h1>404</h1>"));
        assert_eq!(s.respond("/b", "fragment=x"), page(200, "<p id=\"x\">X</p>"));
        assert_eq!(s.respond("/c", ""), page(500, "<h1>500</h1>"));
        // the error page isn't a route
        assert_eq!(s.respond("/_error", "").status(), 404);
    }

    #[test]
    fn t_missing_fragment() {
        let with_fallback = site(&[
            ("_error.chtml", "<h1>${status}</h1>"),
            ("b.chtml", "<div><p id=\"x\">X</p></div>"),
            ("c.chtml", "<p>${nope}</p>"),
        ]);
        assert_eq!(with_fallback.respond("/b", "fragment=y"), page(404, "<h1>404</h1>"));
        // the error page is not cut down to the fragment
        assert_eq!(with_fallback.respond("/c", "fragment=x"), page(500, "<h1>500</h1>"));

        let without = site(&[("b.chtml", "<div><p id=\"x\">X</p></div>")]);
        assert_eq!(without.respond("/b", "fragment=y").status(), 404);
    }

    #[test]
    fn t_handler_methods() {
        let handler = server_handler(Arc::new(site(&[("index.chtml", "<h1>Home</h1>")])));
        let get = handler(&Request::fake_http("GET", "/", vec![], vec![]));
        assert_eq!(get.status_code, 200);
        assert_eq!(get.data.into_reader_and_size().1, Some("<h1>Home</h1>".len()));
        let head = handler(&Request::fake_http("HEAD", "/", vec![], vec![]));
        assert_eq!(head.status_code, 200);
        assert_eq!(head.data.into_reader_and_size().1, Some(0));
        let post = handler(&Request::fake_http("POST", "/", vec![], vec![]));
        assert_eq!(post.status_code, 405);
    }

    #[test]
    fn t_parse_errors_go_to_the_error_page() {
        let s = site(&[
            ("_error.chtml", "<p c:for=\"e in errors\">${e.kind} ${e.stack[0].line}</p>"),
            ("bad.chtml", "<p>\n<b></p>"),
        ]);
        assert_eq!(s.respond("/bad", ""), page(500, "<p>parse 2</p>"));
    }
}
