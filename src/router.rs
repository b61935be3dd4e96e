//! Method/path routing: a bounded static table, the GET-only dynamic
//! prefix rules, and the declarative view table.
//!
//! Routes are registered once before the workers start and are read-only
//! afterwards; handlers are shared trait objects.

use crate::{
    errors::ServeError,
    handlers::{
        assets::{FaviconHandler, StaticHandler},
        man::{ManApiHandler, ManPageHandler},
        metrics::MetricsHandler,
        networking::NetworkingHandler,
        packages::PackagesHandler,
        views::ViewHandler,
    },
    http::{request::Request, response::Response, types::Method},
    AppState,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Upper bound on the static route table.
const MAX_ROUTES: usize = 32;

/// A request handler behind the router seam.
#[async_trait]
pub(crate) trait RouteHandler: Send + Sync {
    async fn call(
        &self,
        state: &AppState,
        request: &Request<'_>,
        response: &mut Response,
    ) -> Result<(), ServeError>;
}

struct Route {
    method: Method,
    path: &'static str,
    handler: Arc<dyn RouteHandler>,
}

/// One row of the view table: everything the generic view handler needs to
/// compose a page.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ViewRoute {
    pub method: Method,
    pub path: &'static str,
    pub title: &'static str,
    pub page: &'static str,
    pub extra_head: Option<&'static str>,
    pub extra_js: Option<&'static str>,
}

pub(crate) struct Router {
    routes: Vec<Route>,
    views: Vec<ViewRoute>,
    man_page: Arc<dyn RouteHandler>,
    man_api: Arc<dyn RouteHandler>,
    packages: Arc<dyn RouteHandler>,
    statics: Arc<dyn RouteHandler>,
}

impl Router {
    /// The full production table.
    pub(crate) fn with_defaults() -> Self {
        let view_handler: Arc<dyn RouteHandler> = Arc::new(ViewHandler);
        let mut router = Self {
            routes: Vec::new(),
            views: vec![
                ViewRoute {
                    method: Method::Get,
                    path: "/",
                    title: "MiniWeb - Dashboard",
                    page: "dashboard.html",
                    extra_head: Some("dashboard_head.html"),
                    extra_js: Some("dashboard_js.html"),
                },
                ViewRoute {
                    method: Method::Get,
                    path: "/networking",
                    title: "MiniWeb - Networking",
                    page: "networking.html",
                    extra_head: None,
                    extra_js: Some("networking_js.html"),
                },
                ViewRoute {
                    method: Method::Get,
                    path: "/man",
                    title: "MiniWeb - Manual pages",
                    page: "man.html",
                    extra_head: None,
                    extra_js: None,
                },
                ViewRoute {
                    method: Method::Get,
                    path: "/packages",
                    title: "MiniWeb - Packages",
                    page: "packages.html",
                    extra_head: None,
                    extra_js: None,
                },
            ],
            man_page: Arc::new(ManPageHandler),
            man_api: Arc::new(ManApiHandler),
            packages: Arc::new(PackagesHandler),
            statics: Arc::new(StaticHandler),
        };

        for view in router.views.clone() {
            router.register(view.method, view.path, view_handler.clone());
        }
        router.register(Method::Get, "/api/metrics", Arc::new(MetricsHandler));
        router.register(Method::Get, "/api/networking", Arc::new(NetworkingHandler));
        router.register(Method::Get, "/favicon.ico", Arc::new(FaviconHandler));

        router
    }

    /// Appends a static route; the table never grows past [`MAX_ROUTES`].
    pub(crate) fn register(
        &mut self,
        method: Method,
        path: &'static str,
        handler: Arc<dyn RouteHandler>,
    ) -> bool {
        if self.routes.len() >= MAX_ROUTES {
            warn!(path, "route table full, registration ignored");
            return false;
        }
        self.routes.push(Route {
            method,
            path,
            handler,
        });
        true
    }

    /// Exact (method, path) scan first, then the GET-only dynamic rules.
    pub(crate) fn find(&self, method: Method, path: &str) -> Option<Arc<dyn RouteHandler>> {
        for route in &self.routes {
            if route.method == method && route.path == path {
                return Some(route.handler.clone());
            }
        }

        if method != Method::Get {
            return None;
        }

        if let Some(rest) = path.strip_prefix("/man/") {
            // The render route needs area, section and page name.
            if rest.bytes().filter(|&b| b == b'/').count() >= 2 {
                return Some(self.man_page.clone());
            }
            return None;
        }
        if path == "/api/man" || path.starts_with("/api/man/") {
            return Some(self.man_api.clone());
        }
        if path == "/api/packages" || path.starts_with("/api/packages/") {
            return Some(self.packages.clone());
        }
        if path.starts_with("/static/") {
            return Some(self.statics.clone());
        }

        None
    }

    /// Exact scan of the view table.
    pub(crate) fn find_view(&self, method: Method, path: &str) -> Option<&ViewRoute> {
        self.views
            .iter()
            .find(|v| v.method == method && v.path == path)
    }
}
