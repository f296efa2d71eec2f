use http::Method;
use std::collections::HashMap;

#[derive(Debug)]
enum PathSegment {
    Static(String),
    Param(String),
}

#[derive(Debug)]
struct Path {
    segments: Vec<PathSegment>,
}

impl Path {
    /// Parses a path pattern such as "/aggregate/{id}"
    fn parse(path_str: &str) -> Self {
        let normalized_path = path_str.trim().trim_matches('/');

        let segments = if normalized_path.is_empty() {
            vec![]
        } else {
            normalized_path
                .split('/')
                .map(|s| {
                    if let Some(stripped) = s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                        PathSegment::Param(stripped.to_string())
                    } else {
                        PathSegment::Static(s.to_string())
                    }
                })
                .collect()
        };

        Path { segments }
    }

    fn matches<'a>(&self, request_path: &'a str) -> Option<HashMap<String, &'a str>> {
        let normalized_path = request_path.trim().trim_matches('/');

        let request_segments: Vec<&'a str> = if normalized_path.is_empty() {
            vec![]
        } else {
            normalized_path.split('/').collect()
        };

        if request_segments.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (seg, req_segment) in self.segments.iter().zip(request_segments) {
            match seg {
                PathSegment::Static(s) if s != req_segment => return None,
                PathSegment::Static(_) => {}
                PathSegment::Param(name) => {
                    params.insert(name.clone(), req_segment);
                }
            }
        }

        Some(params)
    }
}

#[derive(Debug, PartialEq)]
pub struct RouteMatch<'a, A> {
    pub params: HashMap<String, &'a str>,
    pub action: &'a A,
}

impl<A> RouteMatch<'_, A> {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).copied()
    }
}

#[derive(Debug)]
pub struct Route<A> {
    method: Method,
    path: Path,
    action: A,
}

impl<A> Route<A> {
    pub fn new(method: Method, path: &str, action: A) -> Self {
        Self {
            method,
            path: Path::parse(path),
            action,
        }
    }

    /// Trailing slashes on the request path are ignored.
    pub fn matches<'a>(&'a self, method: &Method, request_path: &'a str) -> Option<RouteMatch<'a, A>> {
        if self.method != method {
            return None;
        }

        let params = self.path.matches(request_path)?;
        Some(RouteMatch {
            params,
            action: &self.action,
        })
    }
}

/// Ordered table of routes; the first match wins.
pub struct RouteTable<A> {
    routes: Vec<Route<A>>,
}

impl<A> RouteTable<A> {
    pub fn new(routes: Vec<Route<A>>) -> Self {
        Self { routes }
    }

    pub fn resolve<'a, B>(&'a self, request: &'a http::Request<B>) -> Option<RouteMatch<'a, A>> {
        let path = request.uri().path();
        self.routes
            .iter()
            .find_map(|route| route.matches(request.method(), path))
    }
}
