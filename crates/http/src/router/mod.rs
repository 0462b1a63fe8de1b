//! Segment trie router with path parameters
//!
//! Routes are split on `/` and stored in one arena-backed trie per method.
//! A segment starting with `:` is a parameter node: it matches any single
//! non-empty segment and binds the matched bytes under the parameter name.
//! Literal children are always tried before parameter children, and a
//! failed literal descent backtracks into the parameter alternative with
//! any bindings made below the failure rolled back.
//!
//! Matching allocates nothing: parameter values are stored as views into
//! the session buffer and parameter names are shared from the trie nodes.

use std::sync::Arc;

use crate::engine::Session;
use crate::protocol::{ParamBinding, View};

/// The methods with a pre-built tree each; anything else goes through the
/// dynamic list.
const METHODS: [&[u8]; 4] = [b"GET", b"POST", b"PUT", b"DELETE"];

struct Node<H> {
    /// Segment bytes, or the parameter name for a parameter node.
    prefix: Arc<[u8]>,
    is_param: bool,
    children: Vec<usize>,
    handler: Option<H>,
}

/// One trie, nodes held in a flat arena and linked by index.
struct Tree<H> {
    nodes: Vec<Node<H>>,
}

impl<H> Tree<H> {
    fn new() -> Self {
        Self { nodes: vec![Node { prefix: Arc::from(&b""[..]), is_param: false, children: Vec::new(), handler: None }] }
    }

    /// Walks `path` segment by segment, creating nodes as needed, and hangs
    /// the handler on the final node. Registering the same route twice
    /// replaces the handler.
    ///
    /// A node has at most one parameter child: registering a second
    /// parameter name at the same position reuses the first node (and its
    /// name).
    fn insert(&mut self, path: &[u8], handler: H) {
        let mut node = 0;
        for segment in path.split(|&b| b == b'/').filter(|s| !s.is_empty()) {
            let (is_param, prefix) = match segment[0] {
                b':' => (true, &segment[1..]),
                _ => (false, segment),
            };

            let found = self.nodes[node].children.iter().copied().find(|&c| {
                if is_param {
                    self.nodes[c].is_param
                } else {
                    !self.nodes[c].is_param && *self.nodes[c].prefix == *prefix
                }
            });

            node = match found {
                Some(child) => child,
                None => {
                    let child = self.nodes.len();
                    self.nodes.push(Node { prefix: Arc::from(prefix), is_param, children: Vec::new(), handler: None });
                    self.nodes[node].children.push(child);
                    child
                }
            };
        }
        self.nodes[node].handler = Some(handler);
    }

    /// Matches `path` (leading `/` already stripped) starting at `node`.
    ///
    /// `base` is the absolute buffer offset of `path[0]`, so parameter
    /// values come out as views into the session buffer. Bindings made on a
    /// branch that fails are rolled back before the next alternative.
    fn descend(
        &self,
        node: usize,
        path: &[u8],
        base: u16,
        params: &mut [Option<ParamBinding>],
        count: &mut u16,
    ) -> Option<usize> {
        if path.is_empty() {
            return self.nodes[node].handler.is_some().then_some(node);
        }

        let end = path.iter().position(|&b| b == b'/').unwrap_or(path.len());
        let segment = &path[..end];
        let (rest, rest_base) = if end < path.len() {
            (&path[end + 1..], base + end as u16 + 1)
        } else {
            (&path[path.len()..], base + end as u16)
        };

        for &child in &self.nodes[node].children {
            if !self.nodes[child].is_param && *self.nodes[child].prefix == *segment {
                if let Some(found) = self.descend(child, rest, rest_base, params, count) {
                    return Some(found);
                }
            }
        }

        // a parameter never binds an empty segment
        if segment.is_empty() {
            return None;
        }

        for &child in &self.nodes[node].children {
            if !self.nodes[child].is_param {
                continue;
            }

            let saved = *count;
            if (*count as usize) < params.len() {
                params[*count as usize] = Some(ParamBinding {
                    key: Arc::clone(&self.nodes[child].prefix),
                    value: View::new(base, base + end as u16),
                });
                *count += 1;
            }

            if let Some(found) = self.descend(child, rest, rest_base, params, count) {
                return Some(found);
            }

            for slot in &mut params[saved as usize..*count as usize] {
                *slot = None;
            }
            *count = saved;
        }

        None
    }
}

/// Method-then-path dispatch table.
///
/// `H` is whatever the caller wants to hang on a route — the engine never
/// inspects it.
pub struct Router<H> {
    trees: [Tree<H>; 4],
    dynamic: Vec<(Box<[u8]>, Tree<H>)>,
}

impl<H> Default for Router<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> std::fmt::Debug for Router<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let nodes: usize = self.trees.iter().map(|t| t.nodes.len()).sum();
        f.debug_struct("Router")
            .field("nodes", &nodes)
            .field("dynamic_methods", &self.dynamic.len())
            .finish()
    }
}

impl<H> Router<H> {
    pub fn new() -> Self {
        Self { trees: std::array::from_fn(|_| Tree::new()), dynamic: Vec::new() }
    }

    /// Registers `handler` for `method` + `path`. Unrecognized methods get
    /// their own tree on first use.
    pub fn register(&mut self, method: &[u8], path: &[u8], handler: H) {
        let tree = match METHODS.iter().position(|m| *m == method) {
            Some(i) => &mut self.trees[i],
            None => match self.dynamic.iter().position(|(m, _)| **m == *method) {
                Some(i) => &mut self.dynamic[i].1,
                None => {
                    self.dynamic.push((Box::from(method), Tree::new()));
                    let last = self.dynamic.len() - 1;
                    &mut self.dynamic[last].1
                }
            },
        };
        tree.insert(path, handler);
    }

    pub fn get(&mut self, path: &[u8], handler: H) {
        self.register(b"GET", path, handler);
    }

    pub fn post(&mut self, path: &[u8], handler: H) {
        self.register(b"POST", path, handler);
    }

    pub fn put(&mut self, path: &[u8], handler: H) {
        self.register(b"PUT", path, handler);
    }

    pub fn delete(&mut self, path: &[u8], handler: H) {
        self.register(b"DELETE", path, handler);
    }

    fn tree(&self, method: &[u8]) -> Option<&Tree<H>> {
        if let Some(i) = METHODS.iter().position(|m| *m == method) {
            return Some(&self.trees[i]);
        }
        self.dynamic.iter().find(|(m, _)| **m == *method).map(|(_, tree)| tree)
    }

    /// Resolves the session's parsed request to a handler.
    ///
    /// Splits the query string off the request target (once, in place),
    /// then matches method and path. On a hit the session carries the
    /// parameter bindings; on a miss nothing is bound and the caller
    /// decides what a missing route means.
    pub fn serve<'r>(&'r self, session: &mut Session) -> Option<&'r H> {
        let Session { buffer, params, request, .. } = session;
        let buf: &[u8] = buffer.as_deref().unwrap_or(&[]);

        if request.raw_query.is_empty() {
            let path = request.path.slice(buf);
            if let Some(q) = path.iter().position(|&b| b == b'?') {
                let split = request.path.start + q as u16;
                request.raw_query = View::new(split + 1, request.path.end);
                request.path.end = split;
            }
        }

        let tree = self.tree(request.method.slice(buf))?;

        let path = request.path.slice(buf);
        let (path, base) = match path.first() {
            Some(b'/') => (&path[1..], request.path.start + 1),
            _ => (path, request.path.start),
        };

        request.param_count = 0;
        let mut count = 0u16;
        let found = tree.descend(0, path, base, params, &mut count)?;
        request.param_count = count;
        tree.nodes[found].handler.as_ref()
    }
}
