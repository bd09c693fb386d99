//! Radix tree node.
//!
//! Each node owns one path segment. Static children are kept sorted for
//! binary search; a node has at most one parameter child and one wildcard
//! child.

use http::Method;

use crate::method_router::MethodRouter;
use crate::params::Params;

/// Kind of segment a node matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentKind {
    /// Literal text such as `users`.
    Static,
    /// A single-segment binding such as `{id}`.
    Param(String),
    /// A trailing binding that swallows the rest of the path: `*rest` or
    /// `{rest...}`.
    Wildcard(String),
}

impl SegmentKind {
    fn parse(segment: &str) -> Self {
        if let Some(inner) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            match inner.strip_suffix("...") {
                Some(name) => Self::Wildcard(name.to_string()),
                None => Self::Param(inner.to_string()),
            }
        } else if let Some(name) = segment.strip_prefix('*') {
            Self::Wildcard(name.to_string())
        } else {
            Self::Static
        }
    }
}

/// A node in the radix tree.
#[derive(Debug, Clone)]
pub struct Node<T> {
    /// Segment text as written in the pattern.
    pub segment: String,
    /// How the segment matches.
    pub kind: SegmentKind,
    /// Values registered for the path ending at this node.
    pub methods: Option<MethodRouter<T>>,
    static_children: Vec<Node<T>>,
    param_child: Option<Box<Node<T>>>,
    wildcard_child: Option<Box<Node<T>>>,
}

impl<T> Node<T> {
    fn new(segment: impl Into<String>, kind: SegmentKind) -> Self {
        Self {
            segment: segment.into(),
            kind,
            methods: None,
            static_children: Vec::new(),
            param_child: None,
            wildcard_child: None,
        }
    }

    /// Creates the root of a tree.
    #[must_use]
    pub fn root() -> Self {
        Self::new("", SegmentKind::Static)
    }

    /// Registers `value` for `path`.
    ///
    /// `method == None` registers a method-agnostic entry.
    ///
    /// # Panics
    ///
    /// Panics if a wildcard is not the final segment, or if two patterns
    /// bind different names at the same parameter position. Both are
    /// programming errors caught at registration time.
    pub fn insert(&mut self, path: &str, method: Option<Method>, value: T) {
        let segments: Vec<&str> = split(path).collect();
        self.insert_segments(&segments, method, value);
    }

    fn insert_segments(&mut self, segments: &[&str], method: Option<Method>, value: T) {
        let Some((&segment, rest)) = segments.split_first() else {
            let methods = self.methods.get_or_insert_with(MethodRouter::new);
            match method {
                Some(method) => methods.insert(method, value),
                None => methods.insert_any(value),
            }
            return;
        };

        match SegmentKind::parse(segment) {
            SegmentKind::Static => {
                let idx = match self
                    .static_children
                    .binary_search_by(|c| c.segment.as_str().cmp(segment))
                {
                    Ok(idx) => idx,
                    Err(idx) => {
                        self.static_children
                            .insert(idx, Node::new(segment, SegmentKind::Static));
                        idx
                    }
                };
                self.static_children[idx].insert_segments(rest, method, value);
            }
            SegmentKind::Param(name) => {
                let child = self
                    .param_child
                    .get_or_insert_with(|| Box::new(Node::new(segment, SegmentKind::Param(name.clone()))));
                assert!(
                    child.kind == SegmentKind::Param(name.clone()),
                    "pattern binds `{name}` where `{}` is already registered",
                    child.segment
                );
                child.insert_segments(rest, method, value);
            }
            SegmentKind::Wildcard(name) => {
                assert!(rest.is_empty(), "wildcard `{segment}` must be the last segment");
                let child = self.wildcard_child.get_or_insert_with(|| {
                    Box::new(Node::new(segment, SegmentKind::Wildcard(name.clone())))
                });
                assert!(
                    child.kind == SegmentKind::Wildcard(name.clone()),
                    "pattern binds `{name}` where `{}` is already registered",
                    child.segment
                );
                child.insert_segments(&[], method, value);
            }
        }
    }

    /// Finds the method table registered for `path`.
    ///
    /// Priority at each level: static, then parameter, then wildcard. A
    /// wildcard needs at least one remaining segment.
    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<(&MethodRouter<T>, Params)> {
        let segments: Vec<&str> = split(path).collect();
        let mut params = Params::new();
        let methods = self.match_segments(&segments, &mut params)?;
        Some((methods, params))
    }

    fn match_segments(&self, segments: &[&str], params: &mut Params) -> Option<&MethodRouter<T>> {
        let Some((&segment, rest)) = segments.split_first() else {
            return self.methods.as_ref();
        };

        if let Ok(idx) = self
            .static_children
            .binary_search_by(|c| c.segment.as_str().cmp(segment))
        {
            if let Some(found) = self.static_children[idx].match_segments(rest, params) {
                return Some(found);
            }
        }

        if let Some(child) = &self.param_child {
            if let SegmentKind::Param(name) = &child.kind {
                let mark = params.len();
                params.push(name.clone(), segment);
                if let Some(found) = child.match_segments(rest, params) {
                    return Some(found);
                }
                params.truncate(mark);
            }
        }

        if let Some(child) = &self.wildcard_child {
            if let (SegmentKind::Wildcard(name), Some(methods)) = (&child.kind, &child.methods) {
                params.push(name.clone(), segments.join("/"));
                return Some(methods);
            }
        }

        None
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}
