//! URL codec: text <-> [`UrlTree`].

use crate::error::UrlParseError;
use crate::url_tree::{PRIMARY_OUTLET, Params, UrlSegment, UrlSegmentGroup, UrlTree};
use std::collections::BTreeMap;

/// Converts between URL strings and [`UrlTree`]s.
pub trait UrlSerializer: Send + Sync + 'static {
    fn parse(&self, url: &str) -> Result<UrlTree, UrlParseError>;
    fn serialize(&self, tree: &UrlTree) -> String;
}

/// The default codec.
///
/// ```text
/// /team/33(aux:chat//side:help)?debug=true#top
/// ```
///
/// Segments, query keys/values and the fragment are percent-encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultUrlSerializer;

impl UrlSerializer for DefaultUrlSerializer {
    fn parse(&self, url: &str) -> Result<UrlTree, UrlParseError> {
        let mut parser = UrlParser::new(url);
        let root = parser.parse_root()?;
        let query_params = parser.parse_query_params()?;
        let fragment = parser.parse_fragment()?;
        if !parser.remaining.is_empty() {
            return Err(parser.error("unexpected trailing characters"));
        }
        Ok(UrlTree::new(root, query_params, fragment))
    }

    fn serialize(&self, tree: &UrlTree) -> String {
        let mut out = String::from("/");
        out.push_str(&serialize_group(&tree.root, true));
        if !tree.query_params.is_empty() {
            let query: Vec<String> = tree
                .query_params
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect();
            out.push('?');
            out.push_str(&query.join("&"));
        }
        if let Some(fragment) = &tree.fragment {
            out.push('#');
            out.push_str(&urlencoding::encode(fragment));
        }
        out
    }
}

fn serialize_paths(group: &UrlSegmentGroup) -> String {
    group
        .segments
        .iter()
        .map(|s| urlencoding::encode(&s.path).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn serialize_group(group: &UrlSegmentGroup, root: bool) -> String {
    if !group.has_children() {
        return serialize_paths(group);
    }

    // A group without segments has no path of its own; its children serialize in place.
    if root || group.segments.is_empty() {
        let primary = group
            .primary()
            .map(|p| serialize_group(p, false))
            .unwrap_or_default();
        let named: Vec<String> = group
            .ordered_children()
            .into_iter()
            .filter(|(outlet, _)| *outlet != PRIMARY_OUTLET)
            .map(|(outlet, child)| format!("{}:{}", outlet, serialize_group(child, false)))
            .collect();
        return if named.is_empty() {
            primary
        } else {
            format!("{}({})", primary, named.join("//"))
        };
    }

    let children: Vec<String> = group
        .ordered_children()
        .into_iter()
        .map(|(outlet, child)| {
            if outlet == PRIMARY_OUTLET {
                serialize_group(child, false)
            } else {
                format!("{}:{}", outlet, serialize_group(child, false))
            }
        })
        .collect();

    if group.children.len() == 1 && group.primary().is_some() {
        format!("{}/{}", serialize_paths(group), children[0])
    } else {
        format!("{}/({})", serialize_paths(group), children.join("//"))
    }
}

fn decode(raw: &str, parser: &UrlParser<'_>) -> Result<String, UrlParseError> {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .map_err(|_| parser.error("invalid percent-encoding"))
}

/// Characters that end a path segment.
fn is_segment_char(c: char) -> bool {
    !matches!(c, '/' | '(' | ')' | '?' | ';' | '=' | '&' | '#')
}

struct UrlParser<'a> {
    url: &'a str,
    remaining: &'a str,
}

impl<'a> UrlParser<'a> {
    fn new(url: &'a str) -> Self {
        Self {
            url,
            remaining: url,
        }
    }

    fn error(&self, reason: &str) -> UrlParseError {
        UrlParseError {
            url: self.url.to_string(),
            offset: self.url.len() - self.remaining.len(),
            reason: reason.to_string(),
        }
    }

    fn peek(&self, prefix: &str) -> bool {
        self.remaining.starts_with(prefix)
    }

    fn consume_optional(&mut self, prefix: &str) -> bool {
        if self.peek(prefix) {
            self.remaining = &self.remaining[prefix.len()..];
            true
        } else {
            false
        }
    }

    fn capture(&mut self, prefix: &str) -> Result<(), UrlParseError> {
        if self.consume_optional(prefix) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", prefix)))
        }
    }

    fn at_end_of_path(&self) -> bool {
        self.remaining.is_empty() || self.peek("?") || self.peek("#")
    }

    fn match_segment(&self) -> &'a str {
        let end = self
            .remaining
            .find(|c: char| !is_segment_char(c))
            .unwrap_or(self.remaining.len());
        &self.remaining[..end]
    }

    fn parse_root(&mut self) -> Result<UrlSegmentGroup, UrlParseError> {
        self.consume_optional("/");
        if self.at_end_of_path() {
            return Ok(UrlSegmentGroup::empty());
        }
        Ok(UrlSegmentGroup::new(Vec::new(), self.parse_children()?))
    }

    fn parse_segment(&mut self) -> Result<UrlSegment, UrlParseError> {
        let raw = self.match_segment();
        if raw.is_empty() {
            return Err(self.error("empty path segment"));
        }
        self.remaining = &self.remaining[raw.len()..];
        Ok(UrlSegment::new(decode(raw, self)?))
    }

    fn parse_children(&mut self) -> Result<BTreeMap<String, UrlSegmentGroup>, UrlParseError> {
        if self.at_end_of_path() {
            return Ok(BTreeMap::new());
        }
        self.consume_optional("/");

        let mut segments = Vec::new();
        if !self.peek("(") {
            segments.push(self.parse_segment()?);
        }
        while self.peek("/") && !self.peek("//") && !self.peek("/(") {
            self.capture("/")?;
            // trailing slash
            if self.at_end_of_path() {
                break;
            }
            segments.push(self.parse_segment()?);
        }

        let mut children = BTreeMap::new();
        if self.peek("/(") {
            self.capture("/")?;
            children = self.parse_parens(true)?;
        }

        let mut res = BTreeMap::new();
        if self.peek("(") {
            res = self.parse_parens(false)?;
        }
        if !segments.is_empty() || !children.is_empty() {
            res.insert(
                PRIMARY_OUTLET.to_string(),
                UrlSegmentGroup::new(segments, children),
            );
        }
        Ok(res)
    }

    fn parse_parens(
        &mut self,
        allow_primary: bool,
    ) -> Result<BTreeMap<String, UrlSegmentGroup>, UrlParseError> {
        self.capture("(")?;
        let mut groups = BTreeMap::new();

        while !self.consume_optional(")") {
            if self.remaining.is_empty() {
                return Err(self.error("unterminated '('"));
            }
            let path = self.match_segment();
            let next = self.remaining[path.len()..].chars().next();
            if !matches!(next, Some('/') | Some(')') | Some(';') | Some('(')) {
                return Err(self.error("malformed outlet group"));
            }

            let outlet = if let Some(idx) = path.find(':') {
                let name = &path[..idx];
                self.capture(name)?;
                self.capture(":")?;
                name.to_string()
            } else if allow_primary {
                PRIMARY_OUTLET.to_string()
            } else {
                return Err(self.error("expected a named outlet"));
            };

            let mut children = self.parse_children()?;
            let group = if children.len() == 1 && children.contains_key(PRIMARY_OUTLET) {
                children
                    .remove(PRIMARY_OUTLET)
                    .unwrap_or_else(UrlSegmentGroup::empty)
            } else {
                UrlSegmentGroup::new(Vec::new(), children)
            };
            if groups.insert(outlet.clone(), group).is_some() {
                return Err(self.error(&format!("duplicate outlet '{}'", outlet)));
            }
            self.consume_optional("//");
        }
        Ok(groups)
    }

    fn parse_query_params(&mut self) -> Result<Params, UrlParseError> {
        let mut params = Params::new();
        if !self.consume_optional("?") {
            return Ok(params);
        }
        let end = self.remaining.find('#').unwrap_or(self.remaining.len());
        let query = &self.remaining[..end];
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            params.insert(decode(key, self)?, decode(value, self)?);
        }
        self.remaining = &self.remaining[end..];
        Ok(params)
    }

    fn parse_fragment(&mut self) -> Result<Option<String>, UrlParseError> {
        if !self.consume_optional("#") {
            return Ok(None);
        }
        let fragment = decode(self.remaining, self)?;
        self.remaining = "";
        Ok(Some(fragment))
    }
}
