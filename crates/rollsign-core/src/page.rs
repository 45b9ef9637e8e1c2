//! Public roster page.
//!
//! A small placeholder language over a text template:
//!
//! - `{{publicKey}}` anywhere
//! - `{{#users}} ... {{/users}}` repeats its body once per roster entry
//! - `{{code}}`, `{{name}}`, `{{role}}`, `{{image}}` inside that section
//!
//! Substituted values are HTML-escaped. The page carries no signatures;
//! it exists so people can cross-check scanned codes against the key.

use std::path::PathBuf;

use tracing::debug;

use crate::error::{IssueError, Result};
use crate::fsio::{self, Visibility};
use crate::roster::{Identity, Roster};

/// Template used when none is configured.
pub const DEFAULT_TEMPLATE: &str = include_str!("../templates/index.html.tmpl");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Code,
    Name,
    Role,
    Image,
}

impl Field {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "code" => Some(Self::Code),
            "name" => Some(Self::Name),
            "role" => Some(Self::Role),
            "image" => Some(Self::Image),
            _ => None,
        }
    }

    fn value(self, user: &Identity) -> &str {
        match self {
            Self::Code => &user.code,
            Self::Name => &user.name,
            Self::Role => &user.role,
            Self::Image => &user.image,
        }
    }
}

/// Inside a `{{#users}}` section.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    PublicKey,
    Field(Field),
}

/// Top level of the template.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    PublicKey,
    Users(Vec<Segment>),
}

/// A parsed page template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    /// Parse template source.
    ///
    /// # Errors
    ///
    /// `IssueError::Template` for unknown placeholders, user fields outside
    /// the users section, nested or unbalanced sections, or an
    /// unterminated `{{`.
    pub fn parse(source: &str) -> Result<Self> {
        let mut nodes = Vec::new();
        let mut section: Option<Vec<Segment>> = None;
        let mut rest = source;

        while let Some(start) = rest.find("{{") {
            let offset = source.len() - rest.len() + start;
            let text = &rest[..start];
            if !text.is_empty() {
                match section.as_mut() {
                    Some(body) => body.push(Segment::Text(text.to_string())),
                    None => nodes.push(Node::Text(text.to_string())),
                }
            }

            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or_else(|| {
                IssueError::Template(format!("unterminated placeholder at byte {offset}"))
            })?;
            let tag = after[..end].trim();
            rest = &after[end + 2..];

            match tag {
                "publicKey" => match section.as_mut() {
                    Some(body) => body.push(Segment::PublicKey),
                    None => nodes.push(Node::PublicKey),
                },
                "#users" => {
                    if section.is_some() {
                        return Err(IssueError::Template(format!(
                            "nested {{{{#users}}}} at byte {offset}"
                        )));
                    }
                    section = Some(Vec::new());
                }
                "/users" => {
                    let body = section.take().ok_or_else(|| {
                        IssueError::Template(format!(
                            "{{{{/users}}}} without opening section at byte {offset}"
                        ))
                    })?;
                    nodes.push(Node::Users(body));
                }
                other => {
                    let field = Field::from_tag(other).ok_or_else(|| {
                        IssueError::Template(format!(
                            "unknown placeholder {{{{{other}}}}} at byte {offset}"
                        ))
                    })?;
                    let body = section.as_mut().ok_or_else(|| {
                        IssueError::Template(format!(
                            "{{{{{other}}}}} used outside {{{{#users}}}} at byte {offset}"
                        ))
                    })?;
                    body.push(Segment::Field(field));
                }
            }
        }

        if section.is_some() {
            return Err(IssueError::Template("unclosed {{#users}} section".into()));
        }
        if !rest.is_empty() {
            nodes.push(Node::Text(rest.to_string()));
        }
        Ok(Self { nodes })
    }

    /// Substitute a roster into the template.
    ///
    /// # Errors
    ///
    /// `IssueError::Template` if the template needs a public key and the
    /// roster has none.
    pub fn render(&self, roster: &Roster) -> Result<String> {
        let public_key = || {
            roster
                .public_key
                .map(|k| k.to_hex())
                .ok_or_else(|| IssueError::Template("roster has no public key to render".into()))
        };

        let mut out = String::new();
        for node in &self.nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::PublicKey => out.push_str(&public_key()?),
                Node::Users(body) => {
                    for user in &roster.users {
                        for segment in body {
                            match segment {
                                Segment::Text(text) => out.push_str(text),
                                Segment::PublicKey => out.push_str(&public_key()?),
                                Segment::Field(field) => escape_html(field.value(user), &mut out),
                            }
                        }
                    }
                }
            }
        }
        Ok(out)
    }
}

fn escape_html(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
}

/// Renders the roster page to disk.
#[derive(Debug, Clone)]
pub struct PagePublisher {
    template: Option<PathBuf>,
    output: PathBuf,
}

impl PagePublisher {
    /// Publisher reading `template` (or the built-in one) and writing `output`.
    pub fn new(template: Option<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            template,
            output: output.into(),
        }
    }

    fn load_template(&self) -> Result<Template> {
        match &self.template {
            Some(path) => Template::parse(&fsio::read_to_string(path)?),
            None => Template::parse(DEFAULT_TEMPLATE),
        }
    }

    /// Render the page without writing it.
    pub fn render(&self, roster: &Roster) -> Result<String> {
        self.load_template()?.render(roster)
    }

    /// Render and atomically write the page.
    pub fn publish(&self, roster: &Roster) -> Result<PathBuf> {
        let page = self.render(roster)?;
        fsio::write_atomic(&self.output, page.as_bytes(), Visibility::Public)?;
        debug!(path = %self.output.display(), users = roster.users.len(), "wrote roster page");
        Ok(self.output.clone())
    }
}
