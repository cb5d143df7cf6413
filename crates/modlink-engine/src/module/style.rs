//! Stylesheet handles
//!
//! Style resources are only checked for well-formedness and kept as an opaque
//! rule tree. Nothing here applies styles.

use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while parsing a stylesheet
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StyleError {
    #[error("unterminated comment starting on line {line}")]
    UnterminatedComment { line: usize },

    #[error("unbalanced brace on line {line}")]
    UnbalancedBrace { line: usize },

    #[error("malformed declaration {text:?} on line {line}")]
    MalformedDeclaration { line: usize, text: String },
}

/// One rule: a selector (or at-rule prelude) with its declarations and nested rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleRule {
    pub selector: String,
    pub declarations: Vec<(String, String)>,
    pub children: Vec<StyleRule>,
}

impl StyleRule {
    /// Value of a declared property
    pub fn property(&self, name: &str) -> Option<&str> {
        self.declarations
            .iter()
            .rev()
            .find(|(prop, _)| prop == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Parsed stylesheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleSheet {
    href: Arc<str>,
    rules: Vec<StyleRule>,
}

impl StyleSheet {
    /// Parse stylesheet text loaded from `href`
    pub fn parse(href: &str, text: &str) -> Result<Self, StyleError> {
        let stripped = strip_comments(text)?;
        let mut parser = RuleParser {
            chars: stripped.chars().collect(),
            pos: 0,
        };
        // Top-level declarations are rejected while parsing
        let (_, rules) = parser.parse_items(false)?;
        Ok(Self {
            href: Arc::from(href),
            rules,
        })
    }

    /// Location the sheet was loaded from
    pub fn href(&self) -> &str {
        &self.href
    }

    /// Top-level rules in source order
    pub fn rules(&self) -> &[StyleRule] {
        &self.rules
    }

    /// Number of rules, nested ones included
    pub fn rule_count(&self) -> usize {
        fn count(rules: &[StyleRule]) -> usize {
            rules.iter().map(|r| 1 + count(&r.children)).sum()
        }
        count(&self.rules)
    }

    /// First top-level rule with the given selector
    pub fn find(&self, selector: &str) -> Option<&StyleRule> {
        self.rules.iter().find(|r| r.selector == selector)
    }
}

/// Blank out `/* */` comments, keeping newlines so line numbers stay accurate
fn strip_comments(text: &str) -> Result<String, StyleError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut line = 1;
    while let Some(start) = rest.find("/*") {
        let before = &rest[..start];
        line += before.matches('\n').count();
        out.push_str(before);
        let after = &rest[start + 2..];
        let end = after
            .find("*/")
            .ok_or(StyleError::UnterminatedComment { line })?;
        let comment = &after[..end];
        let newlines = comment.matches('\n').count();
        line += newlines;
        out.push(' ');
        out.extend(std::iter::repeat('\n').take(newlines));
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

struct RuleParser {
    chars: Vec<char>,
    pos: usize,
}

type Items = (Vec<(String, String)>, Vec<StyleRule>);

impl RuleParser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn line(&self) -> usize {
        1 + self.chars[..self.pos.min(self.chars.len())]
            .iter()
            .filter(|c| **c == '\n')
            .count()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    /// Read up to the next structural character, skipping quoted strings
    fn read_prelude(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            match c {
                '{' | ';' | '}' => break,
                '"' | '\'' => {
                    self.pos += 1;
                    while let Some(inner) = self.peek() {
                        self.pos += 1;
                        if inner == c {
                            break;
                        }
                    }
                }
                _ => self.pos += 1,
            }
        }
        self.chars[start..self.pos].iter().collect::<String>().trim().to_string()
    }

    fn parse_items(&mut self, nested: bool) -> Result<Items, StyleError> {
        let mut declarations = Vec::new();
        let mut rules = Vec::new();

        loop {
            self.skip_whitespace();
            match self.peek() {
                None if nested => return Err(StyleError::UnbalancedBrace { line: self.line() }),
                None => return Ok((declarations, rules)),
                Some('}') if nested => {
                    self.pos += 1;
                    return Ok((declarations, rules));
                }
                Some('}') => return Err(StyleError::UnbalancedBrace { line: self.line() }),
                Some(';') => {
                    self.pos += 1;
                    continue;
                }
                Some(_) => {}
            }

            let line = self.line();
            let prelude = self.read_prelude();

            if self.peek() == Some('{') {
                self.pos += 1;
                let (child_declarations, children) = self.parse_items(true)?;
                rules.push(StyleRule {
                    selector: prelude,
                    declarations: child_declarations,
                    children,
                });
                continue;
            }

            if self.peek() == Some(';') {
                self.pos += 1;
            }

            // Statement at-rules (`@import url(x);`) carry no block
            if prelude.starts_with('@') {
                rules.push(StyleRule {
                    selector: prelude,
                    declarations: Vec::new(),
                    children: Vec::new(),
                });
                continue;
            }

            let (name, value) = prelude
                .split_once(':')
                .map(|(n, v)| (n.trim(), v.trim()))
                .filter(|(n, v)| !n.is_empty() && !v.is_empty() && nested)
                .ok_or_else(|| StyleError::MalformedDeclaration {
                    line,
                    text: prelude.clone(),
                })?;
            declarations.push((name.to_string(), value.to_string()));
        }
    }
}
