//! Parameter scanner - finds `@name` and `?` placeholders in SQL text

use std::{fmt::Display, iter::Peekable, str::Chars};

use crate::error::{Error, Result};

/// A parameter placeholder found in SQL text
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ParamKey {
    /// `@name`
    Named(String),
    /// The n-th `?` in text order, counted from 1
    Positional(usize),
}

impl ParamKey {
    /// Builds a named key, with or without the leading `@`
    pub fn named(name: &str) -> Self {
        ParamKey::Named(name.strip_prefix('@').unwrap_or(name).to_string())
    }
}

impl Display for ParamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamKey::Named(name) => write!(f, "@{}", name),
            ParamKey::Positional(position) => write!(f, "?{}", position),
        }
    }
}

/// Scans SQL text for parameter placeholders
///
/// String literals, quoted identifiers and comments are skipped, so a `?` or
/// `@` inside them is not a placeholder.
pub struct ParamScanner<'a> {
    iter: Peekable<Chars<'a>>,
    positional: usize,
}

impl<'a> Iterator for ParamScanner<'a> {
    type Item = Result<ParamKey>;

    fn next(&mut self) -> Option<Self::Item> {
        self.scan().transpose()
    }
}

impl<'a> ParamScanner<'a> {
    pub fn new(sql: &'a str) -> Self {
        Self {
            iter: sql.chars().peekable(),
            positional: 0,
        }
    }

    /// Consumes the next character if it satisfies the predicate
    fn next_if<F: Fn(char) -> bool>(&mut self, predicate: F) -> Option<char> {
        self.iter.peek().filter(|&c| predicate(*c))?;
        self.iter.next()
    }

    /// Consumes consecutive characters while they satisfy the predicate
    fn next_while<F: Fn(char) -> bool>(&mut self, predicate: F) -> Option<String> {
        let mut value = String::new();
        while let Some(c) = self.next_if(&predicate) {
            value.push(c);
        }
        Some(value).filter(|v| !v.is_empty())
    }

    /// Scans up to and including the next placeholder
    fn scan(&mut self) -> Result<Option<ParamKey>> {
        while let Some(c) = self.iter.next() {
            match c {
                '\'' | '"' | '`' => self.skip_quoted(c)?,
                '-' if self.next_if(|c| c == '-').is_some() => self.skip_line(),
                '#' => self.skip_line(),
                '/' if self.next_if(|c| c == '*').is_some() => self.skip_block()?,
                '?' => {
                    self.positional += 1;
                    return Ok(Some(ParamKey::Positional(self.positional)));
                }
                '@' if self.next_if(|c| c == '{').is_some() => self.skip_hint()?,
                '@' => return self.scan_name().map(Some),
                _ => {}
            }
        }
        Ok(None)
    }

    fn scan_name(&mut self) -> Result<ParamKey> {
        match self.next_while(|c| c.is_alphanumeric() || c == '_') {
            Some(name) if !name.starts_with(|c: char| c.is_ascii_digit()) => {
                Ok(ParamKey::Named(name))
            }
            Some(name) => Err(Error::Construction(format!(
                "invalid parameter name @{}",
                name
            ))),
            None => Err(Error::Construction(
                "expected a parameter name after @".to_string(),
            )),
        }
    }

    /// Skips a quoted literal or identifier, the opening quote already consumed
    ///
    /// `'''` and `"""` open a triple-quoted literal closed by the same three
    /// quotes; `''` is an empty literal.
    fn skip_quoted(&mut self, quote: char) -> Result<()> {
        if quote != '`' && self.next_if(|c| c == quote).is_some() {
            if self.next_if(|c| c == quote).is_none() {
                return Ok(());
            }
            return self.skip_triple_quoted(quote);
        }
        loop {
            match self.iter.next() {
                Some('\\') => {
                    self.iter.next();
                }
                Some(c) if c == quote => return Ok(()),
                Some(_) => {}
                None => {
                    return Err(Error::Construction(format!(
                        "unterminated {}-quoted literal",
                        quote
                    )));
                }
            }
        }
    }

    fn skip_triple_quoted(&mut self, quote: char) -> Result<()> {
        while let Some(c) = self.iter.next() {
            match c {
                '\\' => {
                    self.iter.next();
                }
                c if c == quote
                    && self.next_if(|c| c == quote).is_some()
                    && self.next_if(|c| c == quote).is_some() =>
                {
                    return Ok(());
                }
                _ => {}
            }
        }
        Err(Error::Construction(format!(
            "unterminated {0}{0}{0}-quoted literal",
            quote
        )))
    }

    /// Skips a `@{...}` hint, the `@{` already consumed
    fn skip_hint(&mut self) -> Result<()> {
        let mut depth = 1;
        while let Some(c) = self.iter.next() {
            match c {
                '\'' | '"' | '`' => self.skip_quoted(c)?,
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        Err(Error::Construction("unterminated @{ hint".to_string()))
    }

    fn skip_line(&mut self) {
        self.next_while(|c| c != '\n');
    }

    fn skip_block(&mut self) -> Result<()> {
        while let Some(c) = self.iter.next() {
            if c == '*' && self.next_if(|c| c == '/').is_some() {
                return Ok(());
            }
        }
        Err(Error::Construction("unterminated block comment".to_string()))
    }
}
