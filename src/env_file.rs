// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Flat environment file layout.
//!
//! The secrets file consumed by the Overleaf container is a plain list of
//! `KEY=value` lines. Blank lines and lines starting with `#` are comments.
//! Values are taken verbatim, no quoting or escaping is interpreted.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

/// Ordered listing of environment variables.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnvFile {
    header: Option<String>,
    entries: Vec<(String, String)>,
}

impl EnvFile {
    /// Construct new empty environment file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach comment line to emit above all entries.
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    /// Set variable, replacing the value of an existing key in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Look up value of variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    /// Iterate over variables in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl Display for EnvFile {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        if let Some(header) = &self.header {
            writeln!(fmt, "# {header}")?;
        }

        for (key, value) in &self.entries {
            writeln!(fmt, "{key}={value}")?;
        }

        Ok(())
    }
}

impl FromStr for EnvFile {
    type Err = EnvFileError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut env = EnvFile::new();
        for (index, line) in data.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = line
                .split_once('=')
                .filter(|(key, _)| !key.trim().is_empty())
                .ok_or_else(|| EnvFileError::MalformedLine {
                    line: index + 1,
                    content: line.to_owned(),
                })?;
            env.set(key.trim(), value);
        }

        Ok(env)
    }
}

/// Environment file error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvFileError {
    /// Line is neither a comment nor a `KEY=value` pair.
    #[error("malformed line {line}: {content:?}")]
    MalformedLine { line: usize, content: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn render_with_header() {
        let mut env = EnvFile::new().with_header("generated by leafup");
        env.set("REDIS_HOST", "redis");
        env.set("REDIS_PORT", "6379");
        env.set("REDIS_HOST", "cache");

        let expect = indoc! {r#"
            # generated by leafup
            REDIS_HOST=cache
            REDIS_PORT=6379
        "#};
        assert_eq!(env.to_string(), expect);
    }

    #[test]
    fn parse_skips_comments_and_blanks() -> anyhow::Result<()> {
        let env: EnvFile = indoc! {r#"
            # leading comment

            OVERLEAF_MONGO_URL=mongodb://mongo/sharelatex?replicaSet=overleaf
            OVERLEAF_APP_NAME=Overleaf Community Edition
              OVERLEAF_REDIS_PORT=6379
        "#}
        .parse()?;

        assert_eq!(
            env.get("OVERLEAF_MONGO_URL"),
            Some("mongodb://mongo/sharelatex?replicaSet=overleaf")
        );
        assert_eq!(env.get("OVERLEAF_APP_NAME"), Some("Overleaf Community Edition"));
        assert_eq!(env.get("OVERLEAF_REDIS_PORT"), Some("6379"));
        assert_eq!(env.iter().count(), 3);

        Ok(())
    }

    #[test]
    fn parse_rejects_lines_without_key() {
        let result = "GOOD=1\n=oops\n".parse::<EnvFile>();
        assert_eq!(
            result,
            Err(EnvFileError::MalformedLine {
                line: 2,
                content: "=oops".into()
            })
        );

        assert!("just words".parse::<EnvFile>().is_err());
    }
}
