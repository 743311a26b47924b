use crate::error::ConfigError;
use crate::utils::constants::PATH_SEPARATOR;

/// Structured view of a protected request path: `<prefix><org>/<channel>/<event_id>/<suffix>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPath {
    pub org: String,
    pub channel: String,
    pub event_id: String,
    pub suffix: String,
}

impl ParsedPath {
    /// Tokens are issued per event.
    pub fn resource_id(&self) -> &str {
        &self.event_id
    }
}

/// Ordered list of path prefixes, validated once at construction.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    prefixes: Vec<String>,
}

impl PathMatcher {
    pub fn new<I, S>(prefixes: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prefixes: Vec<String> = prefixes.into_iter().map(Into::into).collect();
        if let Some(bad) = prefixes.iter().find(|p| !is_valid_prefix(p)) {
            return Err(ConfigError::InvalidPrefix(bad.to_owned()));
        }
        Ok(Self { prefixes })
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// First configured prefix wins. `None` leaves the request untouched.
    pub fn match_path(&self, path: &str) -> Option<ParsedPath> {
        let rest = self
            .prefixes
            .iter()
            .find_map(|prefix| path.strip_prefix(prefix.as_str()))?;

        let mut segments = rest.splitn(4, PATH_SEPARATOR);
        let org = segments.next()?;
        let channel = segments.next()?;
        let event_id = segments.next()?;
        let suffix = segments.next().unwrap_or_default();

        Some(ParsedPath {
            org: org.to_owned(),
            channel: channel.to_owned(),
            event_id: event_id.to_owned(),
            suffix: suffix.to_owned(),
        })
    }
}

pub fn is_valid_prefix(prefix: &str) -> bool {
    prefix.starts_with(PATH_SEPARATOR) && prefix.ends_with(PATH_SEPARATOR)
}
