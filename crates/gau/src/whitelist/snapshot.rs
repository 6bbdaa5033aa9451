use std::collections::HashMap;

use url::Url;

use super::error::WhitelistError;
use crate::credentials::host_identifier;

/// A destination remote that must end up with the source's branches and tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorTarget {
    url: String,
    host: Option<String>,
}

impl MirrorTarget {
    pub fn parse(raw: &str) -> Result<Self, url::ParseError> {
        let raw = raw.trim();
        let parsed = Url::parse(raw)?;
        Ok(Self {
            url: raw.to_string(),
            host: host_identifier(&parsed),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Host identifier used for credential lookup; `None` for local transports.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Name of the git remote registered for this target on the local mirror.
    ///
    /// `:` is not allowed in ref names, so `host:port` becomes `host_port`.
    pub fn remote_name(&self) -> String {
        match &self.host {
            Some(host) => host.replace(':', "_"),
            None => "local".to_string(),
        }
    }
}

/// Immutable whitelist snapshot: source URL to ordered mirror targets.
///
/// Membership governs permission; an entry with no targets is valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Whitelist {
    entries: HashMap<String, Vec<MirrorTarget>>,
}

impl Whitelist {
    /// Parses `{"<source url>": ["<target url>", ...], ...}`.
    ///
    /// Any malformed target rejects the whole document.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, WhitelistError> {
        let raw: HashMap<String, Vec<String>> = serde_json::from_slice(bytes)?;

        let mut entries = HashMap::with_capacity(raw.len());
        for (source, targets) in raw {
            let parsed = targets
                .iter()
                .map(|target| {
                    MirrorTarget::parse(target).map_err(|e| WhitelistError::InvalidTarget {
                        source_url: source.clone(),
                        target: target.clone(),
                        reason: e.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            entries.insert(source.trim().to_string(), parsed);
        }

        Ok(Self { entries })
    }

    pub fn contains(&self, source: &str) -> bool {
        self.entries.contains_key(source)
    }

    pub fn targets(&self, source: &str) -> Option<&[MirrorTarget]> {
        self.entries.get(source).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Vec<MirrorTarget>)> for Whitelist {
    fn from_iter<I: IntoIterator<Item = (String, Vec<MirrorTarget>)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
