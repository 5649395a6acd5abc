//! Maps page URLs to the domain their time is attributed to.

use std::{fmt::Display, ops::Deref, sync::Arc};

use serde::{Deserialize, Serialize};
use url::Url;

/// Values older front-ends wrote in place of a missing domain. They are never tracked.
const SENTINELS: [&str; 2] = ["null", "undefined"];

/// A normalized tracked domain, for example `leetcode.com`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Domain(Arc<str>);

impl Domain {
    /// Wraps an already normalized value. Sentinel strings are rejected.
    pub fn new(value: impl Into<Arc<str>>) -> Option<Self> {
        let value = value.into();
        if value.is_empty() || is_sentinel(&value) {
            None
        } else {
            Some(Self(value))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for Domain {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn is_sentinel(value: &str) -> bool {
    SENTINELS.contains(&value)
}

/// Resolves a URL to the domain it should be tracked under. Only http(s) pages are tracked and a
/// single leading `www.` label is dropped, so `https://www.leetcode.com/problems/x` and
/// `https://leetcode.com/problems/x` land in the same bucket.
pub fn resolve(url: &str) -> Option<Domain> {
    let url = Url::parse(url).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    Domain::new(host)
}
