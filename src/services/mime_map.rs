//! Allow-list of upload content types.

use std::collections::HashSet;

/// Set of accepted content-type strings.
///
/// Matching is exact and case-sensitive. The rendering order of [`MimeMap::list`]
/// follows the underlying hash set and is not stable.
#[derive(Clone, Debug, Default)]
pub struct MimeMap {
    allowed: HashSet<String>,
}

impl MimeMap {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    pub fn valid(&self, candidate: &str) -> bool {
        self.allowed.contains(candidate)
    }

    /// Comma-separated rendering for error messages.
    pub fn list(&self) -> String {
        self.allowed
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_only_exact_members() {
        let mime = MimeMap::new(["image/png", "image/jpeg"]);

        assert!(mime.valid("image/png"));
        assert!(mime.valid("image/jpeg"));
        assert!(!mime.valid("image/gif"));
        assert!(!mime.valid("IMAGE/PNG"));
        assert!(!mime.valid("image/png; charset=binary"));
        assert!(!mime.valid(""));
    }

    #[test]
    fn empty_allow_list_rejects_everything() {
        let mime = MimeMap::new(Vec::<String>::new());

        assert!(!mime.valid("image/png"));
        assert_eq!(mime.list(), "");
    }

    #[test]
    fn list_contains_every_member_once() {
        let mime = MimeMap::new(["image/png", "image/jpeg", "image/gif", "image/png"]);

        let mut rendered: Vec<_> = mime.list().split(", ").map(str::to_owned).collect();
        rendered.sort();
        assert_eq!(rendered, ["image/gif", "image/jpeg", "image/png"]);
    }
}
