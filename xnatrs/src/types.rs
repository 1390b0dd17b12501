//! Primitive XNAT API data types and NewType-patterns.

use aliri_braid::braid;

/// A REST path on an XNAT server, e.g. `/data/archive/projects/P1`.
///
/// Paths are always rooted at `/` and never carry the server host; the
/// session prepends the server URL when a request is dispatched.
#[braid(serde)]
pub struct DataUri;

/// A qualified schema type identifier, e.g. `xnat:subjectData`.
///
/// Types generated for anonymous nested schema classes use the synthetic
/// `xnatpy:` prefix instead of the canonical `xnat:` namespace so they can
/// never collide with server-defined identifiers.
#[braid(serde)]
pub struct XsiType;

impl DataUri {
    /// Append a path segment, e.g. `/projects/P1` + `subjects`.
    pub fn child(&self, segment: &str) -> DataUri {
        DataUri::from(format!("{}/{}", self.as_str().trim_end_matches('/'), segment))
    }
}

impl XsiType {
    /// The namespace prefix of the identifier (`xnat` in `xnat:subjectData`).
    pub fn prefix(&self) -> Option<&str> {
        self.as_str().split_once(':').map(|(p, _)| p)
    }

    /// The local name of the identifier (`subjectData` in `xnat:subjectData`).
    pub fn local(&self) -> &str {
        self.as_str()
            .split_once(':')
            .map(|(_, l)| l)
            .unwrap_or_else(|| self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_does_not_double_slashes() {
        let uri = DataUri::from("/data/archive/projects/P1/");
        assert_eq!(uri.child("subjects").as_str(), "/data/archive/projects/P1/subjects");
    }

    #[test]
    fn xsi_type_parts() {
        let t = XsiType::from("xnat:subjectData");
        assert_eq!(t.prefix(), Some("xnat"));
        assert_eq!(t.local(), "subjectData");
    }
}
