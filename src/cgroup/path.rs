use std::fmt;

use crate::cgroup::fs::has_glob;

/// Location of a cgroup inside one cgroup filesystem: the mount point of
/// the hierarchy plus the relative path, kept as individual segments so
/// that ascending and per-segment pattern matching stay cheap.
///
/// An empty segment list denotes the root cgroup itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CgroupPath {
    cgroup_fs: String,
    segments: Vec<String>,
}

impl CgroupPath {
    pub fn new(cgroup_fs: &str, relative: &str) -> Self {
        let mut fs = cgroup_fs.to_string();
        while fs.len() > 1 && fs.ends_with('/') {
            fs.pop();
        }

        let segments = relative
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            cgroup_fs: fs,
            segments,
        }
    }

    pub fn cgroup_fs(&self) -> &str {
        &self.cgroup_fs
    }

    pub fn absolute(&self) -> String {
        if self.segments.is_empty() {
            return self.cgroup_fs.clone();
        }
        format!("{}/{}", self.cgroup_fs, self.segments.join("/"))
    }

    pub fn relative(&self) -> String {
        self.segments.join("/")
    }

    /// Last path segment, empty for the root cgroup.
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn ascend(&mut self) {
        self.segments.pop();
    }

    pub fn parent(&self) -> CgroupPath {
        let mut p = self.clone();
        p.ascend();
        p
    }

    pub fn descend(&mut self, relative: &str) {
        self.segments
            .extend(relative.split('/').filter(|s| !s.is_empty()).map(str::to_string));
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether any segment carries glob metacharacters.
    pub fn has_glob(&self) -> bool {
        self.segments.iter().any(|s| has_glob(s))
    }

    /// Longest leading run of glob-free segments. For "workload/*" this is
    /// "workload"; for a fully literal path it is the path itself.
    pub fn glob_free_prefix(&self) -> CgroupPath {
        let mut prefix = Vec::new();
        for seg in &self.segments {
            if has_glob(seg) {
                break;
            }
            prefix.push(seg.clone());
        }
        CgroupPath {
            cgroup_fs: self.cgroup_fs.clone(),
            segments: prefix,
        }
    }

    /// Shell-style match of this (literal) path against a wildcarded
    /// pattern path. Matching is per segment; the paths must be rooted in
    /// the same hierarchy and have the same depth.
    pub fn matches_pattern(&self, pattern: &CgroupPath) -> bool {
        if self.cgroup_fs != pattern.cgroup_fs
            || self.segments.len() != pattern.segments.len()
        {
            return false;
        }

        self.segments
            .iter()
            .zip(pattern.segments.iter())
            .all(|(seg, pat)| match glob::Pattern::new(pat) {
                Ok(p) => p.matches(seg),
                Err(_) => seg == pat,
            })
    }
}

impl fmt::Display for CgroupPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.relative())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn renders_absolute_and_relative() {
        let path = CgroupPath::new("/sys/fs/cgroup", "system.slice/chef.service");
        assert_eq!(path.cgroup_fs(), "/sys/fs/cgroup");
        assert_eq!(path.relative(), "system.slice/chef.service");
        assert_eq!(path.absolute(), "/sys/fs/cgroup/system.slice/chef.service");
        assert_eq!(path.name(), "chef.service");
    }

    #[test]
    fn strips_trailing_slash_and_empty_segments() {
        let a = CgroupPath::new("/sys/fs/cgroup/", "a//b/");
        let b = CgroupPath::new("/sys/fs/cgroup", "a/b");
        assert_eq!(a, b);
    }

    #[test]
    fn root_cgroup_ascends_to_itself() {
        let mut path = CgroupPath::new("/sys/fs/cgroup", "workload");
        assert!(!path.is_root());
        path.ascend();
        assert!(path.is_root());
        assert_eq!(path.absolute(), "/sys/fs/cgroup");
        path.ascend();
        assert!(path.is_root());
    }

    #[test]
    fn hashes_by_full_path() {
        let mut set = HashSet::new();
        set.insert(CgroupPath::new("/sys/fs/cgroup", "a/b"));
        set.insert(CgroupPath::new("/sys/fs/cgroup/", "a/b"));
        set.insert(CgroupPath::new("/sys/fs/cgroup", "a/c"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn matches_wildcard_patterns_per_segment() {
        let pattern = CgroupPath::new("/", "some/*/cgroup/path/*");
        assert!(CgroupPath::new("/", "some/made_up/cgroup/path/here").matches_pattern(&pattern));
        assert!(CgroupPath::new("/", "some/other/cgroup/path/here").matches_pattern(&pattern));
        assert!(!CgroupPath::new("/", "notavalidcgrouppath/here").matches_pattern(&pattern));
        assert!(!CgroupPath::new("/", "some/made_up/cgroup/path").matches_pattern(&pattern));
    }

    #[test]
    fn glob_free_prefix_stops_at_first_wildcard() {
        let p = CgroupPath::new("/sys/fs/cgroup", "workload.slice/*/task");
        assert_eq!(p.glob_free_prefix().relative(), "workload.slice");
        let literal = CgroupPath::new("/sys/fs/cgroup", "workload.slice/web");
        assert_eq!(literal.glob_free_prefix(), literal);
    }
}
