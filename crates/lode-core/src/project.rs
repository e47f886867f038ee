use std::path::PathBuf;

/// Identifies one compilation unit group, e.g. a build target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectPartId(String);

impl ProjectPartId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProjectPartId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<T: Into<String>> From<T> for ProjectPartId {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

/// One compilation unit group: compile settings plus the files built with them.
///
/// Immutable once submitted to the indexer. Tasks reference a part via
/// `Arc<ProjectPart>`; they never own it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPart {
    pub id: ProjectPartId,
    pub compiler_flags: Vec<String>,
    pub defines: Vec<(String, String)>,
    pub include_paths: Vec<PathBuf>,
    pub files: Vec<PathBuf>,
}

impl ProjectPart {
    pub fn new(id: impl Into<ProjectPartId>) -> Self {
        Self {
            id: id.into(),
            compiler_flags: Vec::new(),
            defines: Vec::new(),
            include_paths: Vec::new(),
            files: Vec::new(),
        }
    }

    pub fn with_files(mut self, files: impl IntoIterator<Item = PathBuf>) -> Self {
        self.files.extend(files);
        self
    }

    pub fn with_compiler_flags<S: Into<String>>(
        mut self,
        flags: impl IntoIterator<Item = S>,
    ) -> Self {
        self.compiler_flags.extend(flags.into_iter().map(Into::into));
        self
    }
}
