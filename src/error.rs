//! Errors raised while packaging a module.
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Position of a failure inside one of the source fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePosition {
    /// File name of the fragment, relative to the project directory
    /// when the file lives inside it.
    pub file: String,
    /// One-based line number.
    pub line: usize,
    /// Zero-based column.
    pub col: usize,
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

/// Entry resolution failure reported by the bundler.
#[derive(Debug, Clone, Error)]
#[error("{}", render_bundle_error(.position.as_ref(), .message, .frame.as_deref()))]
pub struct BundleError {
    pub position: Option<SourcePosition>,
    pub message: String,
    /// Excerpt of the offending source with a marker under the column.
    pub frame: Option<String>,
}

impl BundleError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            position: None,
            message: message.into(),
            frame: None,
        }
    }

    pub fn at(mut self, position: SourcePosition) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_frame(mut self, frame: String) -> Self {
        self.frame = Some(frame);
        self
    }

    /// Rewrite an absolute file name relative to `project_dir`.
    pub fn relative_to(mut self, project_dir: &Path) -> Self {
        if let Some(pos) = self.position.as_mut() {
            pos.file = relative_file_name(&pos.file, project_dir);
        }
        self
    }
}

fn render_bundle_error(
    position: Option<&SourcePosition>,
    message: &str,
    frame: Option<&str>,
) -> String {
    let mut msg = match position {
        Some(pos) => format!("{}: {}", pos, message),
        None => message.to_string(),
    };
    if let Some(frame) = frame {
        msg.push('\n');
        msg.push_str(frame);
    }
    msg
}

/// All the ways a packaging run can fail.
///
/// Every variant aborts the pipeline, nothing is retried or downgraded.
#[derive(Debug, Error)]
pub enum PackageError {
    /// Invalid flag combination or out of range option.
    #[error("config: {0}")]
    Config(String),

    #[error(transparent)]
    Bundle(#[from] BundleError),

    /// A fragment failed to parse.
    #[error("{position}: {message}")]
    Parse {
        position: SourcePosition,
        message: String,
    },

    /// Expected compiler output shape was not found.
    #[error("patch: {0}")]
    Patch(String),

    /// The minifier or code generator failed.
    #[error("minify: {0}")]
    Minify(String),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PackageError {
    pub(crate) fn io<P: AsRef<Path>>(path: P, source: std::io::Error) -> Self {
        PackageError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn minify<E: fmt::Display>(err: E) -> Self {
        PackageError::Minify(err.to_string())
    }

    /// Position of the failure, if the error has one.
    pub fn position(&self) -> Option<&SourcePosition> {
        match self {
            PackageError::Parse { position, .. } => Some(position),
            PackageError::Bundle(err) => err.position.as_ref(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PackageError>;

/// Name `file` relative to `project_dir` unless it lies outside of it.
pub fn relative_file_name(file: &str, project_dir: &Path) -> String {
    let path = Path::new(file);
    if path.is_absolute() {
        if let Ok(rel) = path.strip_prefix(project_dir) {
            return rel.display().to_string();
        }
    }
    file.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_error_message_includes_position_and_frame() {
        let err = BundleError::new("Unexpected token")
            .at(SourcePosition {
                file: "/work/app/src/main.js".into(),
                line: 3,
                col: 7,
            })
            .with_frame("3 | let = 1\n  |     ^".into())
            .relative_to(Path::new("/work/app"));
        assert_eq!(
            err.to_string(),
            "src/main.js:3:7: Unexpected token\n3 | let = 1\n  |     ^"
        );
    }

    #[test]
    fn files_outside_project_keep_absolute_path() {
        assert_eq!(
            relative_file_name("/usr/lib/node/x.js", Path::new("/work/app")),
            "/usr/lib/node/x.js"
        );
        assert_eq!(
            relative_file_name("lib/x.js", Path::new("/work/app")),
            "lib/x.js"
        );
    }
}
