//! Resolve the entry module graph into a single piece of code.
use std::future::Future;
use std::path::PathBuf;

use once_cell::sync::Lazy;

use crate::error::BundleError;
use crate::options::Target;

mod commonjs;
mod names;
mod swc;

pub use commonjs::lower_to_commonjs;
pub use names::ModuleNames;
pub use swc::SwcBundler;

/// Source map of the built-in entry.
pub const DEFAULT_ENTRY_MAP: &str =
    r#"{"version":3,"sources":["wasmc:default"],"names":[],"mappings":""}"#;

/// Entry used when none is given, exporting the module object.
pub const DEFAULT_ENTRY: &str = "export default Module;\n";

static DEFAULT_ENTRY_CJS: Lazy<String> =
    Lazy::new(|| DEFAULT_ENTRY.replacen("export default", "module.exports =", 1));

/// Node builtins never bundled for node targets.
pub const NODE_BUILTINS: &[&str] = &[
    "assert",
    "async_hooks",
    "base",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "dns",
    "domain",
    "events",
    "fs",
    "globals",
    "http",
    "http2",
    "https",
    "index",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "timers",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "worker_threads",
    "zlib",
];

#[derive(Debug, Clone)]
pub struct BundleRequest {
    pub entry: PathBuf,
    /// Module specifiers left as imports (or `require` calls).
    pub external_modules: Vec<String>,
    /// Produce ES module syntax instead of CommonJS.
    pub esmod: bool,
    /// Selects node or browser resolution of packages.
    pub target: Option<Target>,
    pub project_dir: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct BundleOutput {
    pub code: String,
    /// Source map of `code` as JSON.
    pub sourcemap: Option<String>,
    /// External modules the code imports.
    pub imported_names: Vec<String>,
    pub exported_names: Vec<String>,
}

/// Resolves and concatenates the module graph of an entry file.
pub trait EntryBundler {
    fn bundle(
        &self,
        request: BundleRequest,
    ) -> impl Future<Output = Result<BundleOutput, BundleError>>;
}

/// Output standing in for a missing entry file.
pub fn default_entry(esmod: bool) -> BundleOutput {
    let code = if esmod {
        DEFAULT_ENTRY.to_string()
    } else {
        DEFAULT_ENTRY_CJS.clone()
    };
    BundleOutput {
        code,
        sourcemap: Some(DEFAULT_ENTRY_MAP.to_string()),
        imported_names: vec![],
        exported_names: vec!["default".into()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_entry_per_format() {
        assert_eq!(default_entry(true).code, "export default Module;\n");
        assert_eq!(default_entry(false).code, "module.exports = Module;\n");
        let map = sourcemap::SourceMap::from_slice(
            default_entry(false).sourcemap.unwrap().as_bytes(),
        )
        .unwrap();
        assert_eq!(map.get_source(0), Some("wasmc:default"));
    }
}
