//! Packaging options and their normalization.
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PackageError, Result};

pub const DEFAULT_ECMA: u8 = 8;

/// Map of compile time constants, `-D<name>[=<val>]`.
pub type GlobalDefs = IndexMap<String, Value>;

/// Deployment environment that selects a fixed set of global defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    #[serde(rename = "node")]
    Node,
    #[serde(rename = "node-legacy")]
    NodeLegacy,
    #[serde(rename = "web")]
    Web,
    #[serde(rename = "worker")]
    Worker,
}

impl Target {
    pub fn is_node_like(&self) -> bool {
        matches!(self, Target::Node | Target::NodeLegacy)
    }

    /// The constants implied by this target.
    pub fn defines(&self) -> [(&'static str, bool); 6] {
        let (node, web, worker) = match self {
            Target::Node | Target::NodeLegacy => (true, false, false),
            Target::Web => (false, true, false),
            Target::Worker => (false, false, true),
        };
        [
            ("WASMC_IS_NODEJS_LIKE", node),
            ("ENVIRONMENT_IS_WEB", web),
            ("ENVIRONMENT_IS_WORKER", worker),
            ("ENVIRONMENT_IS_NODE", node),
            ("ENVIRONMENT_HAS_NODE", node),
            ("ENVIRONMENT_IS_SHELL", false),
        ]
    }
}

impl FromStr for Target {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "node" => Ok(Target::Node),
            "node-legacy" => Ok(Target::NodeLegacy),
            "web" => Ok(Target::Web),
            "worker" => Ok(Target::Worker),
            _ => Err(PackageError::Config(format!(
                "invalid target {:?} (expected node, node-legacy, web or worker)",
                s
            ))),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Target::Node => "node",
            Target::NodeLegacy => "node-legacy",
            Target::Web => "web",
            Target::Worker => "worker",
        };
        f.write_str(name)
    }
}

/// Options for a packaging run.
///
/// Build with [`PackageOptions::new`] or deserialize from JSON, then
/// call [`PackageOptions::normalize`] before use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageOptions {
    /// JS file generated by emcc.
    pub emccfile: PathBuf,
    /// User supplied entry point.
    pub jsentryfile: Option<PathBuf>,
    /// Output JS file, defaults to `emccfile`.
    pub outfile: Option<PathBuf>,
    pub projectdir: Option<PathBuf>,
    /// Module name, defaults to the basename of `outfile`.
    pub modname: Option<String>,
    /// Custom name of the wasm file referenced by the emcc output.
    pub wasmfile: Option<String>,
    pub global_defs: GlobalDefs,
    /// Raw target name, validated by `normalize`.
    pub target: Option<String>,
    pub debug: bool,
    pub pretty: bool,
    /// ES version in `[5, 8]`. Zero selects the default.
    pub ecma: u8,
    pub esmod: bool,
    pub embed: bool,
    pub syncinit: bool,
    pub inline_sourcemap: bool,
    pub sourcemap_file: Option<String>,
    pub nosourcemap: bool,
    pub noconsole: bool,
    pub nostdout: bool,
    pub nostderr: bool,
    /// Strip `getOwnPropertyDescriptor(Module, ...)` export probes.
    pub strip_capability_probes: bool,
}

impl Default for PackageOptions {
    fn default() -> Self {
        Self {
            emccfile: PathBuf::new(),
            jsentryfile: None,
            outfile: None,
            projectdir: None,
            modname: None,
            wasmfile: None,
            global_defs: Default::default(),
            target: None,
            debug: false,
            pretty: false,
            ecma: 0,
            esmod: false,
            embed: false,
            syncinit: false,
            inline_sourcemap: false,
            sourcemap_file: None,
            nosourcemap: false,
            noconsole: false,
            nostdout: false,
            nostderr: false,
            strip_capability_probes: true,
        }
    }
}

impl PackageOptions {
    pub fn new<P: AsRef<Path>>(emccfile: P) -> Self {
        Self {
            emccfile: emccfile.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Validate the options and merge in the defaults.
    ///
    /// Runs before any file is touched so configuration mistakes are
    /// reported without side effects.
    pub fn normalize(self) -> Result<Options> {
        let ecma = if self.ecma == 0 { DEFAULT_ECMA } else { self.ecma };
        if !(5..=8).contains(&ecma) {
            return Err(PackageError::Config(format!(
                "ecma requires a number in the range [5-8], got {}",
                ecma
            )));
        }

        if self.embed && self.wasmfile.is_some() {
            return Err(PackageError::Config(
                "both embed and wasm were provided, pick one".into(),
            ));
        }

        let target = self.target.as_deref().map(Target::from_str).transpose()?;

        if self.emccfile.as_os_str().is_empty() {
            return Err(PackageError::Config("missing emcc output file".into()));
        }

        let mut global_defs = self.global_defs;
        for name in global_defs.keys() {
            if !is_identifier(name) {
                return Err(PackageError::Config(format!(
                    "global define {:?} is not a valid identifier",
                    name
                )));
            }
        }
        if !global_defs.contains_key("DEBUG") {
            global_defs.insert("DEBUG".into(), Value::Bool(self.debug));
        }
        if let Some(target) = target {
            for (name, value) in target.defines().iter() {
                if !global_defs.contains_key(*name) {
                    global_defs.insert(name.to_string(), Value::Bool(*value));
                }
            }
        }

        let outfile = self.outfile.unwrap_or_else(|| self.emccfile.clone());
        let modname = match self.modname {
            Some(name) => name,
            None => outfile
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "module".into()),
        };
        let projectdir = match self.projectdir {
            Some(dir) => dir,
            None => std::env::current_dir()
                .map_err(|e| PackageError::io(".", e))?,
        };

        Ok(Options {
            emccfile: self.emccfile,
            jsentryfile: self.jsentryfile,
            outfile,
            projectdir,
            modname,
            wasmfile: self.wasmfile,
            global_defs,
            target,
            debug: self.debug,
            pretty: self.pretty || self.debug,
            ecma,
            esmod: self.esmod,
            embed: self.embed,
            syncinit: self.syncinit,
            inline_sourcemap: self.inline_sourcemap,
            sourcemap_file: self.sourcemap_file,
            nosourcemap: self.nosourcemap,
            noconsole: self.noconsole,
            nostdout: self.nostdout,
            nostderr: self.nostderr,
            strip_capability_probes: self.strip_capability_probes,
        })
    }
}

/// Normalized, immutable packaging options.
#[derive(Debug, Clone)]
pub struct Options {
    pub emccfile: PathBuf,
    pub jsentryfile: Option<PathBuf>,
    pub outfile: PathBuf,
    pub projectdir: PathBuf,
    pub modname: String,
    pub wasmfile: Option<String>,
    pub global_defs: GlobalDefs,
    pub target: Option<Target>,
    pub debug: bool,
    pub pretty: bool,
    pub ecma: u8,
    pub esmod: bool,
    pub embed: bool,
    pub syncinit: bool,
    pub inline_sourcemap: bool,
    pub sourcemap_file: Option<String>,
    pub nosourcemap: bool,
    pub noconsole: bool,
    pub nostdout: bool,
    pub nostderr: bool,
    pub strip_capability_probes: bool,
}

impl Options {
    pub fn targets_node(&self) -> bool {
        self.target.map(|t| t.is_node_like()).unwrap_or(false)
    }

    /// The compiled wasm binary next to `emccfile`.
    pub fn wasm_binary_path(&self) -> PathBuf {
        self.emccfile.with_extension("wasm")
    }
}

/// Parse a `-D` argument, `name` or `name=value`.
///
/// Values are read as JSON literals and fall back to strings.
pub fn parse_global_def(arg: &str) -> Result<(String, Value)> {
    let (name, value) = match arg.find('=') {
        Some(idx) => {
            let raw = &arg[idx + 1..];
            let value = serde_json::from_str::<Value>(raw)
                .ok()
                .filter(|v| !v.is_object() && !v.is_array())
                .unwrap_or_else(|| Value::String(raw.to_string()));
            (&arg[..idx], value)
        }
        None => (arg, Value::Bool(true)),
    };
    if !is_identifier(name) {
        return Err(PackageError::Config(format!(
            "invalid -D name {:?}",
            name
        )));
    }
    Ok((name.to_string(), value))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c == '$' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c == '$' || c.is_ascii_alphanumeric())
}
