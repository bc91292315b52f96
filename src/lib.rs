//! Package the JS glue generated by emcc together with a JS entry point
//! into a single CommonJS, ES or UMD style module.
pub mod bundler;
pub mod cli;
pub mod embed;
pub mod enclosure;
pub mod error;
pub mod fragment;
mod helpers;
pub mod minify;
pub mod options;
pub mod package;
pub mod patch;
pub mod source_map;
mod swc_utils;

pub use bundler::{BundleOutput, BundleRequest, EntryBundler, SwcBundler};
pub use error::{BundleError, PackageError, Result, SourcePosition};
pub use options::{Options, PackageOptions, Target};
pub use package::{compile_bundle, package_module, PackageResult};
