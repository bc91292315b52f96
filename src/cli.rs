//! Command line parsing exposed via the library so it can be driven from tests.
use std::ffi::OsString;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use structopt::StructOpt;

use crate::bundler::SwcBundler;
use crate::options::{parse_global_def, PackageOptions};
use crate::package::package_module;

#[derive(StructOpt, Debug)]
#[structopt(
    name = "wasmc-pack",
    about = "Package emcc output and a JS entry point into a single module"
)]
struct PackageArgs {
    /// Generate a debug build
    #[structopt(short = "g", long)]
    debug: bool,

    /// Print details to stderr
    #[structopt(short, long)]
    verbose: bool,

    /// Output file, defaults to the emcc file
    #[structopt(short, long, parse(from_os_str))]
    output: Option<PathBuf>,

    /// Generate an ES module
    #[structopt(long)]
    esmod: bool,

    /// ECMAScript version of the output (5 to 8)
    #[structopt(long)]
    ecma: Option<u8>,

    /// Embed the wasm binary in the output
    #[structopt(long)]
    embed: bool,

    /// Instantiate the wasm module synchronously
    #[structopt(long)]
    syncinit: bool,

    /// Name of the wasm file loaded at runtime
    #[structopt(long)]
    wasm: Option<String>,

    /// Do not minify the output
    #[structopt(long)]
    pretty: bool,

    /// Store the source map in the output file
    #[structopt(long)]
    inline_sourcemap: bool,

    /// Do not generate a source map
    #[structopt(long)]
    nosourcemap: bool,

    /// Silence all console output
    #[structopt(long)]
    noconsole: bool,

    /// Silence output to stdout
    #[structopt(long)]
    nostdout: bool,

    /// Silence output to stderr
    #[structopt(long)]
    nostderr: bool,

    /// Global constant, `name` or `name=value`
    #[structopt(short = "D", number_of_values = 1, parse(try_from_str = parse_global_def))]
    define: Vec<(String, Value)>,

    /// One of node, node-legacy, web or worker
    #[structopt(long)]
    target: Option<String>,

    /// Directory file names are reported relative to
    #[structopt(long, parse(from_os_str))]
    project_dir: Option<PathBuf>,

    /// URL of the source map referenced from the output
    #[structopt(long)]
    sourcemap_file: Option<String>,

    /// Module name, defaults to the output file name
    #[structopt(long)]
    modname: Option<String>,

    /// Keep the `getOwnPropertyDescriptor(Module, ...)` probes emitted by emcc
    #[structopt(long)]
    keep_capability_probes: bool,

    /// JSON file with packaging options, flags take precedence
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// JS file generated by emcc
    #[structopt(parse(from_os_str))]
    emccfile: Option<PathBuf>,

    /// JS entry point
    #[structopt(parse(from_os_str))]
    jsentryfile: Option<PathBuf>,
}

impl PackageArgs {
    fn into_options(self) -> Result<PackageOptions> {
        let mut options = match &self.config {
            Some(file) => load_config(file)?,
            None => PackageOptions::default(),
        };

        if let Some(emccfile) = self.emccfile {
            options.emccfile = emccfile;
        }
        if options.emccfile.as_os_str().is_empty() {
            bail!("missing emcc output file");
        }
        if self.jsentryfile.is_some() {
            options.jsentryfile = self.jsentryfile;
        }
        if self.output.is_some() {
            options.outfile = self.output;
        }
        if self.project_dir.is_some() {
            options.projectdir = self.project_dir;
        }
        if self.modname.is_some() {
            options.modname = self.modname;
        }
        if self.wasm.is_some() {
            options.wasmfile = self.wasm;
        }
        if self.target.is_some() {
            options.target = self.target;
        }
        if self.sourcemap_file.is_some() {
            options.sourcemap_file = self.sourcemap_file;
        }
        if let Some(ecma) = self.ecma {
            options.ecma = ecma;
        }
        for (name, value) in self.define {
            options.global_defs.insert(name, value);
        }

        options.debug |= self.debug;
        options.pretty |= self.pretty;
        options.esmod |= self.esmod;
        options.embed |= self.embed;
        options.syncinit |= self.syncinit;
        options.inline_sourcemap |= self.inline_sourcemap;
        options.nosourcemap |= self.nosourcemap;
        options.noconsole |= self.noconsole;
        options.nostdout |= self.nostdout;
        options.nostderr |= self.nostderr;
        if self.keep_capability_probes {
            options.strip_capability_probes = false;
        }
        Ok(options)
    }
}

fn load_config(file: &PathBuf) -> Result<PackageOptions> {
    let f = File::open(file)
        .context(format!("Unable to open config file {}", file.display()))?;
    let reader = BufReader::new(f);
    let options: PackageOptions = serde_json::from_reader(reader)
        .context(format!("Failed to parse JSON in {}", file.display()))?;
    Ok(options)
}

fn parse_args<T>(argv: Option<Vec<T>>) -> PackageArgs
where
    T: Into<OsString> + Clone,
{
    let app = PackageArgs::clap();
    let matches = if let Some(argv) = argv {
        app.get_matches_from(argv)
    } else {
        app.get_matches()
    };
    PackageArgs::from_clap(&matches)
}

/// `RUST_LOG` value to install, if any.
///
/// Verbose output only raises this crate to debug, swc logs stay at the
/// default level.
fn log_filter(verbose: bool, current: Option<String>) -> Option<String> {
    if verbose {
        Some("info,wasmc_pack=debug".into())
    } else if current.is_none() {
        Some("info".into())
    } else {
        None
    }
}

/// Parse the given arguments list or `std::env::os_args` and run the program.
pub fn run<T>(argv: Option<Vec<T>>) -> Result<()>
where
    T: Into<OsString> + Clone,
{
    let args = parse_args(argv);

    if let Some(filter) = log_filter(args.verbose, std::env::var("RUST_LOG").ok()) {
        std::env::set_var("RUST_LOG", filter);
    }
    let _ = pretty_env_logger::try_init();

    let options = args.into_options()?;
    let bundler = SwcBundler::new();
    let result = futures::executor::block_on(package_module(options, &bundler))?;
    result.write()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(argv: &[&str]) -> Result<PackageOptions> {
        parse_args(Some(argv.to_vec())).into_options()
    }

    #[test]
    fn flags_map_to_options() -> Result<()> {
        let opts = options(&[
            "wasmc-pack",
            "-g",
            "--esmod",
            "--target",
            "web",
            "-o",
            "dist/hello.mjs",
            "-D",
            "FEATURE_X",
            "-D",
            "LEVEL=3",
            "-D",
            "NAME=hello",
            "--keep-capability-probes",
            "out/hello.js",
            "src/main.js",
        ])?;
        assert!(opts.debug);
        assert!(opts.esmod);
        assert!(!opts.strip_capability_probes);
        assert_eq!(opts.target.as_deref(), Some("web"));
        assert_eq!(opts.outfile, Some(PathBuf::from("dist/hello.mjs")));
        assert_eq!(opts.emccfile, PathBuf::from("out/hello.js"));
        assert_eq!(opts.jsentryfile, Some(PathBuf::from("src/main.js")));
        assert_eq!(opts.global_defs["FEATURE_X"], Value::Bool(true));
        assert_eq!(opts.global_defs["LEVEL"], serde_json::json!(3));
        assert_eq!(opts.global_defs["NAME"], serde_json::json!("hello"));
        Ok(())
    }

    #[test]
    fn flags_override_config_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = dir.path().join("wasmc.json");
        std::fs::write(
            &config,
            r#"{"emccfile": "out/a.js", "target": "node", "ecma": 6, "globalDefs": {"X": 1}}"#,
        )?;
        let config = config.display().to_string();
        let opts = options(&["wasmc-pack", "--config", &config, "--ecma", "7", "-D", "Y"])?;
        assert_eq!(opts.emccfile, PathBuf::from("out/a.js"));
        assert_eq!(opts.target.as_deref(), Some("node"));
        assert_eq!(opts.ecma, 7);
        assert_eq!(opts.global_defs.len(), 2);
        Ok(())
    }

    #[test]
    fn verbose_logging_is_scoped_to_the_crate() {
        assert_eq!(
            log_filter(true, None).as_deref(),
            Some("info,wasmc_pack=debug")
        );
        assert_eq!(
            log_filter(true, Some("warn".into())).as_deref(),
            Some("info,wasmc_pack=debug")
        );
        assert_eq!(log_filter(false, None).as_deref(), Some("info"));
        assert_eq!(log_filter(false, Some("swc=trace".into())), None);
    }

    #[test]
    fn emcc_file_is_required() {
        assert!(options(&["wasmc-pack", "--debug"]).is_err());
    }
}
