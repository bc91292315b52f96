//! The packaging pipeline.
use std::path::{Path, PathBuf};

use swc_core::common::{comments::SingleThreadedComments, sync::Lrc, SourceMap};
use swc_core::ecma::visit::VisitMutWith;

use crate::bundler::{default_entry, BundleOutput, BundleRequest, EntryBundler, NODE_BUILTINS};
use crate::embed;
use crate::enclosure::{Enclosure, Wrapper};
use crate::error::{PackageError, Result};
use crate::fragment::{
    self, assemble, combine, parse_fragments, FragmentName, ENTRY_NAME,
};
use crate::minify::minify;
use crate::options::{Options, PackageOptions};
use crate::patch::{PatchOptions, Patcher};
use crate::source_map;

/// Packaged code and its source map.
#[derive(Debug, Clone)]
pub struct PackageResult {
    pub code: String,
    /// Empty when the map is suppressed or inlined.
    pub sourcemap: String,
    pub outfile: PathBuf,
}

impl PackageResult {
    /// Path of the side source map file.
    pub fn sourcemap_path(&self) -> PathBuf {
        source_map::map_path(&self.outfile)
    }

    /// Write the code and, when there is one, the source map.
    ///
    /// The map is written first and removed again if the code cannot be
    /// written, a failed run leaves neither file behind.
    pub fn write(&self) -> Result<()> {
        if let Some(dir) = self.outfile.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| PackageError::io(dir, e))?;
            }
        }
        let map_path = self.sourcemap_path();
        let has_map = !self.sourcemap.is_empty();
        if has_map {
            std::fs::write(&map_path, &self.sourcemap)
                .map_err(|e| PackageError::io(&map_path, e))?;
        }
        if let Err(e) = std::fs::write(&self.outfile, &self.code) {
            if has_map {
                let _ = std::fs::remove_file(&map_path);
            }
            return Err(PackageError::io(&self.outfile, e));
        }
        log::info!("wrote {}", self.outfile.display());
        Ok(())
    }
}

/// Package the emcc output and the entry module described by `options`.
///
/// Resolving the entry through `bundler` is the only suspension point,
/// everything after it runs synchronously.
pub async fn package_module<B: EntryBundler>(
    options: PackageOptions,
    bundler: &B,
) -> Result<PackageResult> {
    let opts = options.normalize()?;

    let entry = match &opts.jsentryfile {
        Some(entry) => {
            let external_modules: Vec<String> = if opts.targets_node() {
                NODE_BUILTINS.iter().map(|m| m.to_string()).collect()
            } else {
                vec![]
            };
            let request = BundleRequest {
                entry: entry.clone(),
                external_modules: external_modules.clone(),
                esmod: opts.esmod,
                target: opts.target,
                project_dir: opts.projectdir.clone(),
            };
            let output = bundler
                .bundle(request)
                .await
                .map_err(|e| e.relative_to(&opts.projectdir))?;
            for name in output.imported_names.iter() {
                if !external_modules.contains(name) {
                    log::debug!("{} imports {} which was not bundled", entry.display(), name);
                }
            }
            output
        }
        None => default_entry(opts.esmod),
    };
    log::debug!(
        "entry imports {:?}, exports {:?}",
        entry.imported_names,
        entry.exported_names
    );

    compile_bundle(&opts, entry)
}

/// Combine the enclosure, the compiled module and the bundled entry.
pub fn compile_bundle(opts: &Options, entry: BundleOutput) -> Result<PackageResult> {
    let payload = if opts.embed {
        Some(embed::payload_from_file(opts.wasm_binary_path(), opts.target)?)
    } else {
        None
    };
    let enclosure = Enclosure::generate(opts, payload.as_deref());
    let wrapper = Wrapper::for_options(opts);
    let emcc_code = read_emcc_source(opts)?;

    let BundleOutput {
        code: entry_code,
        sourcemap: entry_map,
        ..
    } = entry;

    let cm: Lrc<SourceMap> = Default::default();
    let comments = SingleThreadedComments::default();
    let fragments = assemble(&enclosure, &opts.emccfile, emcc_code, entry_code);
    let mut parsed = parse_fragments(&cm, &comments, fragments, opts.esmod, &opts.projectdir)?;

    let patch_options = PatchOptions {
        strip_capability_probes: opts.strip_capability_probes,
    };
    for fragment in parsed.iter_mut() {
        if !matches!(fragment.name, FragmentName::File(_)) {
            continue;
        }
        let name = fragment.name.display();
        let mut patcher = Patcher::new(&opts.global_defs, &name, &patch_options);
        fragment.program.visit_mut_with(&mut patcher);
        log::debug!("{} patches applied to {}", patcher.applied().len(), name);
    }

    let program = combine(parsed, opts.esmod);
    let minified = minify(&cm, &comments, program, opts)?;

    let mut code = String::with_capacity(
        wrapper.start.len() + minified.code.len() + wrapper.end.len(),
    );
    code.push_str(&wrapper.start);
    code.push_str(&minified.code);
    code.push_str(&wrapper.end);

    let mut sourcemap = String::new();
    if let Some(map) = minified.map {
        let entry_map = match entry_map {
            Some(json) => Some(
                sourcemap::SourceMap::from_slice(json.as_bytes())
                    .map_err(PackageError::minify)?,
            ),
            None => None,
        };
        let map = source_map::compose(&map, |src| {
            if src == ENTRY_NAME {
                entry_map.as_ref()
            } else {
                None
            }
        });
        let map = source_map::offset_lines(&map, line_count(&wrapper.start));
        let json = source_map::finalize(&map, &opts.outfile)?;
        let (comment, side_file) = source_map::mapping_url_comment(
            &json,
            opts.inline_sourcemap,
            opts.sourcemap_file.as_deref(),
            &opts.outfile,
        );
        code.push_str(&comment);
        if side_file {
            sourcemap = json;
        }
    }

    Ok(PackageResult {
        code,
        sourcemap,
        outfile: opts.outfile.clone(),
    })
}

fn read_emcc_source(opts: &Options) -> Result<String> {
    let code = read_to_string(&opts.emccfile)?;
    if let Some(wasmfile) = &opts.wasmfile {
        fragment::override_wasm_binary_file(&code, wasmfile, &opts.emccfile)
    } else if opts.embed {
        Ok(fragment::clear_wasm_binary_file(&code))
    } else {
        Ok(code)
    }
}

fn read_to_string(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| PackageError::io(path, e))
}

fn line_count(text: &str) -> u32 {
    text.matches('\n').count() as u32
}
