//! Code generation of the combined program.
//!
//! Debug builds are printed once, as they are. Release builds go through
//! two passes: the combined program is printed without any
//! transformation, then the printed text is parsed again as a single
//! file and compressed and mangled. Compressing the combined tree
//! directly would resolve the fragments as separate scopes, reparsing
//! gives the optimizer one top level where references made by the entry
//! code to names of the compiled module bind correctly.
use std::time::Instant;

use serde_json::json;
use swc_core::common::{
    comments::{Comments, SingleThreadedComments},
    sync::Lrc,
    FileName, Globals, Mark, SourceMap, GLOBALS,
};
use swc_core::ecma::ast::Program;
use swc_core::ecma::minifier::{
    optimize,
    option::{terser::TerserCompressorOptions, ExtraOptions, MangleOptions, MinifyOptions},
};
use swc_core::ecma::transforms::base::{fixer::fixer, hygiene::hygiene, resolver};
use swc_core::ecma::visit::VisitMutWith;

use crate::error::{PackageError, Result};
use crate::options::Options;
use crate::swc_utils::{codegen_config, emit_program, parse_program};

/// Source name of the text produced by the first release pass.
pub const PASS1_NAME: &str = "<pass1>";

/// Generated code and its map, relative to the fragments.
pub struct Minified {
    pub code: String,
    pub map: Option<sourcemap::SourceMap>,
}

/// Print `program`, whose fragments live in `cm`.
pub fn minify(
    cm: &Lrc<SourceMap>,
    comments: &SingleThreadedComments,
    program: Program,
    opts: &Options,
) -> Result<Minified> {
    let map_root = if opts.nosourcemap {
        None
    } else {
        Some(opts.projectdir.as_path())
    };

    if opts.debug {
        log::debug!("single pass, no compression");
        let emitted = emit_program(
            cm,
            &program,
            Some(comments),
            codegen_config(false, opts.ecma),
            map_root,
        )
        .map_err(PackageError::minify)?;
        return Ok(Minified {
            code: emitted.code,
            map: emitted.map,
        });
    }

    let started = Instant::now();
    let pass1 = emit_program(cm, &program, None, codegen_config(false, opts.ecma), map_root)
        .map_err(|e| PackageError::Minify(format!("pass 1: {}", e)))?;
    drop(program);
    log::debug!(
        "pass 1 produced {} bytes in {:?}",
        pass1.code.len(),
        started.elapsed()
    );
    let started = Instant::now();

    let fm = cm.new_source_file(
        FileName::Custom(PASS1_NAME.into()).into(),
        pass1.code,
    );
    let pass2_comments = SingleThreadedComments::default();
    let program = parse_program(cm, &fm, Some(&pass2_comments), opts.esmod).map_err(
        |failure| {
            PackageError::Minify(format!(
                "pass 2: {}: {}",
                failure.position, failure.message
            ))
        },
    )?;

    let minify_options = minify_options(cm, opts)?;
    let mangled = minify_options.mangle.is_some();

    let program = GLOBALS.set(&Globals::new(), || {
        let unresolved_mark = Mark::new();
        let top_level_mark = Mark::new();
        let mut program = program;
        program.visit_mut_with(&mut resolver(unresolved_mark, top_level_mark, false));

        let mut program = optimize(
            program,
            cm.clone(),
            Some(&pass2_comments as &dyn Comments),
            None,
            &minify_options,
            &ExtraOptions {
                unresolved_mark,
                top_level_mark,
                mangle_name_cache: None,
            },
        );
        program.visit_mut_with(&mut fixer(Some(&pass2_comments as &dyn Comments)));
        if !mangled {
            program.visit_mut_with(&mut hygiene());
        }
        program
    });

    let pass2 = emit_program(
        cm,
        &program,
        None,
        codegen_config(!opts.pretty, opts.ecma),
        map_root,
    )
    .map_err(|e| PackageError::Minify(format!("pass 2: {}", e)))?;
    log::debug!(
        "pass 2 produced {} bytes in {:?}",
        pass2.code.len(),
        started.elapsed()
    );

    let map = match (pass2.map, pass1.map) {
        (Some(outer), Some(inner)) => Some(crate::source_map::compose(&outer, |src| {
            if src == PASS1_NAME {
                Some(&inner)
            } else {
                None
            }
        })),
        _ => None,
    };
    Ok(Minified {
        code: pass2.code,
        map,
    })
}

/// emcc helpers whose result is the only effect, unused calls are dropped.
const PURE_FUNCS: &[&str] = &["getNativeTypeSize"];

/// Compression and mangling settings of the second release pass.
fn minify_options(cm: &Lrc<SourceMap>, opts: &Options) -> Result<MinifyOptions> {
    let compress: TerserCompressorOptions =
        serde_json::from_value(compress_config(opts)).map_err(PackageError::minify)?;
    let mangle = if opts.pretty {
        None
    } else {
        let mangle: MangleOptions = serde_json::from_value(json!({
            "topLevel": true,
            "keepClassNames": true,
        }))
        .map_err(PackageError::minify)?;
        Some(mangle)
    };
    Ok(MinifyOptions {
        compress: Some(compress.into_config(cm.clone())),
        mangle,
        ..Default::default()
    })
}

fn compress_config(opts: &Options) -> serde_json::Value {
    json!({
        "passes": 2,
        "toplevel": true,
        "top_retain": ["exports"],
        "hoist_vars": true,
        "keep_classnames": true,
        "dead_code": true,
        "evaluate": true,
        "drop_console": opts.noconsole,
        "pure_funcs": PURE_FUNCS,
        "global_defs": opts.global_defs,
        "ecma": ecma_year(opts.ecma),
    })
}

fn ecma_year(ecma: u8) -> u32 {
    match ecma {
        5 => 5,
        6 => 2015,
        7 => 2016,
        _ => 2017,
    }
}
