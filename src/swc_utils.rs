//! Helpers to get a parser, an emitter and source maps out of swc.
use std::borrow::Cow;
use std::path::Path;

use anyhow::{Context, Result};

use swc_core::common::{
    comments::{Comments, SingleThreadedComments},
    source_map::SourceMapGenConfig,
    sync::Lrc,
    FileName, SourceFile, SourceMap, Span, Spanned,
};
use swc_core::ecma::ast::{EsVersion, Program};
use swc_core::ecma::codegen::{text_writer::JsWriter, Config, Emitter};
use swc_core::ecma::parser::{lexer::Lexer, Parser, StringInput, Syntax};

use crate::error::{relative_file_name, SourcePosition};

/// A parse failure located in one of the source files of a `SourceMap`.
#[derive(Debug, Clone)]
pub struct ParseFailure {
    pub position: SourcePosition,
    pub message: String,
    pub frame: Option<String>,
}

/// Code generation target for an `-ecma` level.
pub fn es_version(ecma: u8) -> EsVersion {
    match ecma {
        5 => EsVersion::Es5,
        6 => EsVersion::Es2015,
        7 => EsVersion::Es2016,
        _ => EsVersion::Es2017,
    }
}

pub(crate) fn get_parser<'a>(
    fm: &'a SourceFile,
    comments: Option<&'a dyn Comments>,
) -> Parser<Lexer<'a>> {
    let lexer = Lexer::new(
        Syntax::Es(Default::default()),
        EsVersion::latest(),
        StringInput::from(fm),
        comments,
    );
    Parser::new_from(lexer)
}

/// Parse a source file as a module or a script.
///
/// Recoverable errors are treated the same as fatal ones, the first
/// one is reported.
pub(crate) fn parse_program(
    cm: &SourceMap,
    fm: &SourceFile,
    comments: Option<&dyn Comments>,
    module: bool,
) -> std::result::Result<Program, ParseFailure> {
    let mut parser = get_parser(fm, comments);
    let program = if module {
        parser.parse_module().map(Program::Module)
    } else {
        parser.parse_script().map(Program::Script)
    };
    let program = program.map_err(|e| {
        let span = e.span();
        parse_failure(cm, fm, span, e.into_kind().msg())
    })?;
    if let Some(e) = parser.take_errors().into_iter().next() {
        let span = e.span();
        return Err(parse_failure(cm, fm, span, e.into_kind().msg()));
    }
    Ok(program)
}

fn parse_failure(
    cm: &SourceMap,
    fm: &SourceFile,
    span: Span,
    message: Cow<'static, str>,
) -> ParseFailure {
    let loc = cm.lookup_char_pos(span.lo);
    let frame = fm.get_line(loc.line.saturating_sub(1)).map(|text| {
        let gutter = format!("{} | ", loc.line);
        format!(
            "{}{}\n{}^",
            gutter,
            text,
            " ".repeat(gutter.len() + loc.col.0)
        )
    });
    ParseFailure {
        position: SourcePosition {
            file: loc.file.name.to_string(),
            line: loc.line,
            col: loc.col.0,
        },
        message: message.into_owned(),
        frame,
    }
}

/// Output of the code generator.
pub(crate) struct Emitted {
    pub code: String,
    pub map: Option<sourcemap::SourceMap>,
}

/// Names source map entries relative to the project directory and never
/// inlines the original sources.
struct SourceNames<'a> {
    project_dir: &'a Path,
}

impl SourceMapGenConfig for SourceNames<'_> {
    fn file_name_to_source(&self, f: &FileName) -> String {
        match f {
            FileName::Real(path) => {
                relative_file_name(&path.display().to_string(), self.project_dir)
            }
            _ => f.to_string(),
        }
    }

    fn inline_sources_content(&self, _f: &FileName) -> bool {
        false
    }
}

/// Print a program, optionally collecting a source map.
pub(crate) fn emit_program(
    cm: &Lrc<SourceMap>,
    program: &Program,
    comments: Option<&SingleThreadedComments>,
    cfg: Config,
    source_map_root: Option<&Path>,
) -> Result<Emitted> {
    let mut buf = Vec::new();
    let mut mappings = Vec::new();
    {
        let wr = JsWriter::new(
            cm.clone(),
            "\n",
            &mut buf,
            if source_map_root.is_some() {
                Some(&mut mappings)
            } else {
                None
            },
        );
        let mut emitter = Emitter {
            cfg,
            cm: cm.clone(),
            comments: comments.map(|c| c as &dyn Comments),
            wr,
        };
        match program {
            Program::Module(module) => emitter.emit_module(module),
            Program::Script(script) => emitter.emit_script(script),
        }
        .context("failed to emit program")?;
    }
    let code = String::from_utf8(buf).context("emitted code is not utf-8")?;

    let map = match source_map_root {
        Some(project_dir) => {
            let mut out = Vec::new();
            cm.build_source_map_with_config(
                &mappings,
                None,
                SourceNames { project_dir },
            )
            .to_writer(&mut out)
            .context("failed to serialize source map")?;
            Some(sourcemap::SourceMap::from_slice(&out)?)
        }
        None => None,
    };

    Ok(Emitted { code, map })
}

/// Codegen settings shared by every emission.
pub(crate) fn codegen_config(minify: bool, ecma: u8) -> Config {
    Config::default()
        .with_minify(minify)
        .with_target(es_version(ecma))
        .with_ascii_only(false)
        .with_omit_last_semi(false)
}
