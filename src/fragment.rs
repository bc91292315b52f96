//! Ordered source fragments making up the packaged program.
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use swc_core::common::{
    comments::SingleThreadedComments, sync::Lrc, FileName, SourceMap, DUMMY_SP,
};
use swc_core::ecma::ast::{Module, ModuleItem, Program, Script, Stmt};

use crate::enclosure::Enclosure;
use crate::error::{relative_file_name, PackageError, Result};

pub const PRE_NAME: &str = "<wasmcpre>";
pub const MID_NAME: &str = "<wasmcmid>";
pub const POST_NAME: &str = "<wasmcpost>";
/// Name of the bundled entry fragment, remapped through the bundler's
/// source map when maps are composed.
pub const ENTRY_NAME: &str = "<wasmcentry>";

/// Whether `name` marks generated enclosure code.
pub fn is_enclosure_name(name: &str) -> bool {
    name == PRE_NAME || name == MID_NAME || name == POST_NAME
}

static WASM_BINARY_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"\b((?:var|let|const)\s+)?wasmBinaryFile\s*=\s*(?:'([^']+)'|"([^"]+)");?"#,
    )
    .unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentName {
    /// Generated enclosure code.
    Enclosure(&'static str),
    /// The compiled module read from disk.
    File(PathBuf),
    /// Bundled entry code.
    Entry,
}

impl FragmentName {
    pub fn as_file_name(&self) -> FileName {
        match self {
            FragmentName::Enclosure(tag) => FileName::Custom(tag.to_string()),
            FragmentName::File(path) => FileName::Real(path.clone()),
            FragmentName::Entry => FileName::Custom(ENTRY_NAME.into()),
        }
    }

    pub fn display(&self) -> String {
        match self {
            FragmentName::Enclosure(tag) => tag.to_string(),
            FragmentName::File(path) => path.display().to_string(),
            FragmentName::Entry => ENTRY_NAME.into(),
        }
    }

    pub fn is_enclosure(&self) -> bool {
        matches!(self, FragmentName::Enclosure(_))
    }
}

/// One unit of source text of the combined program.
#[derive(Debug, Clone)]
pub struct SourceFragment {
    pub name: FragmentName,
    pub text: String,
}

impl SourceFragment {
    pub fn new(name: FragmentName, text: String) -> Self {
        Self { name, text }
    }
}

/// A fragment with its syntax tree.
pub struct ParsedFragment {
    pub name: FragmentName,
    pub program: Program,
}

/// Point the compiled module at a different wasm file name.
pub fn override_wasm_binary_file(
    code: &str,
    wasmfile: &str,
    emccfile: &Path,
) -> Result<String> {
    rewrite_wasm_binary_file(code, wasmfile).ok_or_else(|| {
        PackageError::Patch(format!(
            "failed to find wasmBinaryFile in emcc output file {}",
            emccfile.display()
        ))
    })
}

/// Drop the wasm file name from the compiled module when the binary is
/// embedded. Older emcc versions do not declare it.
pub fn clear_wasm_binary_file(code: &str) -> String {
    match rewrite_wasm_binary_file(code, "") {
        Some(code) => code,
        None => code.to_string(),
    }
}

fn rewrite_wasm_binary_file(code: &str, wasmfile: &str) -> Option<String> {
    let caps = WASM_BINARY_FILE.captures(code)?;
    let m = caps.get(0)?;
    let keyword = caps.get(1).map(|k| k.as_str()).unwrap_or("");
    let quoted = serde_json::Value::String(wasmfile.to_string()).to_string();
    let mut out = String::with_capacity(code.len() + wasmfile.len());
    out.push_str(&code[..m.start()]);
    out.push_str(&format!("{}wasmBinaryFile = {};", keyword, quoted));
    out.push_str(&code[m.end()..]);
    Some(out)
}

/// Order the fragments: pre, compiled module, mid, entry, post.
/// Empty enclosure fragments are left out.
pub fn assemble(
    enclosure: &Enclosure,
    emccfile: &Path,
    emcc_code: String,
    entry_code: String,
) -> Vec<SourceFragment> {
    let fragments = vec![
        SourceFragment::new(
            FragmentName::Enclosure(PRE_NAME),
            enclosure.pre.clone(),
        ),
        SourceFragment::new(FragmentName::File(emccfile.to_path_buf()), emcc_code),
        SourceFragment::new(
            FragmentName::Enclosure(MID_NAME),
            enclosure.mid.clone(),
        ),
        SourceFragment::new(FragmentName::Entry, entry_code),
        SourceFragment::new(
            FragmentName::Enclosure(POST_NAME),
            enclosure.post.clone(),
        ),
    ];
    fragments
        .into_iter()
        .filter(|f| !(f.name.is_enclosure() && f.text.trim().is_empty()))
        .collect()
}

/// Parse every fragment in order with the same parser configuration.
pub fn parse_fragments(
    cm: &Lrc<SourceMap>,
    comments: &SingleThreadedComments,
    fragments: Vec<SourceFragment>,
    esmod: bool,
    project_dir: &Path,
) -> Result<Vec<ParsedFragment>> {
    let mut parsed = Vec::with_capacity(fragments.len());
    for fragment in fragments {
        let fm = cm.new_source_file(fragment.name.as_file_name().into(), fragment.text);
        let program =
            crate::swc_utils::parse_program(cm, &fm, Some(comments), esmod)
                .map_err(|failure| {
                    let mut position = failure.position;
                    position.file = relative_file_name(&position.file, project_dir);
                    let mut message = failure.message;
                    if let Some(frame) = failure.frame {
                        message.push('\n');
                        message.push_str(&frame);
                    }
                    PackageError::Parse { position, message }
                })?;
        log::debug!("parsed fragment {}", fragment.name.display());
        parsed.push(ParsedFragment {
            name: fragment.name,
            program,
        });
    }
    Ok(parsed)
}

/// Concatenate the top levels of all fragments into one program.
pub fn combine(fragments: Vec<ParsedFragment>, esmod: bool) -> Program {
    if esmod {
        let mut body: Vec<ModuleItem> = Vec::new();
        for fragment in fragments {
            match fragment.program {
                Program::Module(module) => body.extend(module.body),
                Program::Script(script) => {
                    body.extend(script.body.into_iter().map(ModuleItem::Stmt))
                }
            }
        }
        Program::Module(Module {
            span: DUMMY_SP,
            body,
            shebang: None,
        })
    } else {
        let mut body: Vec<Stmt> = Vec::new();
        for fragment in fragments {
            match fragment.program {
                Program::Script(script) => body.extend(script.body),
                Program::Module(module) => body.extend(
                    module
                        .body
                        .into_iter()
                        .filter_map(|item| item.stmt()),
                ),
            }
        }
        Program::Script(Script {
            span: DUMMY_SP,
            body,
            shebang: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMCC: &str = "var Module = typeof Module !== 'undefined' ? Module : {};\n\
                        var wasmBinaryFile = 'hello.wasm';\n\
                        if (!isDataURI(wasmBinaryFile)) {}\n";

    #[test]
    fn wasm_binary_file_override_keeps_declaration() {
        let code =
            override_wasm_binary_file(EMCC, "lib/hello.wasm", Path::new("hello.js"))
                .unwrap();
        assert!(code.contains("var wasmBinaryFile = \"lib/hello.wasm\";\n"));
        assert!(!code.contains("var var"));
        assert!(!code.contains("'hello.wasm'"));

        let code = override_wasm_binary_file(
            "wasmBinaryFile = \"a.wasm\"",
            "b.wasm",
            Path::new("hello.js"),
        )
        .unwrap();
        assert_eq!(code, "wasmBinaryFile = \"b.wasm\";");
    }

    #[test]
    fn wasm_binary_file_override_requires_assignment() {
        let err = override_wasm_binary_file("var x = 1;", "b.wasm", Path::new("out/hello.js"))
            .unwrap_err();
        match err {
            PackageError::Patch(msg) => assert!(msg.contains("out/hello.js")),
            err => panic!("unexpected error {:?}", err),
        }
        assert_eq!(clear_wasm_binary_file("var x = 1;"), "var x = 1;");
    }

    #[test]
    fn embedded_binary_clears_file_name() {
        let code = clear_wasm_binary_file(EMCC);
        assert!(code.contains("var wasmBinaryFile = \"\";"));
        assert!(!code.contains("hello.wasm"));
    }

    #[test]
    fn fragments_are_ordered_and_empty_ones_dropped() {
        let enclosure = Enclosure {
            pre: "var pre;".into(),
            mid: "var mid;".into(),
            post: String::new(),
        };
        let fragments = assemble(
            &enclosure,
            Path::new("/work/out/hello.js"),
            "var emcc;".into(),
            "var entry;".into(),
        );
        let names = fragments.iter().map(|f| f.name.display()).collect::<Vec<_>>();
        assert_eq!(
            names,
            vec!["<wasmcpre>", "/work/out/hello.js", "<wasmcmid>", "<wasmcentry>"]
        );
    }

    #[test]
    fn parse_error_is_relative_to_project() {
        let cm: Lrc<SourceMap> = Default::default();
        let comments = SingleThreadedComments::default();
        let fragments = vec![
            SourceFragment::new(FragmentName::Enclosure(PRE_NAME), "var a = 1;".into()),
            SourceFragment::new(
                FragmentName::File("/work/out/hello.js".into()),
                "var b = 2;\nvar = 3;".into(),
            ),
        ];
        let err = match parse_fragments(&cm, &comments, fragments, false, Path::new("/work")) {
            Err(err) => err,
            Ok(_) => panic!("expected a parse error"),
        };
        let position = err.position().unwrap();
        assert_eq!(position.file, "out/hello.js");
        assert_eq!(position.line, 2);
    }

    #[test]
    fn combined_program_keeps_order() {
        let cm: Lrc<SourceMap> = Default::default();
        let comments = SingleThreadedComments::default();
        let fragments = vec![
            SourceFragment::new(FragmentName::Enclosure(PRE_NAME), "var a = 1;".into()),
            SourceFragment::new(FragmentName::Entry, "var b = a;".into()),
        ];
        let parsed =
            parse_fragments(&cm, &comments, fragments, true, Path::new("/work")).unwrap();
        match combine(parsed, true) {
            Program::Module(module) => assert_eq!(module.body.len(), 2),
            Program::Script(_) => panic!("expected a module"),
        }
    }
}
