//! Entry bundler backed by `swc_bundler`.
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Error, Result};

use swc_core::bundler::{
    Bundler, Config, Hook, Load, ModuleData, ModuleRecord, ModuleType, Resolve,
};
use swc_core::common::{sync::Lrc, FileName, Globals, SourceMap, Span, GLOBALS};
use swc_core::ecma::ast::{
    Bool, Expr, KeyValueProp, Lit, MemberExpr, MemberProp, MetaPropExpr, MetaPropKind, Module,
    ModuleItem, Program, PropName, Str,
};
use swc_core::ecma::loader::{
    resolve::Resolution, resolvers::node::NodeModulesResolver, TargetEnv,
};
use swc_core::ecma::transforms::base::{fixer::fixer, hygiene::hygiene};
use swc_core::ecma::visit::{VisitMutWith, VisitWith};

use super::{lower_to_commonjs, BundleOutput, BundleRequest, EntryBundler, ModuleNames};
use crate::error::BundleError;
use crate::swc_utils::{codegen_config, emit_program, parse_program, ParseFailure};

/// Bundles the entry and the files it imports, resolving packages the
/// way node does.
#[derive(Debug, Default, Clone)]
pub struct SwcBundler;

impl SwcBundler {
    pub fn new() -> Self {
        SwcBundler
    }
}

impl EntryBundler for SwcBundler {
    fn bundle(
        &self,
        request: BundleRequest,
    ) -> impl Future<Output = std::result::Result<BundleOutput, BundleError>> {
        futures::future::ready(
            bundle_entry(&request).map_err(|e| bundle_error(e, &request.project_dir)),
        )
    }
}

/// A module of the graph failed to parse.
#[derive(Debug, thiserror::Error)]
#[error("{}: {}", .0.position, .0.message)]
struct LoadParseError(ParseFailure);

struct FileLoader {
    cm: Lrc<SourceMap>,
}

impl Load for FileLoader {
    fn load(&self, file: &FileName) -> Result<ModuleData> {
        let path = match file {
            FileName::Real(path) => path,
            _ => bail!("unsupported module {}", file),
        };
        let fm = self
            .cm
            .load_file(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let module = match parse_program(&self.cm, &fm, None, true) {
            Ok(Program::Module(module)) => module,
            Ok(Program::Script(script)) => Module {
                span: script.span,
                body: script.body.into_iter().map(ModuleItem::Stmt).collect(),
                shebang: script.shebang,
            },
            Err(failure) => return Err(LoadParseError(failure).into()),
        };
        Ok(ModuleData {
            fm,
            module,
            helpers: Default::default(),
        })
    }
}

/// Specifiers naming a package rather than a file.
fn is_bare_specifier(specifier: &str) -> bool {
    !(specifier.starts_with('.') || specifier.starts_with('/'))
}

/// Walk the module graph of `entry` and collect the bare imports
/// `resolver` cannot map to a file.
///
/// Those are left as imports of the bundle next to `external`, with a
/// warning naming the importer. Relative imports that do not resolve
/// are errors.
fn unresolved_bare_imports<R: Resolve>(
    resolver: &R,
    entry: &Path,
    external: &[String],
) -> Result<Vec<String>> {
    let cm: Lrc<SourceMap> = Default::default();
    let mut unresolved: Vec<String> = Vec::new();
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut queue = vec![entry.to_path_buf()];
    seen.insert(entry.to_path_buf());

    while let Some(path) = queue.pop() {
        let fm = cm
            .load_file(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let program = parse_program(&cm, &fm, None, true).map_err(LoadParseError)?;
        let mut names = ModuleNames::new();
        program.visit_with(&mut names);

        let base = FileName::Real(path.clone());
        for specifier in names.imported.iter() {
            if external.contains(specifier) || unresolved.contains(specifier) {
                continue;
            }
            let resolved = resolver.resolve(&base, specifier);
            match resolved {
                Ok(Resolution {
                    filename: FileName::Real(file),
                    ..
                }) => {
                    if seen.insert(file.clone()) {
                        queue.push(file);
                    }
                }
                Ok(_) if is_bare_specifier(specifier) => {
                    log::warn!(
                        "{}: {} is not bundled, leaving it as an import",
                        path.display(),
                        specifier
                    );
                    unresolved.push(specifier.clone());
                }
                Err(e) if is_bare_specifier(specifier) => {
                    log::warn!(
                        "{}: cannot resolve {} ({}), leaving it as an import",
                        path.display(),
                        specifier,
                        e
                    );
                    unresolved.push(specifier.clone());
                }
                Ok(Resolution { filename, .. }) => {
                    bail!("{}: unsupported module {}", path.display(), filename)
                }
                Err(e) => {
                    return Err(e.context(format!(
                        "failed to resolve {} from {}",
                        specifier,
                        path.display()
                    )))
                }
            }
        }
    }
    Ok(unresolved)
}

struct ImportMetaHook;

impl Hook for ImportMetaHook {
    fn get_import_meta_props(
        &self,
        span: Span,
        module_record: &ModuleRecord,
    ) -> Result<Vec<KeyValueProp>, Error> {
        Ok(vec![
            KeyValueProp {
                key: PropName::Ident("url".into()),
                value: Box::new(Expr::Lit(Lit::Str(Str {
                    span,
                    value: module_record.file_name.to_string().into(),
                    raw: None,
                }))),
            },
            KeyValueProp {
                key: PropName::Ident("main".into()),
                value: if module_record.is_entry {
                    Box::new(Expr::Member(MemberExpr {
                        span,
                        obj: Box::new(Expr::MetaProp(MetaPropExpr {
                            span,
                            kind: MetaPropKind::ImportMeta,
                        })),
                        prop: MemberProp::Ident("main".into()),
                    }))
                } else {
                    Box::new(Expr::Lit(Lit::Bool(Bool { span, value: false })))
                },
            },
        ])
    }
}

fn bundle_entry(request: &BundleRequest) -> Result<BundleOutput> {
    let entry = std::fs::canonicalize(&request.entry)
        .with_context(|| format!("cannot find entry {}", request.entry.display()))?;
    let target_env = match request.target {
        Some(target) if !target.is_node_like() => TargetEnv::Browser,
        _ => TargetEnv::Node,
    };

    let globals = Globals::new();
    GLOBALS.set(&globals, || {
        let cm: Lrc<SourceMap> = Default::default();
        let loader = FileLoader { cm: cm.clone() };
        let resolver = NodeModulesResolver::new(target_env, Default::default(), true);
        let unresolved =
            unresolved_bare_imports(&resolver, &entry, &request.external_modules)?;
        let mut bundler = Bundler::new(
            &globals,
            cm.clone(),
            loader,
            &resolver,
            Config {
                require: false,
                external_modules: request
                    .external_modules
                    .iter()
                    .chain(unresolved.iter())
                    .map(|m| m.as_str().into())
                    .collect(),
                module: ModuleType::Es,
                ..Default::default()
            },
            Box::new(ImportMetaHook),
        );

        let mut entries = HashMap::new();
        entries.insert("main".to_string(), FileName::Real(entry));
        let mut bundles = bundler.bundle(entries)?;
        let bundle = bundles
            .pop()
            .ok_or_else(|| anyhow!("bundler produced no output"))?;

        let mut module = bundle.module;
        module.visit_mut_with(&mut hygiene());
        module.visit_mut_with(&mut fixer(None));

        let mut names = ModuleNames::new();
        module.visit_with(&mut names);
        log::debug!(
            "bundled entry imports {:?}, exports {:?}",
            names.imported,
            names.exported
        );

        let module = if request.esmod {
            module
        } else {
            lower_to_commonjs(module)
        };
        let emitted = emit_program(
            &cm,
            &Program::Module(module),
            None,
            codegen_config(false, 8),
            Some(&request.project_dir),
        )?;
        let sourcemap = match emitted.map {
            Some(map) => {
                let mut buf = Vec::new();
                map.to_writer(&mut buf)?;
                Some(String::from_utf8(buf)?)
            }
            None => None,
        };

        Ok(BundleOutput {
            code: emitted.code,
            sourcemap,
            imported_names: names.imported.into_iter().collect(),
            exported_names: names.exported.into_iter().collect(),
        })
    })
}

fn bundle_error(err: Error, project_dir: &Path) -> BundleError {
    for cause in err.chain() {
        if let Some(LoadParseError(failure)) = cause.downcast_ref::<LoadParseError>() {
            let mut bundle_err =
                BundleError::new(failure.message.clone()).at(failure.position.clone());
            if let Some(frame) = &failure.frame {
                bundle_err = bundle_err.with_frame(frame.clone());
            }
            return bundle_err.relative_to(project_dir);
        }
    }
    BundleError::new(format!("{:#}", err))
}
