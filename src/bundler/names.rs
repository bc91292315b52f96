//! Names a bundled module imports from external modules and exports.
use indexmap::IndexSet;
use swc_core::ecma::ast::*;
use swc_core::ecma::visit::Visit;

use crate::helpers::var_symbol_names;

#[derive(Default, Debug)]
pub struct ModuleNames {
    /// External module specifiers, in first import order.
    pub imported: IndexSet<String>,
    pub exported: IndexSet<String>,
}

impl ModuleNames {
    pub fn new() -> Self {
        Default::default()
    }
}

pub(crate) fn export_name(name: &ModuleExportName) -> String {
    match name {
        ModuleExportName::Ident(ident) => ident.sym.as_ref().to_string(),
        ModuleExportName::Str(s) => s.value.as_ref().to_string(),
    }
}

impl Visit for ModuleNames {
    fn visit_import_decl(&mut self, n: &ImportDecl) {
        self.imported.insert(n.src.value.as_ref().to_string());
    }

    fn visit_module_decl(&mut self, n: &ModuleDecl) {
        match n {
            ModuleDecl::Import(import) => self.visit_import_decl(import),
            ModuleDecl::ExportDecl(export) => match &export.decl {
                Decl::Var(var) => {
                    for (_, names) in var_symbol_names(var) {
                        self.exported
                            .extend(names.into_iter().map(|n| n.to_string()));
                    }
                }
                Decl::Fn(f) => {
                    self.exported.insert(f.ident.sym.as_ref().to_string());
                }
                Decl::Class(c) => {
                    self.exported.insert(c.ident.sym.as_ref().to_string());
                }
                _ => {}
            },
            ModuleDecl::ExportNamed(export) => {
                if let Some(src) = &export.src {
                    self.imported.insert(src.value.as_ref().to_string());
                }
                for spec in export.specifiers.iter() {
                    let name = match spec {
                        ExportSpecifier::Named(spec) => {
                            export_name(spec.exported.as_ref().unwrap_or(&spec.orig))
                        }
                        ExportSpecifier::Default(spec) => spec.exported.sym.as_ref().to_string(),
                        ExportSpecifier::Namespace(spec) => export_name(&spec.name),
                    };
                    self.exported.insert(name);
                }
            }
            ModuleDecl::ExportDefaultDecl(_) | ModuleDecl::ExportDefaultExpr(_) => {
                self.exported.insert("default".into());
            }
            ModuleDecl::ExportAll(export) => {
                self.imported.insert(export.src.value.as_ref().to_string());
            }
            _ => {}
        }
    }
}
