//! Lower the import and export declarations of a bundled module to
//! CommonJS `require` calls and `exports` assignments.
use swc_core::common::DUMMY_SP;
use swc_core::ecma::ast::*;

use super::names::export_name;

/// Rewrite `module` so it only contains statements.
///
/// A module whose only export is `export default` assigns
/// `module.exports`, everything else is set on `exports`.
pub fn lower_to_commonjs(module: Module) -> Module {
    let sole_default = is_sole_default_export(&module);
    let mut body = Vec::with_capacity(module.body.len());

    for item in module.body {
        let decl = match item {
            ModuleItem::Stmt(stmt) => {
                body.push(ModuleItem::Stmt(stmt));
                continue;
            }
            ModuleItem::ModuleDecl(decl) => decl,
        };
        let mut stmts = Vec::new();
        match decl {
            ModuleDecl::Import(import) => lower_import(&import, &mut stmts),
            ModuleDecl::ExportDecl(export) => {
                let names = declared_names(&export.decl);
                stmts.push(Stmt::Decl(export.decl));
                for name in names {
                    stmts.push(export_stmt(&name, Expr::Ident(name.clone())));
                }
            }
            ModuleDecl::ExportNamed(export) => {
                for spec in export.specifiers.iter() {
                    lower_export_specifier(spec, export.src.as_deref(), &mut stmts);
                }
            }
            ModuleDecl::ExportDefaultExpr(export) => {
                stmts.push(default_export_stmt(*export.expr, sole_default));
            }
            ModuleDecl::ExportDefaultDecl(export) => match export.decl {
                DefaultDecl::Fn(FnExpr {
                    ident: Some(ident),
                    function,
                }) => {
                    stmts.push(Stmt::Decl(Decl::Fn(FnDecl {
                        ident: ident.clone(),
                        declare: false,
                        function,
                    })));
                    stmts.push(default_export_stmt(Expr::Ident(ident), sole_default));
                }
                DefaultDecl::Class(ClassExpr {
                    ident: Some(ident),
                    class,
                }) => {
                    stmts.push(Stmt::Decl(Decl::Class(ClassDecl {
                        ident: ident.clone(),
                        declare: false,
                        class,
                    })));
                    stmts.push(default_export_stmt(Expr::Ident(ident), sole_default));
                }
                DefaultDecl::Fn(f) => {
                    stmts.push(default_export_stmt(Expr::Fn(f), sole_default));
                }
                DefaultDecl::Class(c) => {
                    stmts.push(default_export_stmt(Expr::Class(c), sole_default));
                }
                DefaultDecl::TsInterfaceDecl(_) => {}
            },
            ModuleDecl::ExportAll(export) => {
                // Object.assign(exports, require("m"))
                stmts.push(expr_stmt(call(
                    Expr::Member(member(ident_expr("Object"), "assign")),
                    vec![ident_expr("exports"), require(&export.src)],
                )));
            }
            _ => {}
        }
        body.extend(stmts.into_iter().map(ModuleItem::Stmt));
    }

    Module {
        span: module.span,
        body,
        shebang: module.shebang,
    }
}

fn is_sole_default_export(module: &Module) -> bool {
    let mut default = false;
    for item in module.body.iter() {
        match item {
            ModuleItem::ModuleDecl(ModuleDecl::ExportDefaultExpr(_))
            | ModuleItem::ModuleDecl(ModuleDecl::ExportDefaultDecl(_)) => default = true,
            ModuleItem::ModuleDecl(ModuleDecl::ExportDecl(_))
            | ModuleItem::ModuleDecl(ModuleDecl::ExportNamed(_))
            | ModuleItem::ModuleDecl(ModuleDecl::ExportAll(_)) => return false,
            _ => {}
        }
    }
    default
}

fn declared_names(decl: &Decl) -> Vec<Ident> {
    match decl {
        Decl::Fn(f) => vec![f.ident.clone()],
        Decl::Class(c) => vec![c.ident.clone()],
        Decl::Var(var) => var
            .decls
            .iter()
            .flat_map(|decl| binding_idents(&decl.name))
            .collect(),
        _ => vec![],
    }
}

fn binding_idents(pat: &Pat) -> Vec<Ident> {
    match pat {
        Pat::Ident(binding) => vec![binding.id.clone()],
        Pat::Array(arr) => arr.elems.iter().flatten().flat_map(binding_idents).collect(),
        Pat::Object(obj) => obj
            .props
            .iter()
            .flat_map(|prop| match prop {
                ObjectPatProp::Assign(entry) => vec![entry.key.id.clone()],
                ObjectPatProp::KeyValue(entry) => binding_idents(&entry.value),
                ObjectPatProp::Rest(entry) => binding_idents(&entry.arg),
            })
            .collect(),
        Pat::Rest(rest) => binding_idents(&rest.arg),
        Pat::Assign(assign) => binding_idents(&assign.left),
        _ => vec![],
    }
}

fn lower_import(import: &ImportDecl, stmts: &mut Vec<Stmt>) {
    if import.specifiers.is_empty() {
        stmts.push(expr_stmt(require(&import.src)));
        return;
    }
    for spec in import.specifiers.iter() {
        let (local, init) = match spec {
            ImportSpecifier::Default(spec) => (&spec.local, require(&import.src)),
            ImportSpecifier::Namespace(spec) => (&spec.local, require(&import.src)),
            ImportSpecifier::Named(spec) => {
                let imported = spec
                    .imported
                    .as_ref()
                    .map(export_name)
                    .unwrap_or_else(|| spec.local.sym.as_ref().to_string());
                (&spec.local, Expr::Member(member(require(&import.src), &imported)))
            }
        };
        stmts.push(var_stmt(local, init));
    }
}

fn lower_export_specifier(spec: &ExportSpecifier, src: Option<&Str>, stmts: &mut Vec<Stmt>) {
    match spec {
        ExportSpecifier::Named(spec) => {
            let exported = export_name(spec.exported.as_ref().unwrap_or(&spec.orig));
            let value = match (src, &spec.orig) {
                (Some(src), orig) => Expr::Member(member(require(src), &export_name(orig))),
                (None, ModuleExportName::Ident(orig)) => Expr::Ident(orig.clone()),
                (None, ModuleExportName::Str(_)) => return,
            };
            stmts.push(export_named_stmt(&exported, value));
        }
        ExportSpecifier::Namespace(spec) => {
            if let Some(src) = src {
                stmts.push(export_named_stmt(&export_name(&spec.name), require(src)));
            }
        }
        ExportSpecifier::Default(spec) => {
            if let Some(src) = src {
                stmts.push(export_stmt(
                    &spec.exported,
                    Expr::Member(member(require(src), "default")),
                ));
            }
        }
    }
}

fn default_export_stmt(value: Expr, sole_default: bool) -> Stmt {
    if sole_default {
        assign_stmt(member(ident_expr("module"), "exports"), value)
    } else {
        export_named_stmt("default", value)
    }
}

fn export_stmt(name: &Ident, value: Expr) -> Stmt {
    export_named_stmt(name.sym.as_ref(), value)
}

fn export_named_stmt(name: &str, value: Expr) -> Stmt {
    assign_stmt(member(ident_expr("exports"), name), value)
}

fn ident_expr(name: &str) -> Expr {
    Expr::Ident(Ident::new_no_ctxt(name.into(), DUMMY_SP))
}

/// `obj.prop`, or `obj["prop"]` when `prop` is not an identifier.
fn member(obj: Expr, prop: &str) -> MemberExpr {
    let prop = if is_ident_name(prop) {
        MemberProp::Ident(IdentName::new(prop.into(), DUMMY_SP))
    } else {
        MemberProp::Computed(ComputedPropName {
            span: DUMMY_SP,
            expr: Box::new(Expr::Lit(Lit::Str(Str {
                span: DUMMY_SP,
                value: prop.into(),
                raw: None,
            }))),
        })
    };
    MemberExpr {
        span: DUMMY_SP,
        obj: Box::new(obj),
        prop,
    }
}

fn is_ident_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

fn call(callee: Expr, args: Vec<Expr>) -> Expr {
    Expr::Call(CallExpr {
        span: DUMMY_SP,
        ctxt: Default::default(),
        callee: Callee::Expr(Box::new(callee)),
        args: args
            .into_iter()
            .map(|expr| ExprOrSpread {
                spread: None,
                expr: Box::new(expr),
            })
            .collect(),
        type_args: None,
    })
}

fn require(src: &Str) -> Expr {
    call(
        ident_expr("require"),
        vec![Expr::Lit(Lit::Str(Str {
            span: DUMMY_SP,
            value: src.value.clone(),
            raw: None,
        }))],
    )
}

fn expr_stmt(expr: Expr) -> Stmt {
    Stmt::Expr(ExprStmt {
        span: DUMMY_SP,
        expr: Box::new(expr),
    })
}

fn assign_stmt(target: MemberExpr, value: Expr) -> Stmt {
    expr_stmt(Expr::Assign(AssignExpr {
        span: DUMMY_SP,
        op: AssignOp::Assign,
        left: AssignTarget::Simple(SimpleAssignTarget::Member(target)),
        right: Box::new(value),
    }))
}

fn var_stmt(local: &Ident, init: Expr) -> Stmt {
    Stmt::Decl(Decl::Var(Box::new(VarDecl {
        span: DUMMY_SP,
        ctxt: Default::default(),
        kind: VarDeclKind::Var,
        declare: false,
        decls: vec![VarDeclarator {
            span: DUMMY_SP,
            name: Pat::Ident(BindingIdent {
                id: local.clone(),
                type_ann: None,
            }),
            init: Some(Box::new(init)),
            definite: false,
        }],
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use swc_core::common::{sync::Lrc, FileName, SourceMap};

    use crate::swc_utils::{codegen_config, emit_program, parse_program};

    fn lower(code: &str) -> String {
        let cm: Lrc<SourceMap> = Default::default();
        let fm = cm.new_source_file(FileName::Custom("main.js".into()).into(), code.into());
        let module = match parse_program(&cm, &fm, None, true).unwrap() {
            Program::Module(module) => module,
            Program::Script(_) => unreachable!(),
        };
        let program = Program::Module(lower_to_commonjs(module));
        let code = emit_program(&cm, &program, None, codegen_config(true, 8), None)
            .unwrap()
            .code;
        code.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn sole_default_export_assigns_module_exports() {
        assert_eq!(lower("export default Module;"), "module.exports=Module;");
        assert_eq!(
            lower("export default function hello() {}"),
            "functionhello(){}module.exports=hello;"
        );
    }

    #[test]
    fn named_exports_assign_exports() {
        let code = lower(concat!(
            "export const a = 1, { b } = o; export function f() {} const x = 2; ",
            "export { x as y, x as \"not-ident\" }; export default 3;",
        ));
        let expected = concat!(
            "consta=1,{b}=o;exports.a=a;exports.b=b;",
            "functionf(){}exports.f=f;",
            "constx=2;exports.y=x;exports[\"not-ident\"]=x;",
            "exports.default=3;",
        );
        assert_eq!(code, expected);
    }

    #[test]
    fn imports_become_requires() {
        let code = lower(concat!(
            "import fs from \"fs\"; import * as path from \"path\"; ",
            "import { inspect as i } from \"util\"; import \"zlib\"; export * from \"os\";",
        ));
        let expected = concat!(
            "varfs=require(\"fs\");varpath=require(\"path\");",
            "vari=require(\"util\").inspect;require(\"zlib\");",
            "Object.assign(exports,require(\"os\"));",
        );
        assert_eq!(code, expected);
    }
}
