//! Patch the syntax tree of the emcc output.
//!
//! The patcher walks the top level of the compiled module once and
//! offers every statement (and every declarator of a top level variable
//! declaration) to the rules in order. The first rule that does not
//! answer `Action::Keep` decides what happens to the node.
use swc_core::ecma::ast::*;
use swc_core::ecma::visit::VisitMut;

use crate::fragment::is_enclosure_name;
use crate::options::GlobalDefs;

mod rules;

pub use rules::PatchRule;

/// What to do with a visited node.
#[derive(Debug, Clone, PartialEq)]
pub enum Action<T> {
    Keep,
    Delete,
    Replace(T),
    InsertAfter(T),
}

/// Inputs available to a rule.
#[derive(Debug, Clone, Copy)]
pub struct PatchContext<'a> {
    pub global_defs: &'a GlobalDefs,
    /// Name of the fragment being patched.
    pub file: &'a str,
}

#[derive(Debug, Clone)]
pub struct PatchOptions {
    /// Enable `PatchRule::CapabilityProbeStrip`.
    pub strip_capability_probes: bool,
}

impl Default for PatchOptions {
    fn default() -> Self {
        Self {
            strip_capability_probes: true,
        }
    }
}

/// Visitor applying the patch rules to the top level of a fragment.
pub struct Patcher<'a> {
    rules: Vec<PatchRule>,
    global_defs: &'a GlobalDefs,
    file: &'a str,
    applied: Vec<PatchRule>,
}

impl<'a> Patcher<'a> {
    pub fn new(global_defs: &'a GlobalDefs, file: &'a str, options: &PatchOptions) -> Self {
        let rules = PatchRule::ALL
            .iter()
            .copied()
            .filter(|rule| {
                options.strip_capability_probes
                    || *rule != PatchRule::CapabilityProbeStrip
            })
            .collect();
        Self {
            rules,
            global_defs,
            file,
            applied: Vec::new(),
        }
    }

    /// Rules that fired, once per rewritten node.
    pub fn applied(&self) -> &[PatchRule] {
        &self.applied
    }

    fn context(&self) -> PatchContext<'a> {
        PatchContext {
            global_defs: self.global_defs,
            file: self.file,
        }
    }

    fn record(&mut self, rule: PatchRule, what: &str) {
        log::debug!("{:?}: {} in {}", rule, what, self.file);
        self.applied.push(rule);
    }

    fn patch_items<T: TopLevelItem>(&mut self, items: &mut Vec<T>) {
        if is_enclosure_name(self.file) {
            return;
        }
        let old = std::mem::take(items);
        items.reserve(old.len());
        for mut item in old {
            let action = match item.as_stmt_mut() {
                Some(stmt) => self.patch_stmt(stmt),
                None => Action::Keep,
            };
            match action {
                Action::Keep => items.push(item),
                Action::Delete => {}
                Action::Replace(stmt) => items.push(T::from_stmt(stmt)),
                Action::InsertAfter(stmt) => {
                    items.push(item);
                    items.push(T::from_stmt(stmt));
                }
            }
        }
    }

    fn patch_stmt(&mut self, stmt: &mut Stmt) -> Action<Stmt> {
        if let Stmt::Decl(Decl::Var(var)) = stmt {
            if self.patch_declarators(var) && var.decls.is_empty() {
                return Action::Replace(Stmt::Empty(EmptyStmt { span: var.span }));
            }
            return Action::Keep;
        }

        let cx = self.context();
        let found = self.rules.iter().find_map(|rule| match rule.on_stmt(stmt, &cx) {
            Action::Keep => None,
            action => Some((*rule, action)),
        });
        match found {
            Some((rule, action)) => {
                self.record(rule, stmt_label(stmt));
                action
            }
            None => Action::Keep,
        }
    }

    /// Returns whether any declarator was rewritten.
    fn patch_declarators(&mut self, var: &mut VarDecl) -> bool {
        let cx = self.context();
        let old = std::mem::take(&mut var.decls);
        let mut changed = false;
        for decl in old {
            let found = self.rules.iter().find_map(|rule| {
                match rule.on_declarator(&decl, &cx) {
                    Action::Keep => None,
                    action => Some((*rule, action)),
                }
            });
            let (rule, action) = match found {
                Some(found) => found,
                None => {
                    var.decls.push(decl);
                    continue;
                }
            };
            changed = true;
            let name = crate::helpers::declarator_name(&decl)
                .unwrap_or("<pattern>")
                .to_string();
            self.record(rule, &format!("var {}", name));
            match action {
                Action::Keep => var.decls.push(decl),
                Action::Delete => {}
                Action::Replace(new_decl) => var.decls.push(new_decl),
                Action::InsertAfter(new_decl) => {
                    var.decls.push(decl);
                    var.decls.push(new_decl);
                }
            }
        }
        changed
    }
}

fn stmt_label(stmt: &Stmt) -> &'static str {
    match stmt {
        Stmt::Decl(Decl::Fn(_)) => "function",
        Stmt::If(_) => "if statement",
        Stmt::Expr(_) => "expression statement",
        _ => "statement",
    }
}

impl VisitMut for Patcher<'_> {
    fn visit_mut_script(&mut self, n: &mut Script) {
        self.patch_items(&mut n.body);
    }

    fn visit_mut_module(&mut self, n: &mut Module) {
        self.patch_items(&mut n.body);
    }
}

/// Statements of a script and items of a module.
trait TopLevelItem: Sized {
    fn as_stmt_mut(&mut self) -> Option<&mut Stmt>;
    fn from_stmt(stmt: Stmt) -> Self;
}

impl TopLevelItem for Stmt {
    fn as_stmt_mut(&mut self) -> Option<&mut Stmt> {
        Some(self)
    }

    fn from_stmt(stmt: Stmt) -> Self {
        stmt
    }
}

impl TopLevelItem for ModuleItem {
    fn as_stmt_mut(&mut self) -> Option<&mut Stmt> {
        match self {
            ModuleItem::Stmt(stmt) => Some(stmt),
            ModuleItem::ModuleDecl(_) => None,
        }
    }

    fn from_stmt(stmt: Stmt) -> Self {
        ModuleItem::Stmt(stmt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use swc_core::common::{sync::Lrc, FileName, SourceMap};
    use swc_core::ecma::visit::VisitMutWith;

    use crate::swc_utils::{codegen_config, emit_program, parse_program};

    const EMCC: &str = "emcc/hello.js";

    fn defs(names: &[&str]) -> GlobalDefs {
        names
            .iter()
            .map(|n| (n.to_string(), Value::Bool(true)))
            .collect()
    }

    fn parse(code: &str) -> (Lrc<SourceMap>, Program) {
        let cm: Lrc<SourceMap> = Default::default();
        let fm = cm.new_source_file(FileName::Custom(EMCC.into()).into(), code.into());
        let program = parse_program(&cm, &fm, None, false).unwrap();
        (cm, program)
    }

    fn patch_with(
        code: &str,
        global_defs: &GlobalDefs,
        file: &str,
        options: &PatchOptions,
    ) -> (String, Vec<PatchRule>) {
        let (cm, mut program) = parse(code);
        let mut patcher = Patcher::new(global_defs, file, options);
        program.visit_mut_with(&mut patcher);
        let applied = patcher.applied().to_vec();
        let out = emit_program(&cm, &program, None, codegen_config(true, 8), None)
            .unwrap()
            .code;
        (squash(&out), applied)
    }

    fn squash(code: &str) -> String {
        code.chars().filter(|c| !c.is_whitespace()).collect()
    }

    fn patch(code: &str, global_defs: &GlobalDefs) -> String {
        patch_with(code, global_defs, EMCC, &Default::default()).0
    }

    #[test]
    fn global_define_removes_declarator() {
        let out = patch(
            "var ENVIRONMENT_IS_NODE = typeof process == 'object', keep = 1;",
            &defs(&["ENVIRONMENT_IS_NODE"]),
        );
        assert_eq!(out, "varkeep=1;");
    }

    #[test]
    fn emptied_declaration_becomes_empty_statement() {
        let (out, applied) = patch_with(
            "var DEBUG = 0;\nfoo();",
            &defs(&["DEBUG"]),
            EMCC,
            &Default::default(),
        );
        assert_eq!(out, ";foo();");
        assert_eq!(applied, vec![PatchRule::GlobalDefineOverride]);
    }

    #[test]
    fn known_names_are_stripped() {
        let out = patch(
            "var out = 1; var err = 2, x = 3;\n\
             function assert(x) {}\n\
             function abort(what) { throw what; }\n\
             function nullFunc_ii(x) { abort(x); }\n\
             function keepme() {}",
            &defs(&[]),
        );
        assert!(!out.contains("out"));
        assert!(!out.contains("err"));
        assert!(!out.contains("assert"));
        assert!(!out.contains("nullFunc_ii"));
        assert!(!out.contains("abort"));
        assert!(out.contains("varx=3;"));
        assert!(out.contains("functionkeepme(){}"));
    }

    #[test]
    fn asm_shims_are_stripped() {
        let out = patch(
            "var real__hello = asm[\"_hello\"];\n\
             asm[\"_hello\"] = function() { return real__hello.apply(null, arguments); };\n\
             var real_other = foo[\"x\"];\n\
             asm.direct = function() {};",
            &defs(&[]),
        );
        assert!(!out.contains("real__hello"));
        assert!(out.contains("varreal_other=foo[\"x\"];"));
        assert!(out.contains("asm.direct=function(){};"));
    }

    #[test]
    fn global_define_assignments_are_stripped() {
        let out = patch(
            "ENVIRONMENT_IS_WEB = typeof window === 'object';\n\
             other = 1;\n\
             ENVIRONMENT_IS_WEB += 1;",
            &defs(&["ENVIRONMENT_IS_WEB"]),
        );
        assert_eq!(out, "other=1;ENVIRONMENT_IS_WEB+=1;");
    }

    #[test]
    fn lifecycle_hook_goes_after_first_if() {
        let out = patch(
            "function run(args) {\n\
               args = args || [];\n\
               if (runDependencies > 0) { return; }\n\
               preRun();\n\
               if (ABORT) return;\n\
             }",
            &defs(&[]),
        );
        let expected = concat!(
            "functionrun(args){args=args||[];",
            "if(runDependencies>0){return;}",
            "__wasmcUpdateAPI();preRun();if(ABORT)return;}",
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn lifecycle_hook_at_start_without_if() {
        let out = patch("function run() { preRun(); doRun(); }", &defs(&[]));
        assert_eq!(out, "functionrun(){__wasmcUpdateAPI();preRun();doRun();}");
    }

    #[test]
    fn lifecycle_hook_is_inserted_once() {
        let (cm, mut program) = parse("function run() { if (x) return; go(); }");
        let global_defs = defs(&[]);
        for _ in 0..2 {
            let mut patcher = Patcher::new(&global_defs, EMCC, &Default::default());
            program.visit_mut_with(&mut patcher);
        }
        let out = emit_program(&cm, &program, None, codegen_config(true, 8), None)
            .unwrap()
            .code;
        assert_eq!(out.matches("__wasmcUpdateAPI()").count(), 1);
    }

    #[test]
    fn process_signal_handlers_are_stripped() {
        let out = patch(
            "if (ENVIRONMENT_IS_NODE) {\n\
               process[\"on\"](\"uncaughtException\", function(ex) { throw ex; });\n\
               process[\"on\"](\"unhandledRejection\", abort);\n\
               Module[\"inspect\"] = function() { return \"[Emscripten Module object]\"; };\n\
             }\n\
             process[\"on\"](\"exit\", f);",
            &defs(&[]),
        );
        let expected = concat!(
            "if(ENVIRONMENT_IS_NODE){",
            "Module[\"inspect\"]=function(){return\"[EmscriptenModuleobject]\";};}",
            "process[\"on\"](\"exit\",f);",
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn only_string_indexed_process_on_is_stripped() {
        let (out, applied) = patch_with(
            "if (ENVIRONMENT_IS_NODE) {\n\
               process.on(\"exit\", onExit);\n\
               process[\"on\"](\"unhandledRejection\", abort);\n\
             }",
            &defs(&[]),
            EMCC,
            &Default::default(),
        );
        assert_eq!(out, "if(ENVIRONMENT_IS_NODE){process.on(\"exit\",onExit);}");
        assert_eq!(applied, vec![PatchRule::ProcessSignalStrip]);

        let (out, applied) = patch_with(
            "if (ENVIRONMENT_IS_NODE) { process.on(\"exit\", onExit); }",
            &defs(&[]),
            EMCC,
            &Default::default(),
        );
        assert_eq!(out, "if(ENVIRONMENT_IS_NODE){process.on(\"exit\",onExit);}");
        assert!(applied.is_empty());
    }

    #[test]
    fn capability_probe_rule_is_configurable() {
        let code = "if (!Object.getOwnPropertyDescriptor(Module, \"ENV\")) \
                    Module[\"ENV\"] = function() { abort(\"'ENV' was not exported\"); };";
        let (out, applied) = patch_with(code, &defs(&[]), EMCC, &Default::default());
        assert_eq!(out, "");
        assert_eq!(applied, vec![PatchRule::CapabilityProbeStrip]);

        let keep = PatchOptions {
            strip_capability_probes: false,
        };
        let (out, applied) = patch_with(code, &defs(&[]), EMCC, &keep);
        assert!(out.contains("getOwnPropertyDescriptor"));
        assert!(applied.is_empty());
    }

    #[test]
    fn enclosure_fragments_are_untouched() {
        let code = "var out = 1; function assert() {}";
        let (out, applied) =
            patch_with(code, &defs(&[]), "<wasmcpre>", &Default::default());
        assert_eq!(out, "varout=1;functionassert(){}");
        assert!(applied.is_empty());
    }

    #[test]
    fn nested_definitions_are_kept() {
        let out = patch(
            "function f() { var out = 1; function assert() {} DEBUG = 2; }",
            &defs(&["DEBUG"]),
        );
        assert_eq!(out, "functionf(){varout=1;functionassert(){}DEBUG=2;}");
    }
}
