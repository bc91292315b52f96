//! Rewrite rules for shapes known to be emitted by emcc.
use swc_core::common::DUMMY_SP;
use swc_core::ecma::ast::*;

use crate::enclosure::LIFECYCLE_HOOK;
use crate::helpers::{
    assign_target_member, assign_target_name, call_callee, computed_str_key,
    declarator_name, ident_name, is_function_literal, is_str_index_of,
    simple_assignment,
};

use super::{Action, PatchContext};

/// Top level variables replaced by the enclosure.
const STRIP_VAR_DEFS: &[&str] = &["out", "err"];
/// Top level functions replaced by the enclosure.
const STRIP_FUN_DEFS: &[&str] = &["assert", "abort"];
const STRIP_FUN_PREFIXES: &[&str] = &["nullFunc_"];
/// Prefix of the aliases emcc declares for exported functions.
const ALIAS_PREFIX: &str = "real_";
/// Runtime table holding the wasm exports.
const RUNTIME_TABLE: &str = "asm";
const RUN_FUNCTION: &str = "run";
const NODE_GUARD: &str = "ENVIRONMENT_IS_NODE";

/// The patch rules in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatchRule {
    /// `var NAME = ...` where `NAME` is a global define.
    GlobalDefineOverride,
    /// `var out`, `var err`, `function assert`, `function abort`, `function nullFunc_*`.
    KnownNameStrip,
    /// `var real__name = asm["name"]`.
    AliasShimStrip,
    /// `asm["name"] = function() { ... }`.
    ExportShimStrip,
    /// `NAME = ...` where `NAME` is a global define.
    GlobalDefineAssignmentStrip,
    /// Call the lifecycle hook from `function run()`.
    LifecycleHookInjection,
    /// `process["on"](...)` inside `if (ENVIRONMENT_IS_NODE) { ... }`.
    ProcessSignalStrip,
    /// `if (!Object.getOwnPropertyDescriptor(Module, "x")) Module["x"] = ...`.
    CapabilityProbeStrip,
}

impl PatchRule {
    pub const ALL: [PatchRule; 8] = [
        PatchRule::GlobalDefineOverride,
        PatchRule::KnownNameStrip,
        PatchRule::AliasShimStrip,
        PatchRule::ExportShimStrip,
        PatchRule::GlobalDefineAssignmentStrip,
        PatchRule::LifecycleHookInjection,
        PatchRule::ProcessSignalStrip,
        PatchRule::CapabilityProbeStrip,
    ];

    /// Evaluate the rule against a top level variable declarator.
    pub fn on_declarator(
        &self,
        decl: &VarDeclarator,
        cx: &PatchContext<'_>,
    ) -> Action<VarDeclarator> {
        let name = match declarator_name(decl) {
            Some(name) => name,
            None => return Action::Keep,
        };
        let matched = match self {
            PatchRule::GlobalDefineOverride => cx.global_defs.contains_key(name),
            PatchRule::KnownNameStrip => STRIP_VAR_DEFS.contains(&name),
            PatchRule::AliasShimStrip => {
                name.starts_with(ALIAS_PREFIX)
                    && decl
                        .init
                        .as_ref()
                        .map(|init| is_str_index_of(init, RUNTIME_TABLE))
                        .unwrap_or(false)
            }
            _ => false,
        };
        if matched {
            Action::Delete
        } else {
            Action::Keep
        }
    }

    /// Evaluate the rule against a top level statement.
    pub fn on_stmt(&self, stmt: &Stmt, cx: &PatchContext<'_>) -> Action<Stmt> {
        match self {
            PatchRule::KnownNameStrip => match fn_decl(stmt) {
                Some(f) if is_stripped_fun(f.ident.sym.as_ref()) => Action::Delete,
                _ => Action::Keep,
            },
            PatchRule::ExportShimStrip => match simple_assignment(stmt) {
                Some(assign)
                    if assign_target_member(&assign.left)
                        .map(|m| {
                            ident_name(&m.obj) == Some(RUNTIME_TABLE)
                                && computed_str_key(m).is_some()
                        })
                        .unwrap_or(false)
                        && is_function_literal(&assign.right) =>
                {
                    Action::Delete
                }
                _ => Action::Keep,
            },
            PatchRule::GlobalDefineAssignmentStrip => match simple_assignment(stmt)
                .and_then(|assign| assign_target_name(&assign.left))
            {
                Some(name) if cx.global_defs.contains_key(name) => Action::Delete,
                _ => Action::Keep,
            },
            PatchRule::LifecycleHookInjection => inject_lifecycle_hook(stmt),
            PatchRule::ProcessSignalStrip => strip_process_signals(stmt),
            PatchRule::CapabilityProbeStrip => {
                if is_capability_probe(stmt) {
                    Action::Delete
                } else {
                    Action::Keep
                }
            }
            PatchRule::GlobalDefineOverride | PatchRule::AliasShimStrip => Action::Keep,
        }
    }
}

fn fn_decl(stmt: &Stmt) -> Option<&FnDecl> {
    match stmt {
        Stmt::Decl(Decl::Fn(f)) => Some(f),
        _ => None,
    }
}

fn is_stripped_fun(name: &str) -> bool {
    STRIP_FUN_DEFS.contains(&name)
        || STRIP_FUN_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Expression statement calling the lifecycle hook.
pub(crate) fn lifecycle_hook_call() -> Stmt {
    Stmt::Expr(ExprStmt {
        span: DUMMY_SP,
        expr: Box::new(Expr::Call(CallExpr {
            span: DUMMY_SP,
            ctxt: Default::default(),
            callee: Callee::Expr(Box::new(Expr::Ident(Ident::new_no_ctxt(
                LIFECYCLE_HOOK.into(),
                DUMMY_SP,
            )))),
            args: vec![],
            type_args: None,
        })),
    })
}

fn is_lifecycle_hook_call(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Expr(expr) => call_callee(&expr.expr)
            .and_then(ident_name)
            .map(|name| name == LIFECYCLE_HOOK)
            .unwrap_or(false),
        _ => false,
    }
}

/// Insert the hook after the first `if` of `run()`, e.g. after
/// `if (runDependencies > 0) { return; }`, or at the start of the body.
fn inject_lifecycle_hook(stmt: &Stmt) -> Action<Stmt> {
    let f = match fn_decl(stmt) {
        Some(f) if &*f.ident.sym == RUN_FUNCTION => f,
        _ => return Action::Keep,
    };
    let body = match &f.function.body {
        Some(body) => body,
        None => return Action::Keep,
    };
    if body.stmts.iter().any(is_lifecycle_hook_call) {
        return Action::Keep;
    }
    let index = body
        .stmts
        .iter()
        .position(|s| matches!(s, Stmt::If(_)))
        .map(|i| i + 1)
        .unwrap_or(0);

    let mut patched = f.clone();
    if let Some(body) = patched.function.body.as_mut() {
        body.stmts.insert(index, lifecycle_hook_call());
    }
    Action::Replace(Stmt::Decl(Decl::Fn(patched)))
}

fn is_process_on_call(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Expr(expr) => match call_callee(&expr.expr) {
            Some(Expr::Member(member)) => {
                ident_name(&member.obj) == Some("process")
                    && computed_str_key(member) == Some("on")
            }
            _ => false,
        },
        _ => false,
    }
}

/// Drop the uncaught exception handlers emcc registers under node.
fn strip_process_signals(stmt: &Stmt) -> Action<Stmt> {
    let if_stmt = match stmt {
        Stmt::If(if_stmt) if ident_name(&if_stmt.test) == Some(NODE_GUARD) => {
            if_stmt
        }
        _ => return Action::Keep,
    };
    let block = match &*if_stmt.cons {
        Stmt::Block(block) => block,
        _ => return Action::Keep,
    };
    if !block.stmts.iter().any(is_process_on_call) {
        return Action::Keep;
    }
    let mut block = block.clone();
    block.stmts.retain(|s| !is_process_on_call(s));
    let mut patched = if_stmt.clone();
    patched.cons = Box::new(Stmt::Block(block));
    Action::Replace(Stmt::If(patched))
}

/// `if (!Object.getOwnPropertyDescriptor(Module, "name")) ...`
fn is_capability_probe(stmt: &Stmt) -> bool {
    let test = match stmt {
        Stmt::If(if_stmt) => &*if_stmt.test,
        _ => return false,
    };
    let arg = match test {
        Expr::Unary(unary) if unary.op == UnaryOp::Bang => &*unary.arg,
        _ => return false,
    };
    let call = match arg {
        Expr::Call(call) => call,
        _ => return false,
    };
    let is_probe = match &call.callee {
        Callee::Expr(callee) => match &**callee {
            Expr::Member(member) => matches!(
                &member.prop,
                MemberProp::Ident(prop) if &*prop.sym == "getOwnPropertyDescriptor"
            ),
            _ => false,
        },
        _ => false,
    };
    is_probe
        && call.args.len() > 1
        && call.args[0].spread.is_none()
        && ident_name(&call.args[0].expr) == Some("Module")
}
