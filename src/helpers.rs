//! Collection of helper functions for matching syntax tree shapes.
use swc_core::ecma::ast::*;

/// Find the binding names declared by a variable declaration.
pub fn var_symbol_names(var: &VarDecl) -> Vec<(&VarDeclarator, Vec<&str>)> {
    var.decls
        .iter()
        .map(|decl| {
            let mut names = Vec::new();
            pattern_words(&decl.name, &mut names);
            (decl, names)
        })
        .collect::<Vec<_>>()
}

fn pattern_words<'a>(pat: &'a Pat, names: &mut Vec<&'a str>) {
    match pat {
        Pat::Ident(binding) => names.push(binding.id.sym.as_ref()),
        Pat::Object(obj) => {
            for prop in obj.props.iter() {
                match prop {
                    ObjectPatProp::Assign(entry) => {
                        names.push(entry.key.sym.as_ref());
                    }
                    ObjectPatProp::KeyValue(entry) => {
                        pattern_words(&entry.value, names);
                    }
                    ObjectPatProp::Rest(entry) => {
                        pattern_words(&entry.arg, names);
                    }
                }
            }
        }
        Pat::Array(arr) => {
            for elem in arr.elems.iter().flatten() {
                pattern_words(elem, names);
            }
        }
        Pat::Rest(rest) => pattern_words(&rest.arg, names),
        Pat::Assign(assign) => pattern_words(&assign.left, names),
        _ => {}
    }
}

/// Name of a declarator that binds a plain identifier.
pub fn declarator_name(decl: &VarDeclarator) -> Option<&str> {
    match &decl.name {
        Pat::Ident(binding) => Some(binding.id.sym.as_ref()),
        _ => None,
    }
}

/// Name of a plain identifier expression.
pub fn ident_name(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Ident(ident) => Some(ident.sym.as_ref()),
        _ => None,
    }
}

/// The string key of `obj["key"]`.
pub fn computed_str_key(member: &MemberExpr) -> Option<&str> {
    match &member.prop {
        MemberProp::Computed(computed) => match &*computed.expr {
            Expr::Lit(Lit::Str(s)) => Some(s.value.as_ref()),
            _ => None,
        },
        _ => None,
    }
}

/// Whether `expr` is `obj["..."]` for an object named `obj`.
pub fn is_str_index_of(expr: &Expr, obj: &str) -> bool {
    match expr {
        Expr::Member(member) => {
            ident_name(&member.obj) == Some(obj)
                && computed_str_key(member).is_some()
        }
        _ => false,
    }
}

/// Whether `expr` is a function or arrow function literal.
pub fn is_function_literal(expr: &Expr) -> bool {
    match expr {
        Expr::Fn(_) | Expr::Arrow(_) => true,
        Expr::Paren(paren) => is_function_literal(&paren.expr),
        _ => false,
    }
}

/// The assignment of an `a = b;` expression statement.
pub fn simple_assignment(stmt: &Stmt) -> Option<&AssignExpr> {
    match stmt {
        Stmt::Expr(expr) => match &*expr.expr {
            Expr::Assign(assign) if assign.op == AssignOp::Assign => {
                Some(assign)
            }
            _ => None,
        },
        _ => None,
    }
}

/// Name of the identifier on the left of an assignment.
pub fn assign_target_name(target: &AssignTarget) -> Option<&str> {
    match target {
        AssignTarget::Simple(SimpleAssignTarget::Ident(binding)) => {
            Some(binding.id.sym.as_ref())
        }
        _ => None,
    }
}

/// Member expression on the left of an assignment.
pub fn assign_target_member(target: &AssignTarget) -> Option<&MemberExpr> {
    match target {
        AssignTarget::Simple(SimpleAssignTarget::Member(member)) => {
            Some(member)
        }
        _ => None,
    }
}

/// Callee of a plain call expression.
pub fn call_callee(expr: &Expr) -> Option<&Expr> {
    match expr {
        Expr::Call(call) => match &call.callee {
            Callee::Expr(callee) => Some(&**callee),
            _ => None,
        },
        _ => None,
    }
}
