//! `require()` call-site rewriting.
//!
//! Walks a module's syntax tree, records one dependency per
//! `require("<path>")` call and rewrites the call in place to
//! `__tinypack_require__("<module id>")`, so that the emitted chunk can look
//! modules up in its flat registry.

use std::path::Path;

use deno_ast::swc::ast::{CallExpr, Callee, Expr, ExprOrSpread, Lit, Str};
use deno_ast::swc::common::Spanned;
use deno_ast::swc::ecma_visit::{VisitMut, VisitMutWith};

use crate::module::ModuleDescriptor;
use crate::paths::{module_id, request_file_name, resolve_request};

/// Identifier of the dependency-import function in module sources.
pub const REQUIRE_IDENT: &str = "require";

/// Identifier of the registry lookup function provided by the chunk runtime.
pub const RUNTIME_REQUIRE_IDENT: &str = "__tinypack_require__";

pub(crate) struct RequireRewriter<'a> {
    name: &'a str,
    context: &'a Path,
    base_dir: &'a Path,
    default_extension: &'a str,
    dependencies: Vec<ModuleDescriptor>,
}

impl<'a> RequireRewriter<'a> {
    pub fn new(name: &'a str, context: &'a Path, resource: &'a Path, default_extension: &'a str) -> Self {
        Self {
            name,
            context,
            base_dir: resource.parent().unwrap_or(context),
            default_extension,
            dependencies: Vec::new(),
        }
    }

    /// Dependencies in the order their call sites were visited.
    pub fn into_dependencies(self) -> Vec<ModuleDescriptor> {
        self.dependencies
    }

    fn rewrite(&mut self, call: &mut CallExpr) {
        let Callee::Expr(callee) = &mut call.callee else {
            return;
        };
        let Expr::Ident(ident) = &mut **callee else {
            return;
        };
        if &*ident.sym != REQUIRE_IDENT {
            return;
        }

        let Some((request, span)) = call.args.first().and_then(|arg| {
            literal_request(arg).map(|request| (request, arg.expr.span()))
        }) else {
            log::warn!(
                target: "tinypack",
                "Skipping require() without a string literal argument in {}",
                self.base_dir.display()
            );
            return;
        };

        let raw_request = request_file_name(&request, self.default_extension);
        let resource = resolve_request(self.base_dir, &request, self.default_extension);
        let dep_module_id = module_id(self.context, &resource);
        log::debug!(target: "tinypack", "require('{}') -> {}", request, dep_module_id);

        ident.sym = RUNTIME_REQUIRE_IDENT.into();
        call.args = vec![ExprOrSpread {
            spread: None,
            expr: Box::new(Expr::Lit(Lit::Str(Str {
                span,
                value: dep_module_id.clone().into(),
                raw: None,
            }))),
        }];

        self.dependencies.push(ModuleDescriptor {
            name: self.name.to_string(),
            context: self.context.to_path_buf(),
            raw_request,
            module_id: dep_module_id,
            resource,
        });
    }
}

impl VisitMut for RequireRewriter<'_> {
    fn visit_mut_call_expr(&mut self, call: &mut CallExpr) {
        // Pre-order, so dependencies follow source order of the call sites.
        self.rewrite(call);
        call.visit_mut_children_with(self);
    }
}

/// Extracts the request path of a `require` argument written as a string
/// literal or a substitution-free template literal. Values holding a lone
/// surrogate have no UTF-8 form and are not requests.
fn literal_request(arg: &ExprOrSpread) -> Option<String> {
    if arg.spread.is_some() {
        return None;
    }
    let value = match &*arg.expr {
        Expr::Lit(Lit::Str(lit)) => lit.value.as_str(),
        Expr::Tpl(tpl) if tpl.exprs.is_empty() => tpl.quasis.first()?.cooked.as_ref()?.as_str(),
        _ => None,
    };
    value.map(str::to_string)
}
