//! Static export analysis over top-level statements.

use oxc_ast::ast::{
    BindingPattern, Declaration, ExportDefaultDeclarationKind, ImportOrExportKind,
    ModuleExportName, Statement,
};

use crate::call_site::NameFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportBinding {
    pub local_name: String,
    /// `default` for default exports.
    pub exported_name: String,
}

impl ExportBinding {
    fn same(name: &str) -> Self {
        Self {
            local_name: name.to_string(),
            exported_name: name.to_string(),
        }
    }
}

fn export_name(name: &ModuleExportName<'_>) -> String {
    match name {
        ModuleExportName::IdentifierName(id) => id.name.as_str().to_string(),
        ModuleExportName::IdentifierReference(id) => id.name.as_str().to_string(),
        ModuleExportName::StringLiteral(lit) => lit.value.as_str().to_string(),
    }
}

/// `{local, exported}` pairs for a statically analyzable export statement.
///
/// Destructuring exports, re-exports from other modules and type-only exports produce nothing.
/// When `filter` is given, only pairs whose local name passes it are kept.
pub fn parse_static_export_identifiers(
    stmt: &Statement<'_>,
    filter: Option<&NameFilter>,
) -> Vec<ExportBinding> {
    let mut out = Vec::new();
    match stmt {
        Statement::ExportNamedDeclaration(export) => {
            if matches!(export.export_kind, ImportOrExportKind::Type) {
                return out;
            }
            match &export.declaration {
                Some(Declaration::VariableDeclaration(var)) => {
                    for declarator in &var.declarations {
                        if let BindingPattern::BindingIdentifier(id) = &declarator.id {
                            out.push(ExportBinding::same(id.name.as_str()));
                        }
                    }
                }
                Some(Declaration::FunctionDeclaration(func)) => {
                    if let Some(id) = &func.id {
                        out.push(ExportBinding::same(id.name.as_str()));
                    }
                }
                Some(Declaration::ClassDeclaration(class)) => {
                    if let Some(id) = &class.id {
                        out.push(ExportBinding::same(id.name.as_str()));
                    }
                }
                Some(_) => {}
                None if export.source.is_none() => {
                    for spec in &export.specifiers {
                        if matches!(spec.export_kind, ImportOrExportKind::Type) {
                            continue;
                        }
                        let ModuleExportName::IdentifierReference(local) = &spec.local else {
                            continue;
                        };
                        out.push(ExportBinding {
                            local_name: local.name.as_str().to_string(),
                            exported_name: export_name(&spec.exported),
                        });
                    }
                }
                None => {}
            }
        }
        Statement::ExportDefaultDeclaration(export) => {
            let local = match &export.declaration {
                ExportDefaultDeclarationKind::FunctionDeclaration(func) => {
                    func.id.as_ref().map(|id| id.name.as_str())
                }
                ExportDefaultDeclarationKind::ClassDeclaration(class) => {
                    class.id.as_ref().map(|id| id.name.as_str())
                }
                ExportDefaultDeclarationKind::Identifier(id) => Some(id.name.as_str()),
                _ => None,
            };
            if let Some(local) = local {
                out.push(ExportBinding {
                    local_name: local.to_string(),
                    exported_name: "default".to_string(),
                });
            }
        }
        Statement::TSExportAssignment(assign) => {
            if let oxc_ast::ast::Expression::Identifier(id) = &assign.expression {
                out.push(ExportBinding {
                    local_name: id.name.as_str().to_string(),
                    exported_name: "default".to_string(),
                });
            }
        }
        _ => {}
    }
    if let Some(filter) = filter {
        out.retain(|binding| filter.matches(&binding.local_name));
    }
    out
}
