use std::sync::Arc;

use cg_trace::module::Module;
use indexmap::IndexMap;

use crate::result::{GraphError, GraphResult};
use crate::tokenize::split_call;

/// Lookup from dotted module names (`Root.child.grandchild`) to the modules of a model's hierarchy.
///
/// The root itself is registered under its type name, which is also the first segment of every trace scope.
#[derive(Debug, Clone)]
pub struct ModuleIndex {
    root_name: String,
    modules: IndexMap<String, Arc<Module>>,
}

impl ModuleIndex {
    pub fn new(root: &Arc<Module>) -> Self {
        let root_name = root.type_name().to_owned();

        let modules = root
            .named_modules()
            .into_iter()
            .map(|(path, module)| {
                let name = if path.is_empty() {
                    root_name.clone()
                } else {
                    format!("{}.{}", root_name, path)
                };
                (name, module)
            })
            .collect();

        ModuleIndex { root_name, modules }
    }

    pub fn root_name(&self) -> &str {
        &self.root_name
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Module>> {
        self.modules.get(name)
    }

    /// The name a module instance is registered under, if it is part of this hierarchy.
    pub fn name_of(&self, module: &Arc<Module>) -> Option<&str> {
        self.modules
            .iter()
            .find(|(_, m)| Arc::ptr_eq(m, module))
            .map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<Module>)> {
        self.modules.iter().map(|(name, module)| (name.as_str(), module))
    }

    /// Find the module an instruction with the given scope ran in.
    /// Returns `None` for functional instructions, whose scope is only the root.
    pub fn resolve_scope(&self, line: usize, scope: &str) -> GraphResult<Option<(String, Arc<Module>)>> {
        let name = match scope_to_module_name(line, scope)? {
            None => return Ok(None),
            Some(name) => name,
        };

        match self.modules.get(&name) {
            Some(module) => Ok(Some((name, module.clone()))),
            None => Err(GraphError::UnknownModule { line, name }),
        }
    }
}

/// Convert a trace scope `Root/Type[a]/Type[b]` into the dotted module name `Root.a.b`.
/// A scope consisting of only the root segment has no module name.
pub fn scope_to_module_name(line: usize, scope: &str) -> GraphResult<Option<String>> {
    let invalid = || GraphError::InvalidScope {
        line,
        scope: scope.to_owned(),
    };

    let mut segments = scope.split('/');
    let root = segments.next().map(str::trim).filter(|s| !s.is_empty()).ok_or_else(invalid)?;
    if root.contains(|c: char| c == '[' || c == ']') {
        return Err(invalid());
    }

    let mut name = root.to_owned();
    let mut has_children = false;
    for segment in segments {
        let (_, child) = split_call(segment.trim(), '[', ']').ok_or_else(invalid)?;
        if child.is_empty() || child.contains(|c: char| c == '.' || c == '[' || c == ']') {
            return Err(invalid());
        }

        name.push('.');
        name.push_str(child);
        has_children = true;
    }

    Ok(has_children.then_some(name))
}
