// src/hooks/registry.rs

//! Index of registered hooks by owner and binding.
//!
//! For every binding the registry answers "which hooks run, in what
//! order": ascending by the hook's declared order for that binding, ties
//! broken by name. Missing indices are empty, not errors.

use std::collections::HashMap;

use super::{binding_order, Binding, GlobalHook, ModuleHook};

#[derive(Debug, Default)]
pub struct HookRegistry {
    global_by_name: HashMap<String, GlobalHook>,
    /// binding -> hook names, kept sorted
    global_order: HashMap<Binding, Vec<String>>,
    module_by_name: HashMap<String, ModuleHook>,
    /// module name -> binding -> hook names, kept sorted
    module_order: HashMap<String, HashMap<Binding, Vec<String>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_global(&mut self, hook: GlobalHook) {
        for hb in &hook.bindings {
            self.global_order.entry(hb.binding).or_default().push(hook.name.clone());
        }
        self.global_by_name.insert(hook.name.clone(), hook);
        self.resort_global();
    }

    /// Register all hooks of one module, replacing any previous entry
    pub fn register_module_hooks(&mut self, module: &str, hooks: Vec<ModuleHook>) {
        self.remove_module(module);
        let mut order: HashMap<Binding, Vec<String>> = HashMap::new();
        for hook in hooks {
            for hb in &hook.bindings {
                order.entry(hb.binding).or_default().push(hook.name.clone());
            }
            self.module_by_name.insert(hook.name.clone(), hook);
        }
        for (binding, names) in order.iter_mut() {
            self.sort_module_names(names, *binding);
        }
        self.module_order.insert(module.to_string(), order);
    }

    /// Whether a module already has registered hooks
    pub fn has_module(&self, module: &str) -> bool {
        self.module_order.contains_key(module)
    }

    /// Drop a module's hooks from all indices
    pub fn remove_module(&mut self, module: &str) {
        if let Some(order) = self.module_order.remove(module) {
            for names in order.values() {
                for name in names {
                    self.module_by_name.remove(name);
                }
            }
        }
    }

    pub fn global_hook(&self, name: &str) -> Option<&GlobalHook> {
        self.global_by_name.get(name)
    }

    pub fn module_hook(&self, name: &str) -> Option<&ModuleHook> {
        self.module_by_name.get(name)
    }

    /// Global hook names bound to `binding`, in execution order
    pub fn global_hooks_in_order(&self, binding: Binding) -> Vec<String> {
        self.global_order.get(&binding).cloned().unwrap_or_default()
    }

    /// Module hook names bound to `binding` for one module, in execution
    /// order
    pub fn module_hooks_in_order(&self, module: &str, binding: Binding) -> Vec<String> {
        self.module_order
            .get(module)
            .and_then(|order| order.get(&binding))
            .cloned()
            .unwrap_or_default()
    }

    fn resort_global(&mut self) {
        let by_name = &self.global_by_name;
        for (binding, names) in self.global_order.iter_mut() {
            let binding = *binding;
            names.sort_by(|a, b| {
                let order_of = |name: &String| {
                    by_name
                        .get(name)
                        .and_then(|h| binding_order(&h.bindings, binding))
                        .unwrap_or(0)
                };
                order_of(a).cmp(&order_of(b)).then_with(|| a.cmp(b))
            });
        }
    }

    fn sort_module_names(&self, names: &mut [String], binding: Binding) {
        names.sort_by(|a, b| {
            let order_of = |name: &String| {
                self.module_by_name
                    .get(name)
                    .and_then(|h| binding_order(&h.bindings, binding))
                    .unwrap_or(0)
            };
            order_of(a).cmp(&order_of(b)).then_with(|| a.cmp(b))
        });
    }
}
