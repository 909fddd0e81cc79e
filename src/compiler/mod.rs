//! Graph compiler
//!
//! Turns an IR tree plus concrete arguments into a flat [`RecordTable`].
//!
//! Ids are handed out depth-first in pre-order starting at 1, so a record's id
//! is always fixed before any of its descendants. Each step compiles to one
//! or more "heads" (several when a sequence flattens into its enclosing one);
//! consecutive heads under the same parent are chained through `next_id`.
//!
//! Compilation is pure: the registry is only read, and the same inputs always
//! produce the same table.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value as JsonValue;
use tracing::debug;

use crate::ir::{call, ArgExpr, ArgSource, Definition, ListBinding, Node};
use crate::registry::{Registry, Resolved};
use crate::types::{ArgKey, Args, Record, RecordTable, BATCH, BATCH_CHILD, SUPERWORKER};

mod error;
mod scope;

#[cfg(test)]
mod tests;

pub use error::{CompileError, CompileResult};
use scope::Scope;

/// Compile `node` with `args` bound as its top-level parameters.
///
/// A body made of several top-level steps gets a structural `superworker`
/// root holding those steps; a single step is its own root.
pub fn compile(node: &Node, args: &Args, registry: &Registry) -> CompileResult<RecordTable> {
    resolve_names(node, registry)?;

    let mut compiler = Compiler::new(registry);
    let scope = Scope::from_args(args);

    if head_count(node) > 1 {
        let (keys, values): (Vec<ArgKey>, Vec<JsonValue>) = scope
            .iter()
            .map(|(k, v)| (ArgKey::Name(k.clone()), v.clone()))
            .unzip();
        let root = compiler.push(SUPERWORKER, keys, values, None);
        let heads = compiler.compile_body(node, Some(root), &scope)?;
        compiler.set_children(root, vec![heads[0]]);
    } else {
        compiler.compile_body(node, None, &scope)?;
    }

    Ok(compiler.finish())
}

/// Compile the registered superworker `name` as the graph root, binding
/// `args` to its parameters by name.
pub fn compile_definition(name: &str, args: &Args, registry: &Registry) -> CompileResult<RecordTable> {
    let definition = registry
        .get(name)
        .ok_or_else(|| CompileError::unknown_worker(name))?;

    let root = definition
        .parameters
        .iter()
        .fold(call(name), |builder, param| builder.param(param.as_str()))
        .build();

    compile(&root, args, registry)
}

/* ===================== Name resolution ===================== */

/// Check every name reachable from `node` before allocating anything, so an
/// unknown worker fails the compilation even under an empty batch.
fn resolve_names(node: &Node, registry: &Registry) -> CompileResult<()> {
    let mut expanded = HashSet::new();
    resolve_in(node, registry, &mut expanded)
}

fn resolve_in<'r>(
    node: &'r Node,
    registry: &'r Registry,
    expanded: &mut HashSet<&'r str>,
) -> CompileResult<()> {
    let mut result: CompileResult<()> = Ok(());
    let mut definitions = Vec::new();

    node.walk(&mut |n| {
        if result.is_err() {
            return;
        }
        match n {
            Node::Leaf { worker, .. } if !registry.has_worker(worker) => {
                result = Err(CompileError::unknown_worker(worker.as_str()));
            }
            Node::Call { name, .. } => match registry.resolve(name) {
                None => result = Err(CompileError::unknown_worker(name.as_str())),
                Some(Resolved::Superworker(definition)) => definitions.push(definition),
                Some(Resolved::Worker(_)) => {}
            },
            _ => {}
        }
    });
    result?;

    for definition in definitions {
        if expanded.insert(definition.name.as_str()) {
            resolve_in(&definition.body, registry, expanded)?;
        }
    }
    Ok(())
}

/// Number of records a node contributes to its enclosing chain
fn head_count(node: &Node) -> usize {
    match node {
        Node::Sequence { steps, .. } => steps.iter().map(head_count).sum(),
        _ => 1,
    }
}

/* ===================== Compiler ===================== */

struct Compiler<'r> {
    registry: &'r Registry,
    records: BTreeMap<u32, Record>,
    last_id: u32,
    /// Superworkers currently being expanded, outermost first
    expanding: Vec<String>,
}

impl<'r> Compiler<'r> {
    fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            records: BTreeMap::new(),
            last_id: 0,
            expanding: Vec::new(),
        }
    }

    fn finish(self) -> RecordTable {
        debug!(records = self.records.len(), "compiled graph");
        self.records.into_values().collect()
    }

    /// Allocate the next id and store its record
    fn push(
        &mut self,
        worker_class: &str,
        arg_keys: Vec<ArgKey>,
        arg_values: Vec<JsonValue>,
        parent_id: Option<u32>,
    ) -> u32 {
        self.last_id += 1;
        let id = self.last_id;
        debug!(id, worker_class, parent_id, "allocated record");

        self.records.insert(
            id,
            Record {
                id,
                worker_class: worker_class.to_string(),
                arg_keys,
                arg_values,
                parent_id,
                children_ids: None,
                next_id: None,
            },
        );
        id
    }

    fn set_children(&mut self, id: u32, children: Vec<u32>) {
        if let Some(record) = self.records.get_mut(&id) {
            record.children_ids = (!children.is_empty()).then_some(children);
        }
    }

    fn set_next(&mut self, id: u32, next: u32) {
        if let Some(record) = self.records.get_mut(&id) {
            record.next_id = Some(next);
        }
    }

    /// Compile a body under `parent` and chain its heads. Never returns an
    /// empty list.
    fn compile_body(
        &mut self,
        node: &Node,
        parent: Option<u32>,
        scope: &Scope,
    ) -> CompileResult<Vec<u32>> {
        let mut heads = Vec::new();
        self.compile_steps(node, parent, scope, &mut heads)?;

        for pair in heads.windows(2) {
            self.set_next(pair[0], pair[1]);
        }
        Ok(heads)
    }

    fn compile_steps(
        &mut self,
        node: &Node,
        parent: Option<u32>,
        scope: &Scope,
        heads: &mut Vec<u32>,
    ) -> CompileResult<()> {
        match node {
            Node::Sequence { steps, .. } => {
                if steps.is_empty() {
                    return Err(CompileError::malformed("sequence has no steps"));
                }
                for step in steps {
                    self.compile_steps(step, parent, scope, heads)?;
                }
                Ok(())
            }
            Node::Leaf { worker, args, .. } => {
                if !self.registry.has_worker(worker) {
                    return Err(CompileError::unknown_worker(worker.as_str()));
                }
                heads.push(self.compile_worker(worker, args, None, parent, scope)?);
                Ok(())
            }
            Node::Call {
                name, args, nested, ..
            } => {
                let nested = nested.as_deref();
                let registry = self.registry;
                let id = match registry.resolve(name) {
                    Some(Resolved::Superworker(definition)) => {
                        self.compile_superworker(definition, args, nested, parent, scope)?
                    }
                    Some(Resolved::Worker(_)) => {
                        self.compile_worker(name, args, nested, parent, scope)?
                    }
                    None => return Err(CompileError::unknown_worker(name.as_str())),
                };
                heads.push(id);
                Ok(())
            }
            Node::Batch { bindings, body, .. } => {
                heads.push(self.compile_batch(bindings, body, parent, scope)?);
                Ok(())
            }
        }
    }

    fn compile_worker(
        &mut self,
        worker: &str,
        args: &[ArgExpr],
        nested: Option<&Node>,
        parent: Option<u32>,
        scope: &Scope,
    ) -> CompileResult<u32> {
        let (keys, values) = evaluate(args, scope)?;
        let id = self.push(worker, keys, values, parent);

        if let Some(nested) = nested {
            let heads = self.compile_body(nested, Some(id), scope)?;
            self.set_children(id, vec![heads[0]]);
        }
        Ok(id)
    }

    fn compile_superworker(
        &mut self,
        definition: &Definition,
        args: &[ArgExpr],
        nested: Option<&Node>,
        parent: Option<u32>,
        scope: &Scope,
    ) -> CompileResult<u32> {
        if args.len() != definition.parameters.len() {
            return Err(CompileError::ArityMismatch {
                name: definition.name.clone(),
                expected: definition.parameters.len(),
                found: args.len(),
            });
        }
        if self.expanding.contains(&definition.name) {
            return Err(CompileError::recursive(&self.expanding, &definition.name));
        }

        let (keys, values) = evaluate(args, scope)?;

        let mut inner = Scope::new();
        for (param, value) in definition.parameters.iter().zip(&values) {
            inner.bind(param.clone(), value.clone());
        }

        let id = self.push(&definition.name, keys, values, parent);

        self.expanding.push(definition.name.clone());
        let expanded = self.compile_body(&definition.body, Some(id), &inner);
        self.expanding.pop();
        let expanded = expanded?;

        // The call-site block runs after the expansion, under the caller's scope
        if let Some(nested) = nested {
            let tail = self.compile_body(nested, Some(id), scope)?;
            if let Some(&last) = expanded.last() {
                self.set_next(last, tail[0]);
            }
        }

        self.set_children(id, vec![expanded[0]]);
        Ok(id)
    }

    fn compile_batch(
        &mut self,
        bindings: &[ListBinding],
        body: &Node,
        parent: Option<u32>,
        scope: &Scope,
    ) -> CompileResult<u32> {
        if bindings.is_empty() {
            return Err(CompileError::malformed("batch has no list bindings"));
        }

        let mut lists = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let value = scope.lookup(&binding.list)?;
            let list = value.as_array().ok_or_else(|| CompileError::NotAList {
                name: binding.list.clone(),
                found: json_type(value).to_string(),
            })?;
            lists.push(list);
        }

        let expected = lists[0].len();
        for (binding, list) in bindings.iter().zip(&lists).skip(1) {
            if list.len() != expected {
                return Err(CompileError::ArgumentCountMismatch {
                    list: binding.list.clone(),
                    expected,
                    found: list.len(),
                });
            }
        }

        let mapping: BTreeMap<String, String> = bindings
            .iter()
            .map(|b| (b.list.clone(), b.element.clone()))
            .collect();
        let mapping_value = JsonValue::Object(
            mapping
                .iter()
                .map(|(list, element)| (list.clone(), JsonValue::String(element.clone())))
                .collect(),
        );
        let id = self.push(
            BATCH,
            vec![ArgKey::Bindings(mapping)],
            vec![mapping_value],
            parent,
        );

        let element_keys: Vec<ArgKey> = bindings
            .iter()
            .map(|b| ArgKey::Name(b.element.clone()))
            .collect();

        let mut children = Vec::with_capacity(expected);
        for k in 0..expected {
            let values: Vec<JsonValue> = lists.iter().map(|list| list[k].clone()).collect();

            let mut branch_scope = scope.child();
            for (binding, value) in bindings.iter().zip(&values) {
                branch_scope.bind(binding.element.clone(), value.clone());
            }

            let child = self.push(BATCH_CHILD, element_keys.clone(), values, Some(id));
            self.compile_body(body, Some(child), &branch_scope)?;
            children.push(child);
        }

        self.set_children(id, children);
        Ok(id)
    }
}

/// Evaluate argument expressions against `scope`
fn evaluate(args: &[ArgExpr], scope: &Scope) -> CompileResult<(Vec<ArgKey>, Vec<JsonValue>)> {
    let mut keys = Vec::with_capacity(args.len());
    let mut values = Vec::with_capacity(args.len());

    for arg in args {
        let value = match &arg.source {
            ArgSource::Param(name) => scope.lookup(name)?.clone(),
            ArgSource::Literal(value) => value.clone(),
        };
        keys.push(ArgKey::Name(arg.key.clone()));
        values.push(value);
    }
    Ok((keys, values))
}

fn json_type(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
