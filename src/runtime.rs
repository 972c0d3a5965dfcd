//! The field registry.
//!
//! Holds one [`Plan`] per `Config.field` path and is the host that trigger
//! bodies call back into. A plan is borrowed for the whole of one bind or
//! execute, so a trigger that tries to `SET` the field it is validating gets a
//! binding error instead of rewriting the plan underneath itself. Reading a
//! field through `GET` never borrows the plan.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasherDefault;
use std::sync::Arc;

use seahash::SeaHasher;
use serde_json::Value;
use tracing::{debug, info};

use crate::artifact::Artifact;
use crate::compiler::{compile, CompiledSchema};
use crate::declaration::{SliceDecl, TriggerDecl};
use crate::error::{CanfigError, Result};
use crate::plan::{Plan, PlanKind, TriggerEvaluator};
use crate::store::{Row, Store};
use crate::trigger::{Capabilities, Trigger};

struct FieldBinding {
    kind: PlanKind,
    plan: RefCell<Plan>,
}

pub struct Runtime {
    store: Store,
    fields: HashMap<String, FieldBinding, BuildHasherDefault<SeaHasher>>,
    // paths in compilation order
    paths: Vec<String>,
    configs: Vec<String>,
    triggers: Vec<Arc<Trigger>>,
    slices: Vec<SliceDecl>,
    metadata: BTreeMap<String, String>,
}

impl Runtime {
    /// Installs a compiled schema and takes over its plans.
    pub fn new(store: Store, schema: CompiledSchema) -> Result<Self> {
        schema.install(&store)?;
        let mut runtime = Runtime {
            store,
            fields: HashMap::default(),
            paths: Vec::new(),
            configs: schema.configs,
            triggers: Vec::new(),
            slices: Vec::new(),
            metadata: BTreeMap::new(),
        };
        for plan in schema.plans {
            let path = plan.path();
            runtime.fields.insert(
                path.clone(),
                FieldBinding {
                    kind: plan.kind().clone(),
                    plan: RefCell::new(plan),
                },
            );
            runtime.paths.push(path);
        }
        Ok(runtime)
    }

    /// Compiles an artifact, installs its schema, and registers its triggers
    /// and slices. Nothing is installed if any of it fails to compile.
    pub fn load(store: Store, artifact: &Artifact) -> Result<Self> {
        let declarations = &artifact.declarations;
        let schema = compile(declarations)?;
        let triggers = declarations
            .triggers
            .iter()
            .map(Trigger::compile)
            .collect::<Result<Vec<_>>>()?;
        for trigger in &triggers {
            if !schema.configs.iter().any(|c| c == trigger.condition()) {
                return Err(unknown_condition(trigger.name(), trigger.condition()));
            }
        }
        let mut runtime = Runtime::new(store, schema)?;
        for trigger in triggers {
            runtime.register(Arc::new(trigger))?;
        }
        runtime.slices = declarations.slices.clone();
        runtime.metadata = artifact.metadata.clone();
        info!(
            fields = runtime.paths.len(),
            triggers = runtime.triggers.len(),
            slices = runtime.slices.len(),
            "runtime loaded"
        );
        Ok(runtime)
    }

    pub fn register_triggers(&mut self, declarations: &[TriggerDecl]) -> Result<()> {
        for declaration in declarations {
            let trigger = Trigger::compile(declaration)?;
            self.register(Arc::new(trigger))?;
        }
        Ok(())
    }

    /// Attaches a trigger to every field of its condition config.
    pub fn register(&mut self, trigger: Arc<Trigger>) -> Result<usize> {
        if !self.configs.iter().any(|c| c == trigger.condition()) {
            return Err(unknown_condition(trigger.name(), trigger.condition()));
        }
        let prefix = format!("{}.", trigger.condition());
        let mut attached = 0;
        for path in self.paths.iter().filter(|p| p.starts_with(&prefix)) {
            if let Some(binding) = self.fields.get(path) {
                binding.plan.borrow_mut().add_trigger(Arc::clone(&trigger));
                attached += 1;
            }
        }
        info!(trigger = trigger.name(), condition = trigger.condition(), fields = attached, "registered trigger");
        self.triggers.push(trigger);
        Ok(attached)
    }

    pub fn bind(&self, path: &str, value: &Value) -> Result<()> {
        self.binding(path)?
            .plan
            .try_borrow_mut()
            .map_err(|_| in_use(path))?
            .bind(value)
    }

    pub fn execute(&self, path: &str) -> Result<()> {
        self.binding(path)?
            .plan
            .try_borrow_mut()
            .map_err(|_| in_use(path))?
            .execute(&self.store, self)
    }

    /// Rows read by the latest bind of `path`.
    pub fn view(&self, path: &str) -> Result<Vec<Row>> {
        self.binding(path)?
            .plan
            .try_borrow()
            .map_err(|_| in_use(path))?
            .view(&self.store)
    }

    /// Current rows of `path`, whether or not it has been bound.
    pub fn get(&self, path: &str) -> Result<Vec<Row>> {
        let statement = self.binding(path)?.kind.read_statement();
        self.store.query(&statement.sql, &[])
    }

    /// Binds and executes `path` in one go.
    pub fn set(&self, path: &str, value: &Value) -> Result<()> {
        let mut plan = self.binding(path)?.plan.try_borrow_mut().map_err(|_| in_use(path))?;
        plan.bind(value)?;
        plan.execute(&self.store, self)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }
    pub fn configs(&self) -> &[String] {
        &self.configs
    }
    pub fn triggers(&self) -> &[Arc<Trigger>] {
        &self.triggers
    }
    pub fn slices(&self) -> &[SliceDecl] {
        &self.slices
    }
    pub fn slice(&self, name: &str) -> Option<&SliceDecl> {
        self.slices.iter().find(|s| s.name == name)
    }
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }
    pub fn store(&self) -> &Store {
        &self.store
    }

    fn binding(&self, path: &str) -> Result<&FieldBinding> {
        self.fields
            .get(path)
            .ok_or_else(|| CanfigError::UnknownField(path.to_string()))
    }
}

impl TriggerEvaluator for Runtime {
    fn evaluate(&self, trigger: &Trigger) -> Result<()> {
        debug!(trigger = trigger.name(), "evaluating");
        trigger.run(self)
    }
}

impl Capabilities for Runtime {
    fn get(&self, path: &str) -> Result<Value> {
        let rows = Runtime::get(self, path)?;
        Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
    }
    fn set(&self, path: &str, value: &Value) -> Result<()> {
        Runtime::set(self, path, value)
    }
}

fn in_use(path: &str) -> CanfigError {
    CanfigError::Binding(format!("plan for '{}' is already bound and in use", path))
}

fn unknown_condition(trigger: &str, condition: &str) -> CanfigError {
    CanfigError::Compile(format!(
        "trigger '{}' watches '{}', which is not a declared config",
        trigger, condition
    ))
}
