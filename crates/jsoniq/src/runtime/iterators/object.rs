//! Object and array construction, navigation and projection.

use std::collections::HashSet;
use std::sync::Arc;

use crate::item::{Item, ObjectMap, Sequence};
use crate::runtime::context::DynamicContext;
use crate::runtime::error::{Error, ErrorCode};
use crate::runtime::iterator::{BoxedIterator, Metadata, Operator, OperatorIterator, Result, VariableSet};

/// `{ k1 : v1, k2 : v2 }`. An empty value becomes `null`, several items are
/// wrapped into an array.
pub struct ObjectConstructor {
    pairs: Vec<(BoxedIterator, BoxedIterator)>,
    context: Option<Arc<DynamicContext>>,
}

impl Operator for ObjectConstructor {
    type Output = Item;

    fn name(&self) -> &'static str {
        "object-constructor"
    }

    fn start(&mut self, context: &Arc<DynamicContext>) -> Result<()> {
        self.context = Some(Arc::clone(context));
        Ok(())
    }

    fn produce(&mut self) -> Result<Option<Item>> {
        let Some(context) = self.context.take() else {
            return Ok(None);
        };
        let mut map = ObjectMap::with_capacity(self.pairs.len());
        for (key_expr, value_expr) in &mut self.pairs {
            let key = single_string_key(key_expr.materialize(&context)?)?;
            let mut values = value_expr.materialize(&context)?;
            let value = match values.len() {
                0 => Item::Null,
                1 => values.swap_remove(0),
                _ => Item::array(values),
            };
            if map.contains_key(&key) {
                return Err(Error::from_code(
                    ErrorCode::JNDY0003,
                    format!("duplicate key \"{key}\" in object constructor"),
                ));
            }
            map.insert(key, value);
        }
        Ok(Some(Item::object(map)))
    }

    fn stop(&mut self) {
        self.context = None;
    }

    fn dependencies(&self, out: &mut VariableSet) {
        for (k, v) in &self.pairs {
            k.collect_dependencies(out);
            v.collect_dependencies(out);
        }
    }
}

fn single_string_key(mut keys: Sequence) -> Result<String> {
    if keys.len() != 1 {
        return Err(Error::unexpected_type(format!(
            "an object key must be exactly one string, found a sequence of {} items",
            keys.len()
        )));
    }
    match keys.swap_remove(0) {
        Item::String(s) => Ok(s),
        other => Err(Error::unexpected_type(format!(
            "an object key must be a string, found an item of type \"{}\"",
            other.type_name()
        ))),
    }
}

pub fn object_constructor(pairs: Vec<(BoxedIterator, BoxedIterator)>, metadata: Metadata) -> BoxedIterator {
    Box::new(OperatorIterator::new(ObjectConstructor { pairs, context: None }, metadata))
}

/// `[ expr ]`; no content expression builds `[ ]`.
pub struct ArrayConstructor {
    content: Option<BoxedIterator>,
    context: Option<Arc<DynamicContext>>,
}

impl Operator for ArrayConstructor {
    type Output = Item;

    fn name(&self) -> &'static str {
        "array-constructor"
    }

    fn start(&mut self, context: &Arc<DynamicContext>) -> Result<()> {
        self.context = Some(Arc::clone(context));
        Ok(())
    }

    fn produce(&mut self) -> Result<Option<Item>> {
        let Some(context) = self.context.take() else {
            return Ok(None);
        };
        let members = match self.content.as_mut() {
            Some(content) => content.materialize(&context)?,
            None => Vec::new(),
        };
        Ok(Some(Item::array(members)))
    }

    fn stop(&mut self) {
        self.context = None;
    }

    fn dependencies(&self, out: &mut VariableSet) {
        if let Some(content) = &self.content {
            content.collect_dependencies(out);
        }
    }
}

pub fn array_constructor(content: Option<BoxedIterator>, metadata: Metadata) -> BoxedIterator {
    Box::new(OperatorIterator::new(ArrayConstructor { content, context: None }, metadata))
}

/// How a navigation step selects values out of one input item.
enum Step {
    /// `$o.key`
    Field(BoxedIterator),
    /// `$a[[i]]`
    Member(BoxedIterator),
    /// `$a[]`
    Unbox,
}

/// Navigation over every item of the input; items the step does not apply to
/// are skipped.
pub struct Navigation {
    input: BoxedIterator,
    step: Step,
    // resolved key or position for the current scan
    field: Option<String>,
    member: Option<usize>,
    pending: std::vec::IntoIter<Item>,
}

impl Navigation {
    fn select(&self, item: &Item) -> Vec<Item> {
        match &self.step {
            Step::Field(_) => self.field.as_deref().and_then(|k| item.get(k)).cloned().into_iter().collect(),
            Step::Member(_) => self.member.and_then(|i| item.member(i)).cloned().into_iter().collect(),
            Step::Unbox => item.members().to_vec(),
        }
    }
}

impl Operator for Navigation {
    type Output = Item;

    fn name(&self) -> &'static str {
        match self.step {
            Step::Field(_) => "object-lookup",
            Step::Member(_) => "array-lookup",
            Step::Unbox => "array-unboxing",
        }
    }

    fn start(&mut self, context: &Arc<DynamicContext>) -> Result<()> {
        self.field = None;
        self.member = None;
        self.pending = Vec::new().into_iter();
        match &mut self.step {
            Step::Field(key) => {
                let key = key.materialize(context)?;
                self.field = Some(match key.as_slice() {
                    [Item::String(s)] => s.clone(),
                    [other] if other.is_atomic() => other.to_string(),
                    _ => return Err(Error::unexpected_type("an object lookup key must be exactly one atomic item")),
                });
            }
            Step::Member(position) => {
                let position = position.materialize(context)?;
                let index = match position.as_slice() {
                    [p] if p.is_integer() => p.to_big_integer(),
                    _ => None,
                };
                let index = index.ok_or_else(|| {
                    Error::unexpected_type("an array lookup position must be exactly one integer")
                })?;
                // positions outside usize never match a member
                self.member = usize::try_from(index).ok();
            }
            Step::Unbox => {}
        }
        self.input.open(context)
    }

    fn produce(&mut self) -> Result<Option<Item>> {
        loop {
            if let Some(item) = self.pending.next() {
                return Ok(Some(item));
            }
            if !self.input.has_next() {
                return Ok(None);
            }
            let item = self.input.next()?;
            self.pending = self.select(&item).into_iter();
        }
    }

    fn stop(&mut self) {
        self.input.close();
    }

    fn dependencies(&self, out: &mut VariableSet) {
        self.input.collect_dependencies(out);
        match &self.step {
            Step::Field(it) | Step::Member(it) => it.collect_dependencies(out),
            Step::Unbox => {}
        }
    }
}

fn navigation(input: BoxedIterator, step: Step, metadata: Metadata) -> BoxedIterator {
    let operator = Navigation { input, step, field: None, member: None, pending: Vec::new().into_iter() };
    Box::new(OperatorIterator::new(operator, metadata))
}

pub fn object_lookup(input: BoxedIterator, key: BoxedIterator, metadata: Metadata) -> BoxedIterator {
    navigation(input, Step::Field(key), metadata)
}

pub fn array_lookup(input: BoxedIterator, position: BoxedIterator, metadata: Metadata) -> BoxedIterator {
    navigation(input, Step::Member(position), metadata)
}

pub fn array_unboxing(input: BoxedIterator, metadata: Metadata) -> BoxedIterator {
    navigation(input, Step::Unbox, metadata)
}

/// Keeps only permitted keys of objects; every other item passes through.
///
/// Key order follows the input object, not the permitted set.
#[derive(Debug, Clone, Default)]
pub struct ObjectProjection {
    keys: HashSet<String>,
}

impl ObjectProjection {
    pub fn new<K: Into<String>>(keys: impl IntoIterator<Item = K>) -> Self {
        Self { keys: keys.into_iter().map(Into::into).collect() }
    }

    pub fn permits(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn apply(&self, item: Item) -> Item {
        match &item {
            Item::Object(map) => {
                Item::object(map.iter().filter(|(k, _)| self.permits(k)).map(|(k, v)| (k.clone(), v.clone())).collect())
            }
            _ => item,
        }
    }
}

/// Streaming projection over a sequence; the key set is computed on open.
pub struct Project {
    input: BoxedIterator,
    keys: BoxedIterator,
    projection: ObjectProjection,
}

impl Operator for Project {
    type Output = Item;

    fn name(&self) -> &'static str {
        "project"
    }

    fn start(&mut self, context: &Arc<DynamicContext>) -> Result<()> {
        let keys = self.keys.materialize(context)?;
        let keys = keys
            .into_iter()
            .map(|k| match k {
                Item::String(s) => Ok(s),
                other => Err(Error::unexpected_type(format!(
                    "project() keys must be strings, found an item of type \"{}\"",
                    other.type_name()
                ))),
            })
            .collect::<Result<Vec<_>>>()?;
        self.projection = ObjectProjection::new(keys);
        self.input.open(context)
    }

    fn produce(&mut self) -> Result<Option<Item>> {
        if !self.input.has_next() {
            return Ok(None);
        }
        let item = self.input.next()?;
        Ok(Some(self.projection.apply(item)))
    }

    fn stop(&mut self) {
        self.input.close();
    }

    fn dependencies(&self, out: &mut VariableSet) {
        self.input.collect_dependencies(out);
        self.keys.collect_dependencies(out);
    }
}

pub fn project(input: BoxedIterator, keys: BoxedIterator, metadata: Metadata) -> BoxedIterator {
    Box::new(OperatorIterator::new(Project { input, keys, projection: ObjectProjection::default() }, metadata))
}
