use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use compact_str::CompactString;
use smallvec::SmallVec;

use crate::functions::{FunctionRegistry, default_function_registry};
use crate::item::{Item, Sequence};

/// Context item and its 1-based position within the sequence being mapped.
#[derive(Debug, Clone, PartialEq)]
pub struct Focus {
    pub item: Item,
    pub position: usize,
}

// Per-evaluation settings shared by every frame of one context chain.
struct Settings {
    implicit_timezone: FixedOffset,
    now: DateTime<FixedOffset>,
    functions: Arc<FunctionRegistry>,
}

/// One evaluation frame: local variable bindings plus an optional focus,
/// chained to the frame it was created from.
///
/// A frame is filled in by its owner and then frozen behind an `Arc`; lookups
/// walk outward through the parent chain. Children never touch a parent's
/// bindings.
pub struct DynamicContext {
    parent: Option<Arc<DynamicContext>>,
    variables: SmallVec<[(CompactString, Arc<Sequence>); 4]>,
    focus: Option<Focus>,
    settings: Arc<Settings>,
}

impl DynamicContext {
    /// Root context with default settings and no bindings.
    pub fn empty() -> Arc<Self> {
        DynamicContextBuilder::new().build()
    }

    pub fn builder() -> DynamicContextBuilder {
        DynamicContextBuilder::new()
    }

    /// A fresh frame whose lookups fall back to `parent`.
    pub fn child(parent: &Arc<DynamicContext>) -> DynamicContext {
        DynamicContext {
            parent: Some(Arc::clone(parent)),
            variables: SmallVec::new(),
            focus: None,
            settings: Arc::clone(&parent.settings),
        }
    }

    pub fn bind(&mut self, name: impl Into<CompactString>, value: Sequence) {
        self.bind_shared(name, Arc::new(value));
    }

    pub fn bind_shared(&mut self, name: impl Into<CompactString>, value: Arc<Sequence>) {
        let name = name.into();
        match self.variables.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.variables.push((name, value)),
        }
    }

    pub fn set_focus(&mut self, item: Item, position: usize) {
        self.focus = Some(Focus { item, position });
    }

    /// Innermost binding of `name`.
    pub fn variable(&self, name: &str) -> Option<&Arc<Sequence>> {
        let mut frame = Some(self);
        while let Some(ctx) = frame {
            if let Some((_, value)) = ctx.variables.iter().rev().find(|(n, _)| n == name) {
                return Some(value);
            }
            frame = ctx.parent.as_deref();
        }
        None
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.variable(name).is_some()
    }

    pub fn focus(&self) -> Option<&Focus> {
        let mut frame = Some(self);
        while let Some(ctx) = frame {
            if let Some(focus) = &ctx.focus {
                return Some(focus);
            }
            frame = ctx.parent.as_deref();
        }
        None
    }

    pub fn context_item(&self) -> Option<&Item> {
        self.focus().map(|f| &f.item)
    }

    pub fn context_position(&self) -> Option<usize> {
        self.focus().map(|f| f.position)
    }

    pub fn implicit_timezone(&self) -> FixedOffset {
        self.settings.implicit_timezone
    }

    /// The instant `current-*` functions report. Fixed for the whole chain.
    pub fn now(&self) -> DateTime<FixedOffset> {
        self.settings.now
    }

    pub fn functions(&self) -> &Arc<FunctionRegistry> {
        &self.settings.functions
    }

    /// Names bound in this frame only.
    pub fn local_names(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|(n, _)| n.as_str())
    }
}

impl fmt::Debug for DynamicContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicContext")
            .field("variables", &self.variables.iter().map(|(n, v)| (n.as_str(), v.len())).collect::<Vec<_>>())
            .field("focus", &self.focus)
            .field("implicit_timezone", &self.settings.implicit_timezone)
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

pub struct DynamicContextBuilder {
    variables: SmallVec<[(CompactString, Arc<Sequence>); 4]>,
    focus: Option<Focus>,
    implicit_timezone: Option<FixedOffset>,
    now: Option<DateTime<FixedOffset>>,
    functions: Option<Arc<FunctionRegistry>>,
}

impl Default for DynamicContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicContextBuilder {
    pub fn new() -> Self {
        Self { variables: SmallVec::new(), focus: None, implicit_timezone: None, now: None, functions: None }
    }

    pub fn with_variable(mut self, name: impl Into<CompactString>, value: impl Into<Sequence>) -> Self {
        let name = name.into();
        self.variables.retain(|(n, _)| *n != name);
        self.variables.push((name, Arc::new(value.into())));
        self
    }

    pub fn with_context_item(mut self, item: impl Into<Item>) -> Self {
        self.focus = Some(Focus { item: item.into(), position: 1 });
        self
    }

    pub fn with_implicit_timezone(mut self, tz: FixedOffset) -> Self {
        self.implicit_timezone = Some(tz);
        self
    }

    /// Implicit timezone as an offset in minutes east of UTC.
    pub fn with_timezone(mut self, offset_minutes: i32) -> Self {
        if let Some(tz) = offset_minutes.checked_mul(60).and_then(FixedOffset::east_opt) {
            self.implicit_timezone = Some(tz);
        }
        self
    }

    /// Fix the instant reported by `current-dateTime` and friends.
    pub fn with_now(mut self, now: DateTime<FixedOffset>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn with_functions(mut self, registry: Arc<FunctionRegistry>) -> Self {
        self.functions = Some(registry);
        self
    }

    pub fn build(self) -> Arc<DynamicContext> {
        let implicit_timezone = self.implicit_timezone.unwrap_or_else(|| Utc.fix());
        let now = self.now.unwrap_or_else(|| Utc::now().with_timezone(&implicit_timezone));
        let functions = self.functions.unwrap_or_else(|| Arc::new(default_function_registry()));
        Arc::new(DynamicContext {
            parent: None,
            variables: self.variables,
            focus: self.focus,
            settings: Arc::new(Settings { implicit_timezone, now, functions }),
        })
    }
}
