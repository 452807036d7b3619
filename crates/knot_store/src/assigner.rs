//! Assigners
//!
//! An assigner turns `(context, event)` into the next context. Every shape a
//! caller can register is normalised once, at registration time, into one
//! [`Assigner`] variant:
//!
//! - [`Assigner::replace`]: compute a complete new context
//! - [`Assigner::patch`]: compute a sparse [`Patch`] merged onto the old context
//! - [`Assigner::fields`]: per-field literals or functions ([`FieldAssigners`])
//! - [`Assigner::produce`]: mutate a draft copy of the context
//!
//! Resolution never mutates the input context. When nothing is written the
//! previous `Arc` is returned as-is so consumers can detect "no change" by
//! reference.

use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

use crate::error::BoxError;

type ReplaceFn<C, E> = Box<dyn Fn(&C, &E) -> Result<C, BoxError> + Send + Sync>;
type PatchFn<C, E> = Box<dyn Fn(&C, &E) -> Result<Patch<C>, BoxError> + Send + Sync>;
type ProduceFn<C, E> = Box<dyn Fn(&mut C, &E) -> Result<(), BoxError> + Send + Sync>;

/// A pending write to one context field
type FieldWrite<C> = Box<dyn FnOnce(&mut C) + Send>;

/// Sparse update: an ordered mapping from field name to write
pub struct Patch<C> {
    writes: SmallVec<[(&'static str, FieldWrite<C>); 4]>,
}

impl<C> Patch<C> {
    /// An empty patch
    pub fn new() -> Self {
        Self {
            writes: SmallVec::new(),
        }
    }

    /// Set a field. Setting the same field again replaces the earlier write.
    pub fn set<F>(mut self, field: &'static str, write: F) -> Self
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        self.insert(field, write);
        self
    }

    /// In-place form of [`Patch::set`]
    pub fn insert<F>(&mut self, field: &'static str, write: F)
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        let write: FieldWrite<C> = Box::new(write);
        match self.writes.iter_mut().find(|(name, _)| *name == field) {
            Some(slot) => slot.1 = write,
            None => self.writes.push((field, write)),
        }
    }

    /// True when the patch writes no field
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Number of fields written
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Names of the fields this patch writes, in insertion order
    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.writes.iter().map(|(name, _)| *name)
    }

    /// Shallow-merge onto `base`, reusing it when there is nothing to write
    pub(crate) fn merge_onto(self, base: &Arc<C>) -> Arc<C>
    where
        C: Clone,
    {
        if self.writes.is_empty() {
            return Arc::clone(base);
        }
        let mut next = C::clone(base.as_ref());
        for (_, write) in self.writes {
            write(&mut next);
        }
        Arc::new(next)
    }
}

impl<C> Default for Patch<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for Patch<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.fields()).finish()
    }
}

/// Resolves one field against the pre-dispatch context
type FieldResolver<C, E> = Box<dyn Fn(&C, &E) -> FieldWrite<C> + Send + Sync>;

/// Property assigner: one literal or function per field
pub struct FieldAssigners<C, E> {
    fields: SmallVec<[(&'static str, FieldResolver<C, E>); 4]>,
}

impl<C: 'static, E: 'static> FieldAssigners<C, E> {
    /// No field rules yet
    pub fn new() -> Self {
        Self {
            fields: SmallVec::new(),
        }
    }

    /// Assign a fixed value to a field on every dispatch
    pub fn literal<T, W>(self, field: &'static str, value: T, write: W) -> Self
    where
        T: Clone + Send + Sync + 'static,
        W: Fn(&mut C, T) + Copy + Send + Sync + 'static,
    {
        self.push(
            field,
            Box::new(move |_: &C, _: &E| {
                let value = value.clone();
                Box::new(move |ctx: &mut C| write(ctx, value)) as FieldWrite<C>
            }),
        )
    }

    /// Assign a field from a function of the current context and event
    pub fn compute<T, F, W>(self, field: &'static str, compute: F, write: W) -> Self
    where
        T: Send + 'static,
        F: Fn(&C, &E) -> T + Send + Sync + 'static,
        W: Fn(&mut C, T) + Copy + Send + Sync + 'static,
    {
        self.push(
            field,
            Box::new(move |ctx: &C, event: &E| {
                let value = compute(ctx, event);
                Box::new(move |ctx: &mut C| write(ctx, value)) as FieldWrite<C>
            }),
        )
    }

    fn push(mut self, field: &'static str, resolver: FieldResolver<C, E>) -> Self {
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some(slot) => slot.1 = resolver,
            None => self.fields.push((field, resolver)),
        }
        self
    }

    /// True when no field has a rule
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Evaluate every field against `ctx` before any write is applied
    fn resolve(&self, ctx: &C, event: &E) -> Patch<C> {
        Patch {
            writes: self
                .fields
                .iter()
                .map(|(name, resolver)| (*name, resolver(ctx, event)))
                .collect(),
        }
    }
}

impl<C: 'static, E: 'static> Default for FieldAssigners<C, E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Update rule registered for one event type
pub enum Assigner<C, E> {
    /// Complete assigner: returns the whole next context
    Replace(ReplaceFn<C, E>),
    /// Partial assigner: returns the fields to overwrite
    Patch(PatchFn<C, E>),
    /// Property assigner: per-field literals or functions
    Fields(FieldAssigners<C, E>),
    /// Producer: mutates a draft copy of the context
    Produce(ProduceFn<C, E>),
}

impl<C, E> Assigner<C, E>
where
    C: Clone + Send + Sync + 'static,
    E: 'static,
{
    /// Complete assigner from a function of the context and event
    pub fn replace<F>(f: F) -> Self
    where
        F: Fn(&C, &E) -> C + Send + Sync + 'static,
    {
        Assigner::Replace(Box::new(move |ctx: &C, event: &E| -> Result<C, BoxError> {
            Ok(f(ctx, event))
        }))
    }

    /// Fallible form of [`Assigner::replace`]
    pub fn try_replace<F>(f: F) -> Self
    where
        F: Fn(&C, &E) -> Result<C, BoxError> + Send + Sync + 'static,
    {
        Assigner::Replace(Box::new(f))
    }

    /// Partial assigner returning a [`Patch`]
    pub fn patch<F>(f: F) -> Self
    where
        F: Fn(&C, &E) -> Patch<C> + Send + Sync + 'static,
    {
        Assigner::Patch(Box::new(
            move |ctx: &C, event: &E| -> Result<Patch<C>, BoxError> { Ok(f(ctx, event)) },
        ))
    }

    /// Fallible form of [`Assigner::patch`]
    pub fn try_patch<F>(f: F) -> Self
    where
        F: Fn(&C, &E) -> Result<Patch<C>, BoxError> + Send + Sync + 'static,
    {
        Assigner::Patch(Box::new(f))
    }

    /// Property assigner from per-field rules
    pub fn fields(fields: FieldAssigners<C, E>) -> Self {
        Assigner::Fields(fields)
    }

    /// Producer that edits a draft copy of the context
    pub fn produce<F>(f: F) -> Self
    where
        F: Fn(&mut C, &E) + Send + Sync + 'static,
    {
        Assigner::Produce(Box::new(
            move |draft: &mut C, event: &E| -> Result<(), BoxError> {
                f(draft, event);
                Ok(())
            },
        ))
    }

    /// Fallible form of [`Assigner::produce`]
    pub fn try_produce<F>(f: F) -> Self
    where
        F: Fn(&mut C, &E) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Assigner::Produce(Box::new(f))
    }

    /// Compute the next context from `ctx`.
    ///
    /// Returns `ctx` itself (same allocation) when nothing was written.
    pub(crate) fn resolve(&self, ctx: &Arc<C>, event: &E) -> Result<Arc<C>, BoxError> {
        let current: &C = ctx;
        match self {
            Assigner::Replace(f) => f(current, event).map(Arc::new),
            Assigner::Patch(f) => Ok(f(current, event)?.merge_onto(ctx)),
            Assigner::Fields(fields) => Ok(fields.resolve(current, event).merge_onto(ctx)),
            Assigner::Produce(f) => {
                let mut draft = current.clone();
                f(&mut draft, event)?;
                Ok(Arc::new(draft))
            }
        }
    }
}

impl<C, E> From<FieldAssigners<C, E>> for Assigner<C, E> {
    fn from(fields: FieldAssigners<C, E>) -> Self {
        Assigner::Fields(fields)
    }
}

impl<C, E> fmt::Debug for Assigner<C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Assigner::Replace(_) => f.write_str("Assigner::Replace"),
            Assigner::Patch(_) => f.write_str("Assigner::Patch"),
            Assigner::Fields(fields) => f
                .debug_tuple("Assigner::Fields")
                .field(&fields.fields.iter().map(|(n, _)| *n).collect::<Vec<_>>())
                .finish(),
            Assigner::Produce(_) => f.write_str("Assigner::Produce"),
        }
    }
}
