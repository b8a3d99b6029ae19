//! Declared field maps between two record types

use crate::error::{MergeError, Result, TranslatorError};
use std::collections::HashSet;
use std::fmt;
use tracing::trace;

/// One same-named field copied verbatim from `S` to `T`
pub struct Field<S, T> {
    name: &'static str,
    copy: fn(&S, &mut T),
}

impl<S, T> Field<S, T> {
    pub const fn new(name: &'static str, copy: fn(&S, &mut T)) -> Self {
        Self { name, copy }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<S, T> fmt::Debug for Field<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Field").field(&self.name).finish()
    }
}

type Apply<'a, S, T> = Box<dyn FnMut(&S, &mut T) -> std::result::Result<(), TranslatorError> + 'a>;

/// Custom translation of one source field into one target field
///
/// A binding replaces the verbatim copy of its `from` field.
pub struct Binding<'a, S, T> {
    from: &'static str,
    to: &'static str,
    apply: Apply<'a, S, T>,
}

impl<'a, S: 'a, T: 'a> Binding<'a, S, T> {
    /// Bind `from` to `to` through `translate`
    ///
    /// `translate` receives the raw source value, which may be empty, and its
    /// return value is what lands in the target slot.
    pub fn new<V, W, F>(
        from: &'static str,
        to: &'static str,
        read: fn(&S) -> &V,
        slot: fn(&mut T) -> &mut W,
        mut translate: F,
    ) -> Self
    where
        V: ?Sized + 'a,
        W: 'a,
        F: FnMut(&V) -> std::result::Result<W, TranslatorError> + 'a,
    {
        Self {
            from,
            to,
            apply: Box::new(move |source, target| {
                let value = translate(read(source))?;
                *slot(target) = value;
                Ok(())
            }),
        }
    }

    pub fn from_field(&self) -> &'static str {
        self.from
    }

    pub fn to_field(&self) -> &'static str {
        self.to
    }
}

impl<S, T> fmt::Debug for Binding<'_, S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish()
    }
}

/// The statically declared field correspondence between a source kind and a
/// target kind
///
/// Build one per (source, target) pair with [`field_map!`](crate::field_map).
pub struct FieldMap<S, T> {
    source_kind: &'static str,
    target_kind: &'static str,
    fields: Vec<Field<S, T>>,
}

impl<S, T> FieldMap<S, T> {
    pub fn new(source_kind: &'static str, target_kind: &'static str, fields: Vec<Field<S, T>>) -> Self {
        Self {
            source_kind,
            target_kind,
            fields,
        }
    }

    pub fn source_kind(&self) -> &'static str {
        self.source_kind
    }

    pub fn target_kind(&self) -> &'static str {
        self.target_kind
    }

    /// Names of the fields copied verbatim when unbound
    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|field| field.name)
    }

    /// Merge `source` into `target`
    ///
    /// Every binding runs exactly once, in order. Then every declared field
    /// not named as a binding's `from` is copied verbatim, overwriting the
    /// target unconditionally. Fields that exist only on the target are left
    /// untouched. Local overrides belong to the caller, after the merge.
    ///
    /// A translator error aborts the merge at once. Writes already made to
    /// `target` are not rolled back, so the target must then be discarded.
    pub fn merge<'a>(
        &self,
        source: &S,
        target: &mut T,
        bindings: Vec<Binding<'a, S, T>>,
    ) -> Result<()> {
        let bound: HashSet<&'static str> = bindings.iter().map(|b| b.from).collect();

        for mut binding in bindings {
            (binding.apply)(source, target).map_err(|err| MergeError::Translator {
                from: format!("{}.{}", self.source_kind, binding.from),
                to: format!("{}.{}", self.target_kind, binding.to),
                reason: err.to_string(),
            })?;
        }

        let mut copied = 0usize;
        for field in self.fields.iter().filter(|field| !bound.contains(field.name)) {
            (field.copy)(source, target);
            copied += 1;
        }

        trace!(
            source = self.source_kind,
            target = self.target_kind,
            bound = bound.len(),
            copied,
            "Merged fields"
        );
        Ok(())
    }
}

impl<S, T> fmt::Debug for FieldMap<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldMap")
            .field("source_kind", &self.source_kind)
            .field("target_kind", &self.target_kind)
            .field("fields", &self.fields)
            .finish()
    }
}

/// Declare a [`FieldMap`] copying same-named fields from one type to another
///
/// ```
/// use skybridge_merge::field_map;
///
/// #[derive(Default)]
/// struct Remote { timeout: i64, role: String, state: String }
/// #[derive(Default)]
/// struct Update { timeout: i64, role: String }
///
/// let map = field_map!(Remote => Update { timeout, role });
/// let remote = Remote { timeout: 30, role: "arn:x".into(), state: "Active".into() };
/// let mut update = Update::default();
/// map.merge(&remote, &mut update, vec![]).unwrap();
/// assert_eq!(update.timeout, 30);
/// assert_eq!(update.role, "arn:x");
/// ```
#[macro_export]
macro_rules! field_map {
    ($source:ty => $target:ty { $($field:ident),* $(,)? }) => {
        $crate::FieldMap::<$source, $target>::new(
            stringify!($source),
            stringify!($target),
            vec![$(
                $crate::Field::new(stringify!($field), |s: &$source, t: &mut $target| {
                    t.$field = ::std::clone::Clone::clone(&s.$field);
                })
            ),*],
        )
    };
}
