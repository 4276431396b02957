//! Generic factory registry.
//!
//! Every "pick an implementation for this argument" decision in the pipeline
//! (which kind of source to mount for a path, for example) follows the same
//! protocol: walk the records from the highest priority down, skip the ones
//! whose compatibility predicate declines, and try to construct. A failed
//! construction is reported as a warning and the walk continues. Only when the
//! whole list has been exhausted does the caller see an error.

use crate::priority::{PriorityList, Prioritized};
use quarry_storage::error::{ErrorKind, Result};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use tracing::instrument;

type Compatible<A> = Box<dyn Fn(&A) -> bool + Send + Sync>;
type Factory<A, T> = Box<dyn Fn(&A) -> Result<T> + Send + Sync>;

pub struct FactoryRecord<A: ?Sized, T> {
    name: String,
    priority: i32,
    compatible: Option<Compatible<A>>,
    factory: Factory<A, T>,
}

impl<A: ?Sized, T> FactoryRecord<A, T> {
    pub fn new(name: impl Into<String>, factory: impl Fn(&A) -> Result<T> + Send + Sync + 'static) -> Self {
        Self { name: name.into(), priority: 0, compatible: None, factory: Box::new(factory) }
    }

    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Predicate checked before the factory runs. It must not fail; a record
    /// without one is tried for every argument.
    #[must_use]
    pub fn compatible(mut self, predicate: impl Fn(&A) -> bool + Send + Sync + 'static) -> Self {
        self.compatible = Some(Box::new(predicate));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn accepts(&self, arg: &A) -> bool {
        self.compatible.as_ref().is_none_or(|predicate| predicate(arg))
    }
}

impl<A: ?Sized, T> Prioritized for FactoryRecord<A, T> {
    fn priority(&self) -> i32 {
        self.priority
    }
}

impl<A: ?Sized, T> Debug for FactoryRecord<A, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FactoryRecord")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("compatible", &self.compatible.is_some())
            .finish_non_exhaustive()
    }
}

/// Priority-ordered factories producing a `T` from an `&A`.
pub struct Registry<A: ?Sized, T> {
    kind: &'static str,
    describe: fn(&A) -> String,
    records: PriorityList<FactoryRecord<A, T>>,
}

impl<A: ?Sized, T> Registry<A, T> {
    /// `kind` names what the registry builds ("source", "driver") in logs and
    /// errors; `describe` renders an argument for the same purpose.
    pub fn new(kind: &'static str, describe: fn(&A) -> String) -> Self {
        Self { kind, describe, records: PriorityList::new() }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn register(&mut self, record: FactoryRecord<A, T>) -> &mut Self {
        tracing::trace!(registry = self.kind, name = %record.name, priority = record.priority, "registering factory");
        self.records.insert(record);
        self
    }

    pub fn records(&self) -> impl Iterator<Item = &FactoryRecord<A, T>> {
        self.records.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Build with the first compatible record whose factory succeeds.
    ///
    /// Fails with [`NotAvailable`](ErrorKind::NotAvailable) if nothing is
    /// registered at all and with [`NotFound`](ErrorKind::NotFound) once
    /// every record has declined or failed.
    #[instrument(level = "debug", skip_all, fields(registry = self.kind, subject = tracing::field::Empty))]
    pub fn make(&self, arg: &A) -> Result<T> {
        if self.records.is_empty() {
            exn::bail!(ErrorKind::NotAvailable(format!("{}s", self.kind)));
        }
        let subject = (self.describe)(arg);
        tracing::Span::current().record("subject", subject.as_str());
        for record in self.records.iter().filter(|r| r.accepts(arg)) {
            match (record.factory)(arg) {
                Ok(value) => {
                    tracing::debug!(name = %record.name, "factory succeeded");
                    return Ok(value);
                },
                Err(err) => self.warn_failed(record, &subject, &err),
            }
        }
        exn::bail!(ErrorKind::not_found("nothing compatible", format!("{} for {subject}", self.kind)))
    }

    /// Build with every compatible record, in priority order, keeping the
    /// ones that succeed.
    pub fn make_all(&self, arg: &A) -> Result<Vec<T>> {
        if self.records.is_empty() {
            exn::bail!(ErrorKind::NotAvailable(format!("{}s", self.kind)));
        }
        let subject = (self.describe)(arg);
        let mut made = Vec::new();
        for record in self.records.iter().filter(|r| r.accepts(arg)) {
            match (record.factory)(arg) {
                Ok(value) => made.push(value),
                Err(err) => self.warn_failed(record, &subject, &err),
            }
        }
        Ok(made)
    }

    fn warn_failed(&self, record: &FactoryRecord<A, T>, subject: &str, err: &quarry_storage::error::Error) {
        tracing::warn!(
            registry = self.kind,
            name = %record.name,
            subject,
            error = %**err,
            "{} {} failed, trying next",
            self.kind,
            record.name,
        );
    }
}

impl<A: ?Sized, T> Debug for Registry<A, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Registry").field("kind", &self.kind).field("records", &self.records).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::count_warnings;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn registry() -> Registry<str, String> {
        Registry::new("driver", |s: &str| s.to_string())
    }

    fn failing(name: &'static str) -> FactoryRecord<str, String> {
        FactoryRecord::new(name, move |_: &str| {
            exn::bail!(ErrorKind::Platform { library: "test", message: name.into() })
        })
    }

    #[test]
    fn test_priority_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = registry();
        for (name, priority) in [("ten", 10), ("fifty", 50), ("thirty", 30)] {
            let order = order.clone();
            registry.register(
                FactoryRecord::new(name, move |_: &str| {
                    order.lock().unwrap().push(name);
                    exn::bail!(ErrorKind::Format(name.to_string()))
                })
                .priority(priority),
            );
        }
        let (result, warnings) = count_warnings(|| registry.make("x"));
        assert!(result.is_err());
        assert_eq!(warnings, 3);
        assert_eq!(*order.lock().unwrap(), ["fifty", "thirty", "ten"]);
    }

    #[test]
    fn test_probe_and_continue() {
        let mut registry = registry();
        registry.register(failing("broken").priority(10));
        registry.register(FactoryRecord::new("working", |arg: &str| Ok(format!("made {arg}"))).priority(5));

        let (made, warnings) = count_warnings(|| registry.make("thing"));
        assert_eq!(made.unwrap(), "made thing");
        assert_eq!(warnings, 1);
    }

    #[test]
    fn test_not_found_when_all_fail() {
        let mut registry = registry();
        registry.register(failing("one").priority(1));
        registry.register(failing("two").priority(2));

        let (result, warnings) = count_warnings(|| registry.make("thing"));
        let err = result.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound { .. }));
        assert_eq!(warnings, 2);
    }

    #[test]
    fn test_not_available_when_empty() {
        let err = registry().make("thing").unwrap_err();
        assert_eq!(*err, ErrorKind::NotAvailable("drivers".to_string()));
    }

    #[test]
    fn test_incompatible_records_are_skipped_silently() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let mut registry = registry();
        registry.register(
            FactoryRecord::new("picky", move |_: &str| {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok("picky".to_string())
            })
            .compatible(|arg: &str| arg.starts_with("ok"))
            .priority(10),
        );
        registry.register(FactoryRecord::new("fallback", |_: &str| Ok("fallback".to_string())));

        let (made, warnings) = count_warnings(|| registry.make("nope"));
        assert_eq!(made.unwrap(), "fallback");
        assert_eq!(warnings, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(registry.make("ok then").unwrap(), "picky");
    }

    #[test]
    fn test_make_all() {
        let mut registry = registry();
        registry.register(FactoryRecord::new("low", |_: &str| Ok("low".to_string())).priority(1));
        registry.register(failing("broken").priority(5));
        registry.register(FactoryRecord::new("high", |_: &str| Ok("high".to_string())).priority(9));

        let (made, warnings) = count_warnings(|| registry.make_all("x"));
        assert_eq!(made.unwrap(), ["high", "low"]);
        assert_eq!(warnings, 1);
    }
}
