//! Bookkeeping shared by the postings and doc values multiplexers.
//!
//! The write side keeps an arena of sub-writers keyed by the identity of the
//! format instance that produced them, plus a per-name suffix counter. The
//! read side keeps one sub-reader per composed suffix and a field table
//! pointing into it.

use crate::error::{CodecError, CodecResult};
use crate::field_info::{FieldInfo, FieldInfos, FormatAssignment, PerFieldKeys};
use crate::naming::{full_segment_suffix, per_field_suffix};
use segstore_storage::close::close_while_handling_errors;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Identity of a format instance: the address of its shared allocation.
///
/// Stable for as long as the arena keeps the `Arc` alive.
type InstanceId = usize;

fn instance_id<F: ?Sized>(format: &Arc<F>) -> InstanceId {
    Arc::as_ptr(format).cast::<()>() as usize
}

pub(crate) struct WriterEntry<F: ?Sized, W> {
    pub(crate) format: Arc<F>,
    pub(crate) suffix: u32,
    pub(crate) writer: W,
}

/// Sub-writers of one write session.
pub(crate) struct WriterArena<F: ?Sized, W> {
    entries: Vec<WriterEntry<F, W>>,
    by_instance: HashMap<InstanceId, usize>,
    suffixes: HashMap<String, u32>,
}

impl<F: ?Sized, W> WriterArena<F, W> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_instance: HashMap::new(),
            suffixes: HashMap::new(),
        }
    }

    /// Routes `field` to the writer of `format`, opening one if needed.
    ///
    /// Records the format name and the instance's suffix on the field and
    /// returns the writer's index.
    pub(crate) fn assign<O>(
        &mut self,
        field: &mut FieldInfo,
        keys: PerFieldKeys,
        format: Arc<F>,
        format_name: &str,
        outer_suffix: &str,
        open: O,
    ) -> CodecResult<usize>
    where
        O: FnOnce(&F, &str) -> CodecResult<W>,
    {
        field.put_new_attribute(keys.format, format_name)?;

        let id = instance_id(&format);
        let index = match self.by_instance.get(&id) {
            Some(&index) => index,
            None => {
                let next = self.suffixes.entry(format_name.to_string()).or_insert(0);
                let suffix = *next;
                *next += 1;

                let segment_suffix = full_segment_suffix(
                    field.name(),
                    outer_suffix,
                    &per_field_suffix(format_name, suffix),
                )?;
                let writer = open(&format, &segment_suffix)?;
                tracing::debug!(
                    format = %format_name,
                    suffix,
                    segment_suffix = %segment_suffix,
                    "opened per-field sub-writer"
                );

                self.entries.push(WriterEntry {
                    format,
                    suffix,
                    writer,
                });
                let index = self.entries.len() - 1;
                self.by_instance.insert(id, index);
                index
            }
        };

        field.put_new_attribute(keys.suffix, self.entries[index].suffix.to_string())?;
        Ok(index)
    }

    pub(crate) fn writer_mut(&mut self, index: usize) -> &mut W {
        &mut self.entries[index].writer
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Suffix allocated to each writer, in opening order.
    pub(crate) fn suffixes(&self) -> impl Iterator<Item = (&F, u32)> + '_ {
        self.entries.iter().map(|e| (&*e.format, e.suffix))
    }

    /// Removes every writer, leaving the arena empty.
    pub(crate) fn take_writers(&mut self) -> Vec<W> {
        self.by_instance.clear();
        self.entries.drain(..).map(|e| e.writer).collect()
    }
}

impl<F: ?Sized, W> fmt::Debug for WriterArena<F, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterArena")
            .field("writers", &self.entries.len())
            .field("suffixes", &self.suffixes)
            .finish()
    }
}

#[derive(Debug, Clone)]
struct FieldSlot {
    assignment: FormatAssignment,
    reader: usize,
}

/// Sub-readers of one read session and the field table routing into them.
pub(crate) struct ReaderTable<R: ?Sized> {
    readers: Vec<Arc<R>>,
    by_suffix: HashMap<String, usize>,
    fields: BTreeMap<String, FieldSlot>,
}

impl<R: ?Sized> ReaderTable<R> {
    /// Opens one reader per distinct composed suffix found on `field_infos`.
    ///
    /// If any open fails, the readers opened so far are closed before the
    /// error is returned.
    pub(crate) fn open<I, O, C>(
        field_infos: &FieldInfos,
        keys: PerFieldKeys,
        outer_suffix: &str,
        include: I,
        mut open: O,
        close: C,
    ) -> CodecResult<Self>
    where
        I: Fn(&FieldInfo) -> bool,
        O: FnMut(&str, &str) -> CodecResult<Arc<R>>,
        C: Fn(&R) -> CodecResult<()>,
    {
        let mut table = Self {
            readers: Vec::new(),
            by_suffix: HashMap::new(),
            fields: BTreeMap::new(),
        };

        let result = field_infos
            .iter()
            .filter(|&field| include(field))
            .try_for_each(|field| table.add_field(field, keys, outer_suffix, &mut open));

        match result {
            Ok(()) => Ok(table),
            Err(err) => {
                close_while_handling_errors(table.readers.iter(), |reader| close(reader));
                Err(err)
            }
        }
    }

    fn add_field<O>(
        &mut self,
        field: &FieldInfo,
        keys: PerFieldKeys,
        outer_suffix: &str,
        open: &mut O,
    ) -> CodecResult<()>
    where
        O: FnMut(&str, &str) -> CodecResult<Arc<R>>,
    {
        let Some(assignment) = keys.assignment(field)? else {
            return Ok(());
        };

        let segment_suffix =
            full_segment_suffix(field.name(), outer_suffix, &assignment.segment_suffix())?;
        let reader = match self.by_suffix.get(&segment_suffix) {
            Some(&index) => index,
            None => {
                let reader = open(&assignment.format_name, &segment_suffix)?;
                tracing::debug!(
                    format = %assignment.format_name,
                    segment_suffix = %segment_suffix,
                    "opened per-field sub-reader"
                );
                self.readers.push(reader);
                let index = self.readers.len() - 1;
                self.by_suffix.insert(segment_suffix, index);
                index
            }
        };

        self.fields
            .insert(field.name().to_string(), FieldSlot { assignment, reader });
        Ok(())
    }

    /// A table sharing this table's readers with a field table of its own.
    pub(crate) fn share(&self) -> Self {
        let readers: Vec<_> = self.readers.iter().map(Arc::clone).collect();
        let mut fields = BTreeMap::new();
        for (name, slot) in &self.fields {
            let reader = self.by_suffix[&slot.assignment.segment_suffix()];
            fields.insert(
                name.clone(),
                FieldSlot {
                    assignment: slot.assignment.clone(),
                    reader,
                },
            );
        }
        Self {
            readers,
            by_suffix: self.by_suffix.clone(),
            fields,
        }
    }

    pub(crate) fn reader(&self, field: &str) -> Option<&Arc<R>> {
        self.fields.get(field).map(|slot| &self.readers[slot.reader])
    }

    pub(crate) fn assignment(&self, field: &str) -> Option<&FormatAssignment> {
        self.fields.get(field).map(|slot| &slot.assignment)
    }

    pub(crate) fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    pub(crate) fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub(crate) fn readers(&self) -> &[Arc<R>] {
        &self.readers
    }
}

impl<R: ?Sized> fmt::Debug for ReaderTable<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut suffixes: Vec<_> = self.by_suffix.keys().collect();
        suffixes.sort();
        f.debug_struct("ReaderTable")
            .field("readers", &suffixes)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Error returned when a multiplexer is used after `close`.
pub(crate) fn closed_error(what: &str) -> CodecError {
    CodecError::invalid_operation(format!("{what} is closed"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_info::IndexOptions;

    #[derive(Debug)]
    struct Fake;

    fn field(name: &str, number: u32) -> FieldInfo {
        FieldInfo::new(name, number).with_index_options(IndexOptions::Docs)
    }

    #[test]
    fn suffixes_count_per_name_and_reuse_instances() {
        let a = Arc::new(Fake);
        let b = Arc::new(Fake);
        let mut arena: WriterArena<Fake, String> = WriterArena::new();
        let keys = PerFieldKeys::POSTINGS;

        let mut f0 = field("f0", 0);
        let mut f1 = field("f1", 1);
        let mut f2 = field("f2", 2);
        let open = |_: &Fake, suffix: &str| Ok(suffix.to_string());

        let i0 = arena.assign(&mut f0, keys, Arc::clone(&a), "X", "", open).unwrap();
        let i1 = arena.assign(&mut f1, keys, Arc::clone(&b), "X", "", open).unwrap();
        let i2 = arena.assign(&mut f2, keys, Arc::clone(&a), "X", "", open).unwrap();

        assert_eq!(arena.len(), 2);
        assert_eq!(i0, i2);
        assert_eq!(arena.writer_mut(i0).as_str(), "X_0");
        assert_eq!(arena.writer_mut(i1).as_str(), "X_1");
        assert_eq!(f2.get_attribute(keys.suffix), Some("0"));
        assert_eq!(f1.get_attribute(keys.suffix), Some("1"));
    }

    #[test]
    fn assigning_twice_is_duplicate_attribute() {
        let a = Arc::new(Fake);
        let mut arena: WriterArena<Fake, ()> = WriterArena::new();
        let mut f = field("f", 0);
        let open = |_: &Fake, _: &str| Ok(());

        arena
            .assign(&mut f, PerFieldKeys::POSTINGS, Arc::clone(&a), "X", "", open)
            .unwrap();
        let err = arena
            .assign(&mut f, PerFieldKeys::POSTINGS, a, "X", "", open)
            .unwrap_err();
        assert!(matches!(err, CodecError::DuplicateAttribute { .. }));
    }

    #[test]
    fn nested_assignment_is_configuration_error() {
        let mut arena: WriterArena<Fake, ()> = WriterArena::new();
        let mut f = field("f", 0);
        let err = arena
            .assign(&mut f, PerFieldKeys::POSTINGS, Arc::new(Fake), "X", "Outer_0", |_, _| Ok(()))
            .unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(arena.len(), 0);
    }

    #[test]
    fn failed_open_closes_earlier_readers() {
        let mut infos = Vec::new();
        for (i, format) in ["A", "B", "C"].into_iter().enumerate() {
            let mut f = field(&format!("f{i}"), i as u32);
            f.put_attribute(PerFieldKeys::POSTINGS.format, format);
            f.put_attribute(PerFieldKeys::POSTINGS.suffix, "0");
            infos.push(f);
        }
        let infos = FieldInfos::new(infos).unwrap();

        let closed = parking_lot::Mutex::new(Vec::new());
        let result: CodecResult<ReaderTable<String>> = ReaderTable::open(
            &infos,
            PerFieldKeys::POSTINGS,
            "",
            FieldInfo::is_indexed,
            |name, suffix| {
                if name == "C" {
                    Err(CodecError::corrupted("boom"))
                } else {
                    Ok(Arc::new(suffix.to_string()))
                }
            },
            |reader| {
                closed.lock().push(reader.clone());
                Ok(())
            },
        );

        assert!(matches!(result, Err(CodecError::Corrupted { .. })));
        assert_eq!(*closed.lock(), vec!["A_0".to_string(), "B_0".to_string()]);
    }

    #[test]
    fn shared_readers_and_unassigned_fields() {
        let mut title = field("title", 0);
        let mut body = field("body", 1);
        let plain = field("plain", 2);
        for f in [&mut title, &mut body] {
            f.put_attribute(PerFieldKeys::POSTINGS.format, "A");
            f.put_attribute(PerFieldKeys::POSTINGS.suffix, "0");
        }
        let infos = FieldInfos::new(vec![title, body, plain]).unwrap();

        let mut opened = 0;
        let table: ReaderTable<String> = ReaderTable::open(
            &infos,
            PerFieldKeys::POSTINGS,
            "",
            FieldInfo::is_indexed,
            |_, suffix| {
                opened += 1;
                Ok(Arc::new(suffix.to_string()))
            },
            |_| Ok(()),
        )
        .unwrap();

        assert_eq!(opened, 1);
        assert_eq!(table.readers().len(), 1);
        assert!(Arc::ptr_eq(
            table.reader("title").unwrap(),
            table.reader("body").unwrap()
        ));
        assert!(table.reader("plain").is_none());
        assert_eq!(table.field_names(), vec!["body", "title"]);

        let shared = table.share();
        assert!(Arc::ptr_eq(
            shared.reader("title").unwrap(),
            table.reader("title").unwrap()
        ));
    }
}
