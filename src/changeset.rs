//! Record change sets for provider-backed advertisers.
//!
//! An advertiser backed by a hosted DNS provider (rather than the
//! in-memory [`UnicastServer`](crate::UnicastServer)) reconciles the
//! provider's zone with the records synthesized for a service instance,
//! then applies the outcome against the provider's API as a single batch.
//! [`ChangeSet`] is the provider-neutral description of that batch;
//! mapping each entry onto provider API calls is left to the individual
//! advertiser.
//!
//! Records elsewhere in the zone are never part of a change set, so an
//! advertiser built on [`ChangeSet::diff`] preserves unrelated records.

use std::collections::BTreeSet;

use hickory_proto::rr::{Name, Record, RecordType};

/// A single record replacement within a [`ChangeSet`].
#[derive(Clone, Debug, PartialEq)]
pub struct RecordUpdate {
    /// The record currently published by the provider.
    pub before: Record,
    /// The record that must replace it.
    pub after: Record,
}

/// A set of DNS record changes that must be applied to reconcile a zone
/// with the desired state of one service instance.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChangeSet {
    creates: Vec<Record>,
    updates: Vec<RecordUpdate>,
    deletes: Vec<Record>,
}

impl ChangeSet {
    /// Returns a new empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if applying the change set would do nothing.
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    /// Adds a record that must be created.
    pub fn create(&mut self, record: Record) {
        self.creates.push(record);
    }

    /// Adds a record replacement. A replacement whose records are already
    /// identical is dropped rather than recorded.
    pub fn update(&mut self, before: Record, after: Record) {
        if before != after {
            self.updates.push(RecordUpdate { before, after });
        }
    }

    /// Adds a record that must be deleted.
    pub fn delete(&mut self, record: Record) {
        self.deletes.push(record);
    }

    /// The records to create.
    pub fn creates(&self) -> &[Record] {
        &self.creates
    }

    /// The record replacements to apply.
    pub fn updates(&self) -> &[RecordUpdate] {
        &self.updates
    }

    /// The records to delete.
    pub fn deletes(&self) -> &[Record] {
        &self.deletes
    }

    /// Computes the changes that turn `existing` into `desired`.
    ///
    /// Records are reconciled per `(owner name, record type)` group:
    /// surplus desired records become creates, surplus existing records
    /// become deletes, and positional pairs whose serialized forms differ
    /// become updates.
    pub fn diff(existing: &[Record], desired: &[Record]) -> Self {
        let mut cs = Self::new();

        let mut groups: BTreeSet<(&Name, RecordType)> = BTreeSet::new();
        for rr in existing.iter().chain(desired) {
            groups.insert((rr.name(), rr.record_type()));
        }

        for (name, rtype) in groups {
            let before: Vec<&Record> = existing
                .iter()
                .filter(|rr| rr.name() == name && rr.record_type() == rtype)
                .collect();
            let after: Vec<&Record> = desired
                .iter()
                .filter(|rr| rr.name() == name && rr.record_type() == rtype)
                .collect();

            let paired = before.len().min(after.len());

            for i in 0..paired {
                cs.update(before[i].clone(), after[i].clone());
            }

            for rr in &after[paired..] {
                cs.create((*rr).clone());
            }

            for rr in &before[paired..] {
                cs.delete((*rr).clone());
            }
        }

        cs
    }
}
