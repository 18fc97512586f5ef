//! In-memory suppression provider.
//!
//! Stands in for the real provider in tests and local runs. Supports
//! scripted failures and counts every call so callers can assert on
//! exactly what reached the provider.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::suppression::{
    error::{ProviderError, ProviderResult},
    provider::{DeleteOutcome, SuppressionProvider},
    types::SuppressionEntry,
    EmailAddress,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    List,
    Delete,
}

#[derive(Default)]
pub struct InMemorySuppressionProvider {
    entries: Mutex<BTreeMap<String, SuppressionEntry>>,
    failures: Mutex<VecDeque<(Operation, ProviderError)>>,
    next_id: AtomicUsize,
    list_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    deletes_applied: AtomicUsize,
    concurrent_deleter: AtomicBool,
}

impl InMemorySuppressionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entry, builder style.
    pub fn with_entry(self, entry: SuppressionEntry) -> Self {
        self.insert(entry);
        self
    }

    pub fn insert(&self, entry: SuppressionEntry) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(entry.id.clone(), entry);
    }

    /// Add `email` to the list with a generated id and return the new entry.
    pub fn suppress(&self, email: &str, reason: &str) -> SuppressionEntry {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let entry = SuppressionEntry {
            id: format!("ocid1.emailsuppression.oc1..memory{:04}", n),
            email_address: email.to_string(),
            reason: reason.to_string(),
            time_created: Utc::now(),
        };
        self.insert(entry.clone());
        entry
    }

    /// Make the next `times` calls of `operation` fail with `error`.
    pub fn fail_next(&self, operation: Operation, times: usize, error: ProviderError) {
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        for _ in 0..times {
            failures.push_back((operation, error.clone()));
        }
    }

    /// Every delete finds its entry already removed by someone else.
    pub fn simulate_concurrent_delete(&self) {
        self.concurrent_deleter.store(true, Ordering::SeqCst);
    }

    pub fn contains(&self, email: &str) -> bool {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .values()
            .any(|entry| entry.email_address.eq_ignore_ascii_case(email))
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Deletes that actually removed an entry.
    pub fn deletes_applied(&self) -> usize {
        self.deletes_applied.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.list_calls() + self.delete_calls()
    }

    fn take_failure(&self, operation: Operation) -> Option<ProviderError> {
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        let position = failures.iter().position(|(op, _)| *op == operation)?;
        failures.remove(position).map(|(_, err)| err)
    }
}

#[async_trait]
impl SuppressionProvider for InMemorySuppressionProvider {
    async fn list_suppressions(&self, email: &EmailAddress) -> ProviderResult<Vec<SuppressionEntry>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.take_failure(Operation::List) {
            return Err(err);
        }

        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .values()
            .filter(|entry| entry.email_address.eq_ignore_ascii_case(email.as_str()))
            .cloned()
            .collect())
    }

    async fn delete_suppression(&self, suppression_id: &str) -> ProviderResult<DeleteOutcome> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.take_failure(Operation::Delete) {
            return Err(err);
        }

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if self.concurrent_deleter.load(Ordering::SeqCst) {
            entries.remove(suppression_id);
            return Ok(DeleteOutcome::AlreadyAbsent);
        }

        match entries.remove(suppression_id) {
            Some(_) => {
                self.deletes_applied.fetch_add(1, Ordering::SeqCst);
                Ok(DeleteOutcome::Deleted)
            }
            None => Ok(DeleteOutcome::AlreadyAbsent),
        }
    }

    fn provider_name(&self) -> &str {
        "in-memory"
    }
}
