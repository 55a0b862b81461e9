use std::any::Any;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::anyhow;
use dashmap::mapref::entry::Entry;
use dashmap::mapref::multiple::RefMulti;
use dashmap::DashMap;
use tracing::instrument;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Table {
    Tenants,
    TenantsByLocation,
    TenantsByPortal,
    TenantsByKeyPrefix,
    Clients,
    Agents,
    AgentsByExternal,
    PhoneNumbers,
    Calls,
    CallsByExternal,
    ScheduledCalls,
    Experiments,
    Workflows,
    TriggerLogs,
    ExecutionLogs,
    UsageCents,
    RateCounters,
    Test(&'static str),
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Tenants => "tenants",
            Table::TenantsByLocation => "tenants-by-location",
            Table::TenantsByPortal => "tenants-by-portal",
            Table::TenantsByKeyPrefix => "tenants-by-key-prefix",
            Table::Clients => "clients",
            Table::Agents => "agents",
            Table::AgentsByExternal => "agents-by-external",
            Table::PhoneNumbers => "phone-numbers",
            Table::Calls => "calls",
            Table::CallsByExternal => "calls-by-external",
            Table::ScheduledCalls => "scheduled-calls",
            Table::Experiments => "experiments",
            Table::Workflows => "workflows",
            Table::TriggerLogs => "trigger-logs",
            Table::ExecutionLogs => "execution-logs",
            Table::UsageCents => "usage-cents",
            Table::RateCounters => "rate-counters",
            Table::Test(name) => name,
        }
    }
}

#[derive(Copy, Clone)]
pub struct TableHandle<K, V> {
    table: Table,
    _marker: PhantomData<(K, V)>,
}

impl<K, V> TableHandle<K, V> {
    pub const fn new(table: Table) -> Self {
        Self {
            table,
            _marker: PhantomData,
        }
    }

    pub const fn table(&self) -> Table {
        self.table
    }
}

impl<K, V> fmt::Debug for TableHandle<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableHandle")
            .field("table", &self.table)
            .finish()
    }
}

pub mod handles {
    use super::{Table, TableHandle};
    use dialplane_types::{
        Agent, AgentId, CallId, CallRecord, Client, ClientId, ExecutionLog, ExecutionLogId,
        Experiment, ExperimentId, PhoneNumber, Provider, ScheduledCall, ScheduledCallId, Tenant,
        TenantId, TriggerLog, TriggerLogId, Workflow, WorkflowId,
    };

    pub const TENANTS: TableHandle<TenantId, Tenant> = TableHandle::new(Table::Tenants);
    pub const TENANTS_BY_LOCATION: TableHandle<String, TenantId> =
        TableHandle::new(Table::TenantsByLocation);
    pub const TENANTS_BY_PORTAL: TableHandle<String, TenantId> =
        TableHandle::new(Table::TenantsByPortal);
    pub const TENANTS_BY_KEY_PREFIX: TableHandle<String, TenantId> =
        TableHandle::new(Table::TenantsByKeyPrefix);
    pub const CLIENTS: TableHandle<ClientId, Client> = TableHandle::new(Table::Clients);
    pub const AGENTS: TableHandle<AgentId, Agent> = TableHandle::new(Table::Agents);
    pub const AGENTS_BY_EXTERNAL: TableHandle<(Provider, String), AgentId> =
        TableHandle::new(Table::AgentsByExternal);
    pub const PHONE_NUMBERS: TableHandle<(TenantId, String), PhoneNumber> =
        TableHandle::new(Table::PhoneNumbers);
    pub const CALLS: TableHandle<CallId, CallRecord> = TableHandle::new(Table::Calls);
    pub const CALLS_BY_EXTERNAL: TableHandle<(Provider, String), CallId> =
        TableHandle::new(Table::CallsByExternal);
    pub const SCHEDULED_CALLS: TableHandle<ScheduledCallId, ScheduledCall> =
        TableHandle::new(Table::ScheduledCalls);
    pub const EXPERIMENTS: TableHandle<ExperimentId, Experiment> =
        TableHandle::new(Table::Experiments);
    pub const WORKFLOWS: TableHandle<WorkflowId, Workflow> = TableHandle::new(Table::Workflows);
    pub const TRIGGER_LOGS: TableHandle<TriggerLogId, TriggerLog> =
        TableHandle::new(Table::TriggerLogs);
    pub const EXECUTION_LOGS: TableHandle<ExecutionLogId, ExecutionLog> =
        TableHandle::new(Table::ExecutionLogs);
    pub const USAGE_CENTS: TableHandle<String, i64> = TableHandle::new(Table::UsageCents);
    pub const RATE_COUNTERS: TableHandle<String, i64> = TableHandle::new(Table::RateCounters);
}

pub type DBError = anyhow::Error;

type AnyMap = Arc<dyn Any + Send + Sync>;

/// The shared mutable state of the whole system: typed tables over sharded
/// concurrent maps. Single-key operations (`set`, `update`, `increment`,
/// `get_or_insert_with`) are atomic per key, which is what the callers
/// build on: CAS leases, counter increments, and unique indexes.
#[derive(Clone, Default)]
pub struct Db {
    tables: Arc<DashMap<Table, AnyMap>>,
}

impl Db {
    #[instrument(fields(subsys = "Db"))]
    pub fn new() -> Result<Self, DBError> {
        Ok(Self {
            tables: Arc::new(DashMap::new()),
        })
    }

    #[instrument(skip(self, key, value), fields(subsys = "Db", table = ?handle.table()))]
    pub fn set<K, V>(&self, handle: &TableHandle<K, V>, key: K, value: V) -> Result<(), DBError>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let map = self.table_map(handle)?;
        map.insert(key, value);
        Ok(())
    }

    #[instrument(skip(self, key), fields(subsys = "Db", table = ?handle.table()))]
    pub fn get<K, V>(&self, handle: &TableHandle<K, V>, key: &K) -> Result<Option<V>, DBError>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let map = self.table_map(handle)?;
        Ok(map.get(key).map(|v| v.clone()))
    }

    #[instrument(skip(self, key), fields(subsys = "Db", table = ?handle.table()))]
    pub fn remove<K, V>(&self, handle: &TableHandle<K, V>, key: &K) -> Result<Option<V>, DBError>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let map = self.table_map(handle)?;
        Ok(map.remove(key).map(|(_, v)| v))
    }

    #[instrument(skip(self, key), fields(subsys = "Db", table = ?handle.table()))]
    pub fn contains_key<K, V>(&self, handle: &TableHandle<K, V>, key: &K) -> Result<bool, DBError>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let map = self.table_map(handle)?;
        Ok(map.contains_key(key))
    }

    /// Atomically mutate (or inspect) the value under `key` while holding
    /// its entry lock. `f` receives `None` when the key is absent. This is
    /// the store's compare-and-set primitive: no other worker can read or
    /// write the same key while `f` runs, and `f` must not suspend.
    #[instrument(skip(self, key, f), fields(subsys = "Db", table = ?handle.table()))]
    pub fn update<K, V, R>(
        &self,
        handle: &TableHandle<K, V>,
        key: &K,
        f: impl FnOnce(Option<&mut V>) -> R,
    ) -> Result<R, DBError>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let map = self.table_map(handle)?;
        let result = match map.get_mut(key) {
            Some(mut entry) => f(Some(entry.value_mut())),
            None => f(None),
        };
        Ok(result)
    }

    /// Atomically fetch the value under `key`, inserting `make()` first if
    /// the key is absent. Returns the value and whether it was inserted.
    /// This backs the unique-index upserts (`(provider, external_id)`,
    /// `(tenant, number)`).
    #[instrument(skip(self, key, make), fields(subsys = "Db", table = ?handle.table()))]
    pub fn get_or_insert_with<K, V>(
        &self,
        handle: &TableHandle<K, V>,
        key: K,
        make: impl FnOnce() -> V,
    ) -> Result<(V, bool), DBError>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let map = self.table_map(handle)?;
        let result = match map.entry(key) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let value = make();
                entry.insert(value.clone());
                (value, true)
            }
        };
        Ok(result)
    }

    /// Monotonic counter increment; missing keys start at zero. Returns the
    /// post-increment value.
    #[instrument(skip(self, key), fields(subsys = "Db", table = ?handle.table()))]
    pub fn increment<K>(
        &self,
        handle: &TableHandle<K, i64>,
        key: K,
        delta: i64,
    ) -> Result<i64, DBError>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
    {
        let map = self.table_map(handle)?;
        let mut entry = map.entry(key).or_insert(0);
        *entry += delta;
        Ok(*entry)
    }

    #[instrument(skip(self), fields(subsys = "Db", table = ?handle.table()))]
    pub fn clear_table<K, V>(&self, handle: &TableHandle<K, V>) -> Result<(), DBError>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let map = self.table_map(handle)?;
        map.clear();
        Ok(())
    }

    #[instrument(skip(self, f), fields(subsys = "Db", table = ?handle.table()))]
    pub fn with_table_read<K, V, F, R>(
        &self,
        handle: &TableHandle<K, V>,
        f: F,
    ) -> Result<R, DBError>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
        F: FnOnce(&TableReadGuard<K, V>) -> Result<R, DBError>,
    {
        let map = self.table_map(handle)?;
        let guard = TableReadGuard { map };
        f(&guard)
    }

    fn table_map<K, V>(&self, handle: &TableHandle<K, V>) -> Result<Arc<DashMap<K, V>>, DBError>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        match self.tables.entry(handle.table()) {
            Entry::Occupied(entry) => {
                let existing = entry.get().clone();
                existing
                    .downcast::<DashMap<K, V>>()
                    .map_err(|_| anyhow!("table {:?} type mismatch", handle.table()))
            }
            Entry::Vacant(entry) => {
                let map: Arc<DashMap<K, V>> = Arc::new(DashMap::new());
                let erased: AnyMap = map.clone();
                entry.insert(erased);
                Ok(map)
            }
        }
    }
}

pub struct TableReadGuard<K, V> {
    map: Arc<DashMap<K, V>>,
}

impl<K, V> TableReadGuard<K, V>
where
    K: Eq + Hash,
{
    pub fn iter(&self) -> TableIter<'_, K, V> {
        TableIter {
            inner: self.map.iter(),
        }
    }
}

pub struct TableIter<'a, K, V> {
    inner: dashmap::iter::Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for TableIter<'a, K, V>
where
    K: Eq + Hash,
{
    type Item = TableEntry<'a, K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(TableEntry)
    }
}

pub struct TableEntry<'a, K, V>(RefMulti<'a, K, V>);

impl<K, V> TableEntry<'_, K, V>
where
    K: Eq + Hash,
{
    pub fn pair(&self) -> (&K, &V) {
        (self.0.key(), self.0.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq)]
    struct TestStruct {
        name: String,
        value: i32,
    }

    #[test]
    fn set_get_round_trip() {
        let db = Db::new().unwrap();
        let handle: TableHandle<u32, TestStruct> =
            TableHandle::new(Table::Test("test_u32_teststruct"));
        let key = 7u32;
        let value = TestStruct {
            name: "demo".to_string(),
            value: 99,
        };

        assert!(db.get(&handle, &key).unwrap().is_none());
        db.set(&handle, key, value.clone()).unwrap();
        assert_eq!(db.get(&handle, &key).unwrap(), Some(value));
    }

    #[test]
    fn update_is_entry_atomic() {
        let db = Db::new().unwrap();
        let handle: TableHandle<String, TestStruct> = TableHandle::new(Table::Test("test_update"));
        db.set(
            &handle,
            "a".to_string(),
            TestStruct {
                name: "a".into(),
                value: 0,
            },
        )
        .unwrap();

        let leased = db
            .update(&handle, &"a".to_string(), |entry| match entry {
                Some(v) if v.value == 0 => {
                    v.value = 1;
                    true
                }
                _ => false,
            })
            .unwrap();
        assert!(leased);

        // second CAS observes the new state and declines
        let leased_again = db
            .update(&handle, &"a".to_string(), |entry| match entry {
                Some(v) if v.value == 0 => {
                    v.value = 1;
                    true
                }
                _ => false,
            })
            .unwrap();
        assert!(!leased_again);
    }

    #[test]
    fn concurrent_cas_lease_single_winner() {
        let db = Db::new().unwrap();
        let handle: TableHandle<String, i32> = TableHandle::new(Table::Test("test_cas_race"));
        db.set(&handle, "job".to_string(), 0).unwrap();

        let mut joins = Vec::new();
        for _ in 0..16 {
            let db = db.clone();
            let handle = handle.clone();
            joins.push(std::thread::spawn(move || {
                db.update(&handle, &"job".to_string(), |entry| match entry {
                    Some(v) if *v == 0 => {
                        *v = 1;
                        true
                    }
                    _ => false,
                })
                .unwrap()
            }));
        }

        let winners = joins
            .into_iter()
            .map(|j| j.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn get_or_insert_reports_freshness() {
        let db = Db::new().unwrap();
        let handle: TableHandle<String, i32> = TableHandle::new(Table::Test("test_upsert"));

        let (v, inserted) = db
            .get_or_insert_with(&handle, "k".to_string(), || 41)
            .unwrap();
        assert_eq!((v, inserted), (41, true));

        let (v, inserted) = db
            .get_or_insert_with(&handle, "k".to_string(), || 99)
            .unwrap();
        assert_eq!((v, inserted), (41, false));
    }

    #[test]
    fn counters_accumulate() {
        let db = Db::new().unwrap();
        let handle: TableHandle<String, i64> = TableHandle::new(Table::Test("test_counters"));

        assert_eq!(db.increment(&handle, "usage".to_string(), 120).unwrap(), 120);
        assert_eq!(db.increment(&handle, "usage".to_string(), 60).unwrap(), 180);
    }

    #[test]
    fn table_iteration() {
        let db = Db::new().unwrap();
        let handle: TableHandle<String, i32> = TableHandle::new(Table::Test("test_iter"));
        db.set(&handle, "alpha".to_string(), 1).unwrap();
        db.set(&handle, "beta".to_string(), 2).unwrap();

        let mut seen = Vec::new();
        db.with_table_read(&handle, |table| {
            for entry in table.iter() {
                let (key, value) = entry.pair();
                seen.push((key.clone(), *value));
            }
            Ok(())
        })
        .unwrap();

        seen.sort();
        assert_eq!(seen, vec![("alpha".into(), 1), ("beta".into(), 2)]);
    }
}
