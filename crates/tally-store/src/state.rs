//! In-process ledger state shared by the memory and file stores.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tally_core::ports::{Versioned, WriteOutcome};
use tally_core::{
    Account, Credits, DATE_FORMAT, Error, EventId, GrantRecord, Result, UserId, parse_date,
};

#[derive(Debug, Clone, Default)]
pub(crate) struct LedgerState {
    accounts: HashMap<UserId, Versioned<Account>>,
    grants: HashMap<EventId, GrantRecord>,
}

impl LedgerState {
    pub(crate) fn read(&self, user_id: &UserId) -> Option<Versioned<Account>> {
        self.accounts.get(user_id).cloned()
    }

    pub(crate) fn find_grant(&self, event_id: &EventId) -> Option<GrantRecord> {
        self.grants.get(event_id).cloned()
    }

    pub(crate) fn write(
        &mut self,
        user_id: &UserId,
        account: &Account,
        expected: Option<u64>,
    ) -> WriteOutcome {
        let current = self.accounts.get(user_id).map(|v| v.version);
        if current != expected {
            return WriteOutcome::Conflict;
        }
        let version = current.map_or(1, |v| v + 1);
        self.accounts.insert(
            user_id.clone(),
            Versioned {
                value: account.clone(),
                version,
            },
        );
        WriteOutcome::Committed { version }
    }

    pub(crate) fn write_with_grant(
        &mut self,
        user_id: &UserId,
        account: &Account,
        expected: Option<u64>,
        grant: &GrantRecord,
    ) -> WriteOutcome {
        if let Some(existing) = self.grants.get(&grant.event_id) {
            return WriteOutcome::DuplicateGrant(existing.clone());
        }
        let outcome = self.write(user_id, account, expected);
        if matches!(outcome, WriteOutcome::Committed { .. }) {
            self.grants.insert(grant.event_id.clone(), grant.clone());
        }
        outcome
    }

    pub(crate) fn len(&self) -> usize {
        self.accounts.len()
    }

    pub(crate) fn to_snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::default();
        for (user_id, record) in &self.accounts {
            let key = user_id.as_str().to_string();
            snapshot.credits.insert(key.clone(), record.value.balance);
            if let Some(day) = record.value.last_claim_date {
                snapshot.claims.insert(key, day.format(DATE_FORMAT).to_string());
            }
        }
        for (event_id, grant) in &self.grants {
            snapshot
                .grants
                .insert(event_id.as_str().to_string(), grant.clone());
        }
        snapshot
    }

    pub(crate) fn from_snapshot(snapshot: Snapshot) -> Result<Self> {
        let mut accounts: HashMap<UserId, Account> = HashMap::new();
        for (user, balance) in snapshot.credits {
            accounts.insert(corrupt_on_err(UserId::new(user))?, Account::with_balance(balance));
        }
        for (user, day) in snapshot.claims {
            let day = corrupt_on_err(parse_date(&day))?;
            accounts
                .entry(corrupt_on_err(UserId::new(user))?)
                .or_default()
                .last_claim_date = Some(day);
        }

        let mut grants = HashMap::new();
        for (event, grant) in snapshot.grants {
            grants.insert(corrupt_on_err(EventId::new(event))?, grant);
        }

        Ok(Self {
            accounts: accounts
                .into_iter()
                .map(|(user, value)| (user, Versioned { value, version: 1 }))
                .collect(),
            grants,
        })
    }
}

fn corrupt_on_err<T>(result: Result<T>) -> Result<T> {
    result.map_err(|e| Error::CorruptRecord(e.to_string()))
}

/// On-disk layout: the two flat maps plus the grant dedup records.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct Snapshot {
    #[serde(default)]
    pub credits: BTreeMap<String, Credits>,
    #[serde(default)]
    pub claims: BTreeMap<String, String>,
    #[serde(default)]
    pub grants: BTreeMap<String, GrantRecord>,
}
